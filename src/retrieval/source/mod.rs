
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::{RetrievedPassage, SourceId};
use crate::config::RetrievalConfig;
use crate::documents::{Document, DocumentId};
use crate::embeddings::{EmbeddingService, EmbeddingVector};
use crate::index::EmbeddingIndex;
use crate::search::SearchService;
use crate::{RagError, Result};

/// Anything that can return ranked passages for a query
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn id(&self) -> &SourceId;

    /// Human readable summary of what the source covers, shown to the
    /// classifier when routing by model
    fn description(&self) -> &str;

    /// Passages for `query`, best first
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>>;

    /// Best score this source can offer for `query`, if it has any match
    async fn best_score(&self, query: &str) -> Result<Option<f32>> {
        Ok(self
            .retrieve(query)
            .await?
            .iter()
            .map(|passage| passage.score)
            .reduce(f32::max))
    }
}

pub type SharedSource = Arc<dyn ContentSource>;

/// Source backed by an in-memory [`EmbeddingIndex`]
pub struct IndexBackedSource {
    id: SourceId,
    description: String,
    index: Arc<EmbeddingIndex>,
    embeddings: Arc<dyn EmbeddingService>,
    max_results: usize,
    min_score: f32,
    /// Vector of the most recent query, shared by `best_score` and `retrieve`
    last_query: Mutex<Option<(String, Arc<EmbeddingVector>)>>,
}

impl IndexBackedSource {
    #[inline]
    pub fn new(
        id: impl Into<SourceId>,
        description: impl Into<String>,
        index: Arc<EmbeddingIndex>,
        embeddings: Arc<dyn EmbeddingService>,
    ) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            id: id.into(),
            description: description.into(),
            index,
            embeddings,
            max_results: defaults.max_results,
            min_score: defaults.min_score,
            last_query: Mutex::new(None),
        }
    }

    #[inline]
    pub fn with_limits(mut self, max_results: usize, min_score: f32) -> Self {
        self.max_results = max_results;
        self.min_score = min_score;
        self
    }

    #[inline]
    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    fn cached_vector(&self, query: &str) -> Option<Arc<EmbeddingVector>> {
        let last = self.last_query.lock().ok()?;
        last.as_ref()
            .filter(|(cached, _)| cached == query)
            .map(|(_, vector)| Arc::clone(vector))
    }

    async fn query_vector(&self, query: &str) -> Result<Arc<EmbeddingVector>> {
        if let Some(vector) = self.cached_vector(query) {
            return Ok(vector);
        }

        let vector = Arc::new(self.embeddings.embed(query).await?);
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some((query.to_string(), Arc::clone(&vector)));
        }
        Ok(vector)
    }

    async fn search(&self, query: &str, k: usize, min_score: f32) -> Result<Vec<RetrievedPassage>> {
        let vector = self.query_vector(query).await?;
        let results = self.index.query(&vector, k, min_score)?;

        debug!("Source {} matched {} segments", self.id, results.len());

        Ok(results
            .into_iter()
            .map(|result| RetrievedPassage {
                segment: result.segment,
                score: result.score,
                source: self.id.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl ContentSource for IndexBackedSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        self.search(query, self.max_results, self.min_score).await
    }

    async fn best_score(&self, query: &str) -> Result<Option<f32>> {
        Ok(self
            .search(query, 1, 0.0)
            .await?
            .first()
            .map(|passage| passage.score))
    }
}

/// Source delegating to a web search service
pub struct ExternalSearchSource {
    id: SourceId,
    description: String,
    search: Arc<dyn SearchService>,
}

impl ExternalSearchSource {
    #[inline]
    pub fn new(
        id: impl Into<SourceId>,
        description: impl Into<String>,
        search: Arc<dyn SearchService>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            search,
        }
    }
}

#[async_trait]
impl ContentSource for ExternalSearchSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        let hits = self.search.search(query).await.map_err(|e| match e {
            RagError::Search(reason) => RagError::SourceUnavailable {
                source_id: self.id.to_string(),
                reason,
            },
            other => other,
        })?;

        let passages: Vec<RetrievedPassage> = hits
            .into_iter()
            .filter(|hit| !hit.text.trim().is_empty())
            .map(|hit| {
                let label = if hit.title.is_empty() {
                    hit.url.clone()
                } else {
                    format!("{} ({})", hit.title, hit.url)
                };
                let id = DocumentId::from_web_hit(&hit.url, &hit.text);
                let document = Document::with_id(id, label, hit.text);
                RetrievedPassage {
                    segment: document.as_segment(),
                    score: hit.score,
                    source: self.id.clone(),
                }
            })
            .collect();

        debug!("Source {} returned {} web passages", self.id, passages.len());
        Ok(passages)
    }
}
