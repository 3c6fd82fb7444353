
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::deadline::with_deadline;
use crate::documents::{DefaultDocumentLoader, Document, DocumentLoader};
use crate::embeddings::{ChunkingConfig, EmbeddingService, split};
use crate::index::EmbeddingIndex;
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::model::ModelClient;
use crate::observer::{RagEvent, SharedObserver, tracing_observer};
use crate::retrieval::augmentor::DEFAULT_SYSTEM_INSTRUCTIONS;
use crate::retrieval::{
    Augmentor, IndexBackedSource, QueryRouter, RetrievedPassage, RoutingDecision, SharedSource,
    SourceId,
};
use crate::{RagError, Result, RoutingStrategy};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Names an index built by [`Assistant::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexHandle(Uuid);

impl IndexHandle {
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IndexHandle {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexHandle {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A generated answer and the evidence it was given
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub evidence: Vec<RetrievedPassage>,
    pub routed: RoutingDecision,
}

/// Drives the whole pipeline: ingestion, routing, augmentation, generation
/// and conversation memory
pub struct Assistant {
    loader: Arc<dyn DocumentLoader>,
    embeddings: Arc<dyn EmbeddingService>,
    model: Arc<dyn ModelClient>,
    observer: SharedObserver,
    indexes: HashMap<IndexHandle, Arc<EmbeddingIndex>>,
    router: Option<QueryRouter>,
    augmentor: Augmentor,
    memory: ConversationMemory,
    retrieval: RetrievalConfig,
    request_timeout: Duration,
    system: String,
}

impl Assistant {
    #[inline]
    pub fn new(embeddings: Arc<dyn EmbeddingService>, model: Arc<dyn ModelClient>) -> Self {
        let observer = tracing_observer();
        let retrieval = RetrievalConfig::default();
        Self {
            loader: Arc::new(DefaultDocumentLoader::default()),
            embeddings,
            model,
            augmentor: Augmentor::new(observer.clone(), retrieval.timeout()),
            observer,
            indexes: HashMap::new(),
            router: None,
            memory: ConversationMemory::default(),
            retrieval,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            system: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }

    #[inline]
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    #[inline]
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self.rebuild_augmentor();
        self
    }

    #[inline]
    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = memory;
        self
    }

    /// Limits for sources created by [`Self::index_source`] and the
    /// per-source timeout at query time
    #[inline]
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self.rebuild_augmentor();
        self
    }

    /// Timeout for embedding batches during ingestion and for answer generation
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[inline]
    pub fn with_system_instructions(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self.rebuild_augmentor();
        self
    }

    fn rebuild_augmentor(&mut self) {
        self.augmentor = Augmentor::new(self.observer.clone(), self.retrieval.timeout())
            .with_system_instructions(self.system.clone());
    }

    /// Load, split and embed one document into a new index
    #[inline]
    pub async fn ingest(&mut self, location: &str, chunking: &ChunkingConfig) -> Result<IndexHandle> {
        chunking.validate()?;
        let document = self.loader.load(location).await?;
        self.ingest_document(document, chunking).await
    }

    /// Index an already loaded document
    #[inline]
    pub async fn ingest_document(
        &mut self,
        document: Document,
        chunking: &ChunkingConfig,
    ) -> Result<IndexHandle> {
        let index = self.build_index(&document, chunking).await?;
        Ok(self.store_index(&document, index))
    }

    /// Ingest several documents concurrently, one index each, in input order.
    /// Fails as a whole if any document fails.
    #[inline]
    pub async fn ingest_all<S: AsRef<str>>(
        &mut self,
        locations: &[S],
        chunking: &ChunkingConfig,
    ) -> Result<Vec<IndexHandle>> {
        chunking.validate()?;

        let this = &*self;
        let built = try_join_all(locations.iter().map(|location| async move {
            let document = this.loader.load(location.as_ref()).await?;
            let index = this.build_index(&document, chunking).await?;
            Ok::<_, RagError>((document, index))
        }))
        .await?;

        Ok(built
            .into_iter()
            .map(|(document, index)| self.store_index(&document, index))
            .collect())
    }

    async fn build_index(&self, document: &Document, chunking: &ChunkingConfig) -> Result<EmbeddingIndex> {
        let segments = split(document, chunking)?;
        let mut index = EmbeddingIndex::new();
        if segments.is_empty() {
            debug!("{} produced no segments", document.source());
            return Ok(index);
        }

        let texts: Vec<String> = segments.iter().map(|s| s.text().to_string()).collect();
        let operation = format!("embedding {}", document.source());
        let vectors = with_deadline(
            &operation,
            self.request_timeout,
            self.embeddings.embed_batch(&texts),
        )
        .await?;

        if vectors.len() != segments.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings for {}, got {}",
                segments.len(),
                document.source(),
                vectors.len()
            )));
        }

        index.insert_all(segments, vectors)?;
        Ok(index)
    }

    fn store_index(&mut self, document: &Document, index: EmbeddingIndex) -> IndexHandle {
        let handle = IndexHandle::new();
        let segments = index.len();
        self.indexes.insert(handle, Arc::new(index));
        self.observer.on_event(&RagEvent::DocumentIngested {
            index: handle,
            source: document.source().to_string(),
            segments,
        });
        handle
    }

    #[inline]
    pub fn index(&self, handle: IndexHandle) -> Option<&Arc<EmbeddingIndex>> {
        self.indexes.get(&handle)
    }

    /// Content source reading the index behind `handle`
    #[inline]
    pub fn index_source(
        &self,
        handle: IndexHandle,
        id: impl Into<SourceId>,
        description: impl Into<String>,
    ) -> Result<IndexBackedSource> {
        let index = self
            .indexes
            .get(&handle)
            .ok_or_else(|| RagError::InvalidParameter(format!("unknown index {}", handle)))?;

        Ok(IndexBackedSource::new(
            id,
            description,
            Arc::clone(index),
            Arc::clone(&self.embeddings),
        )
        .with_limits(self.retrieval.max_results, self.retrieval.min_score))
    }

    /// Replace the routing strategy and the set of sources it chooses from
    #[inline]
    pub fn configure_routing(
        &mut self,
        strategy: RoutingStrategy,
        sources: Vec<SharedSource>,
    ) -> Result<()> {
        let router = QueryRouter::new(
            strategy,
            sources,
            Some(Arc::clone(&self.model)),
            self.observer.clone(),
            self.retrieval.timeout(),
        )?;
        info!(
            "Routing with {} over {} sources",
            router.strategy().name(),
            router.sources().len()
        );
        self.router = Some(router);
        Ok(())
    }

    /// Answer `query` with retrieved evidence and the conversation so far.
    ///
    /// Retrieval problems only reduce the evidence. A generation failure is
    /// returned as an error and leaves the memory unchanged.
    #[inline]
    pub async fn ask(&mut self, query: &str) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidParameter(
                "query must not be blank".to_string(),
            ));
        }

        let started = Instant::now();
        let history = self.memory.as_ordered_turns();

        let (decision, sources) = match &self.router {
            Some(router) => (router.route(query, &history).await, router.sources()),
            None => (RoutingDecision::none(), &[][..]),
        };
        let prompt = self
            .augmentor
            .augment(query, &decision, sources, &history)
            .await;

        let text = with_deadline(
            "answer generation",
            self.request_timeout,
            self.model.generate(&prompt.render()),
        )
        .await?;

        self.memory.append(ConversationTurn::user(query));
        self.memory.append(ConversationTurn::assistant(text.clone()));

        self.observer.on_event(&RagEvent::AnswerGenerated {
            answer_chars: text.chars().count(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });

        Ok(Answer {
            text,
            evidence: prompt.evidence,
            routed: decision,
        })
    }

    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    #[inline]
    pub fn reset_memory(&mut self) {
        self.memory.clear();
    }
}
