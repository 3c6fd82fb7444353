//! Fakes shared by unit tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::documents::Document;
use crate::embeddings::{EmbeddingService, EmbeddingVector};
use crate::model::ModelClient;
use crate::observer::{RagEvent, RagObserver};
use crate::retrieval::{ContentSource, RetrievedPassage, SourceId};
use crate::search::{SearchHit, SearchService};
use crate::{RagError, Result};

/// One dimension per keyword, set when the lowercased text contains it
pub struct KeywordEmbeddings {
    keywords: Vec<&'static str>,
}

impl KeywordEmbeddings {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self {
            keywords: keywords.to_vec(),
        }
    }
}

#[async_trait]
impl EmbeddingService for KeywordEmbeddings {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let lower = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .map(|keyword| if lower.contains(keyword) { 1.0 } else { 0.0 })
            .collect())
    }
}

pub struct FailingEmbeddings;

#[async_trait]
impl EmbeddingService for FailingEmbeddings {
    async fn embed(&self, _text: &str) -> Result<EmbeddingVector> {
        Err(RagError::Embedding("embedding backend down".to_string()))
    }
}

/// Model returning a fixed reply (or failing) and recording every prompt
pub struct ScriptedModel {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock should not be poisoned").clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(RagError::Model)
    }
}

pub struct StaticSearch {
    pub hits: Vec<SearchHit>,
}

#[async_trait]
impl SearchService for StaticSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }
}

pub struct FailingSearch;

#[async_trait]
impl SearchService for FailingSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Err(RagError::Search("HTTP 500".to_string()))
    }
}

pub fn hit(url: &str, text: &str, score: f32) -> SearchHit {
    SearchHit {
        text: text.to_string(),
        score,
        url: url.to_string(),
        title: String::new(),
    }
}

enum Behaviour {
    Passages(Vec<RetrievedPassage>),
    Fail,
    Hang,
}

/// Content source with canned passages
pub struct StaticSource {
    id: SourceId,
    description: String,
    behaviour: Behaviour,
}

impl StaticSource {
    /// One passage per text, each a whole document, scored from `score` down
    pub fn with_texts(id: &str, texts: &[&str], score: f32) -> Arc<Self> {
        let source = SourceId::from(id);
        let passages = texts
            .iter()
            .enumerate()
            .map(|(rank, text)| RetrievedPassage {
                segment: Document::new(id, *text).as_segment(),
                score: score - rank as f32 * 0.01,
                source: source.clone(),
            })
            .collect();
        Self::with_passages(id, passages)
    }

    pub fn with_passages(id: &str, passages: Vec<RetrievedPassage>) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::from(id),
            description: format!("{id} documents"),
            behaviour: Behaviour::Passages(passages),
        })
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::from(id),
            description: format!("{id} documents"),
            behaviour: Behaviour::Fail,
        })
    }

    pub fn hanging(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::from(id),
            description: format!("{id} documents"),
            behaviour: Behaviour::Hang,
        })
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedPassage>> {
        match &self.behaviour {
            Behaviour::Passages(passages) => Ok(passages.clone()),
            Behaviour::Fail => Err(RagError::SourceUnavailable {
                source_id: self.id.to_string(),
                reason: "offline".to_string(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RagEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<RagEvent> {
        self.events.lock().expect("lock should not be poisoned").clone()
    }
}

impl RagObserver for RecordingObserver {
    fn on_event(&self, event: &RagEvent) {
        self.events
            .lock()
            .expect("lock should not be poisoned")
            .push(event.clone());
    }
}
