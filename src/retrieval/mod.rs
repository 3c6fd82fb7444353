// Retrieval orchestration
// Content sources, per-query routing and prompt augmentation

pub mod augmentor;
pub mod router;
pub mod source;

use std::fmt;
use std::sync::Arc;

use crate::documents::Segment;

pub use augmentor::{AugmentedPrompt, Augmentor};
pub use router::{QueryRouter, RoutingDecision};
pub use source::{ContentSource, ExternalSearchSource, IndexBackedSource, SharedSource};

/// Name of a registered content source, unique within one router
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    #[inline]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    #[inline]
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    #[inline]
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for SourceId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A segment returned for one query, with the source that produced it.
/// Scores are only comparable within a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub segment: Segment,
    pub score: f32,
    pub source: SourceId,
}
