
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::assistant::IndexHandle;
use crate::retrieval::SourceId;
use crate::retrieval::router::RoutingFallback;

/// Something notable that happened while ingesting or answering
#[derive(Debug, Clone, PartialEq)]
pub enum RagEvent {
    DocumentIngested {
        index: IndexHandle,
        source: String,
        segments: usize,
    },
    RouteSelected {
        strategy: &'static str,
        sources: Vec<SourceId>,
    },
    ClassificationAmbiguous {
        answer: String,
        fallback: RoutingFallback,
    },
    ClassificationFailed {
        reason: String,
        fallback: RoutingFallback,
    },
    SourceUnavailable {
        source: SourceId,
        reason: String,
    },
    AllSourcesFailed {
        attempted: usize,
    },
    PromptAugmented {
        passages: usize,
        history_turns: usize,
    },
    AnswerGenerated {
        answer_chars: usize,
        elapsed_ms: u64,
    },
}

/// Receives pipeline events. Implementations must be cheap; they run inline.
pub trait RagObserver: Send + Sync {
    fn on_event(&self, event: &RagEvent);
}

pub type SharedObserver = Arc<dyn RagObserver>;

/// Forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RagObserver for TracingObserver {
    fn on_event(&self, event: &RagEvent) {
        match event {
            RagEvent::DocumentIngested {
                index,
                source,
                segments,
            } => info!("Ingested {} into index {} ({} segments)", source, index, segments),
            RagEvent::RouteSelected { strategy, sources } => {
                info!("Routing ({}) selected {:?}", strategy, sources);
            }
            RagEvent::ClassificationAmbiguous { answer, fallback } => {
                warn!(
                    "Could not interpret classification answer {:?}, falling back to {:?}",
                    answer, fallback
                );
            }
            RagEvent::ClassificationFailed { reason, fallback } => {
                warn!("Classification failed ({}), falling back to {:?}", reason, fallback);
            }
            RagEvent::SourceUnavailable { source, reason } => {
                warn!("Source {} unavailable: {}", source, reason);
            }
            RagEvent::AllSourcesFailed { attempted } => {
                warn!("All {} selected sources failed, answering without context", attempted);
            }
            RagEvent::PromptAugmented {
                passages,
                history_turns,
            } => debug!(
                "Prompt built with {} passages and {} history turns",
                passages, history_turns
            ),
            RagEvent::AnswerGenerated {
                answer_chars,
                elapsed_ms,
            } => info!("Answer of {} chars generated in {}ms", answer_chars, elapsed_ms),
        }
    }
}

#[inline]
pub fn tracing_observer() -> SharedObserver {
    Arc::new(TracingObserver)
}
