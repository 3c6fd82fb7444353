#[cfg(test)]
mod tests;

use std::fmt::Write as _;
use std::time::Duration;

use futures::future::join_all;
use itertools::Itertools;
use tracing::debug;

use super::router::RoutingDecision;
use super::source::SharedSource;
use super::RetrievedPassage;
use crate::deadline::with_deadline;
use crate::memory::ConversationTurn;
use crate::observer::{RagEvent, SharedObserver};

pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant. Answer the question \
     using the context below. If the context does not contain the answer, say so.";

/// Everything the model sees for one question
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedPrompt {
    pub system: String,
    pub evidence: Vec<RetrievedPassage>,
    pub history: Vec<ConversationTurn>,
    pub query: String,
}

impl AugmentedPrompt {
    #[inline]
    pub fn has_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }

    /// Render system instructions, evidence, history and the query in that
    /// order. Without evidence the system instructions and context section
    /// are left out, so a prompt with no history is the query verbatim.
    #[inline]
    pub fn render(&self) -> String {
        if !self.has_evidence() && self.history.is_empty() {
            return self.query.clone();
        }

        let mut prompt = String::new();

        if self.has_evidence() {
            prompt.push_str(self.system.trim());
            prompt.push_str("\n\nContext:\n");
            for (rank, passage) in self.evidence.iter().enumerate() {
                let _ = writeln!(
                    prompt,
                    "[{}] ({}) {}",
                    rank + 1,
                    passage.segment.source(),
                    passage.segment.text().trim()
                );
            }
            prompt.push('\n');
        }

        if !self.history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in &self.history {
                let _ = writeln!(prompt, "{}: {}", turn.role, turn.text);
            }
            prompt.push('\n');
        }

        let _ = write!(prompt, "Question: {}", self.query);
        prompt
    }
}

/// Retrieves from the routed sources and assembles the prompt
pub struct Augmentor {
    observer: SharedObserver,
    timeout: Duration,
    system: String,
}

impl Augmentor {
    /// `timeout` bounds each source's retrieval
    #[inline]
    pub fn new(observer: SharedObserver, timeout: Duration) -> Self {
        Self {
            observer,
            timeout,
            system: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }

    #[inline]
    pub fn with_system_instructions(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Query every routed source concurrently and merge their passages.
    ///
    /// Passages are ordered by source registration order, then by each
    /// source's own ranking; the first occurrence of a segment wins. A source
    /// that fails or times out contributes nothing.
    #[inline]
    pub async fn augment(
        &self,
        query: &str,
        decision: &RoutingDecision,
        sources: &[SharedSource],
        history: &[&ConversationTurn],
    ) -> AugmentedPrompt {
        let selected: Vec<&SharedSource> = sources
            .iter()
            .filter(|source| decision.contains(source.id()))
            .collect();

        let retrievals = selected.iter().map(|source| async move {
            let operation = format!("retrieval from {}", source.id());
            with_deadline(&operation, self.timeout, source.retrieve(query)).await
        });
        let results = join_all(retrievals).await;

        let mut failed = 0;
        let mut passages = Vec::new();
        for (source, result) in selected.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!("Source {} contributed {} passages", source.id(), found.len());
                    passages.extend(found);
                }
                Err(e) => {
                    failed += 1;
                    self.observer.on_event(&RagEvent::SourceUnavailable {
                        source: source.id().clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !selected.is_empty() && failed == selected.len() {
            self.observer.on_event(&RagEvent::AllSourcesFailed {
                attempted: selected.len(),
            });
        }

        let evidence: Vec<RetrievedPassage> = passages
            .into_iter()
            .unique_by(|passage| passage.segment.id())
            .collect();

        self.observer.on_event(&RagEvent::PromptAugmented {
            passages: evidence.len(),
            history_turns: history.len(),
        });

        AugmentedPrompt {
            system: self.system.clone(),
            evidence,
            history: history.iter().map(|turn| (*turn).clone()).collect(),
            query: query.to_string(),
        }
    }
}
