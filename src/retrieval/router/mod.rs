
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use fancy_regex::Regex;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SourceId;
use super::source::SharedSource;
use crate::deadline::with_deadline;
use crate::memory::ConversationTurn;
use crate::model::ModelClient;
use crate::observer::{RagEvent, SharedObserver};
use crate::{RagError, Result};

const DEFAULT_CLASSIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid regex"));
/// Numbers joined only by list punctuation, e.g. "1, 3" or "2 and 4"
static NUMBER_LIST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\b(?:\s*(?:,|;|&|/|\band\b|\bor\b)?\s*\b\d+\b)*").expect("valid regex")
});
static NONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnone\b").expect("valid regex"));
static YES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\byes\b").expect("valid regex"));
static NO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bno\b").expect("valid regex"));
static MAYBE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmaybe\b").expect("valid regex"));

/// What to do when model-based routing cannot produce a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingFallback {
    #[default]
    RouteToAll,
    DoNotRoute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationMode {
    /// The model picks sources from a numbered list of descriptions
    SelectSources,
    /// The model answers yes, no or maybe to `question`
    Gate { question: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationConfig {
    pub mode: ClassificationMode,
    pub on_ambiguous: RoutingFallback,
    pub on_failure: RoutingFallback,
    /// Whether a "maybe" from the gate counts as yes
    pub maybe_includes: bool,
    /// Number of recent turns shown to the classifier
    pub history_turns: usize,
    pub timeout: Duration,
}

impl Default for ClassificationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            mode: ClassificationMode::SelectSources,
            on_ambiguous: RoutingFallback::RouteToAll,
            on_failure: RoutingFallback::DoNotRoute,
            maybe_includes: true,
            history_turns: 0,
            timeout: DEFAULT_CLASSIFICATION_TIMEOUT,
        }
    }
}

impl ClassificationConfig {
    #[inline]
    pub fn select_sources() -> Self {
        Self::default()
    }

    #[inline]
    pub fn gate(question: impl Into<String>) -> Self {
        Self {
            mode: ClassificationMode::Gate {
                question: question.into(),
            },
            ..Self::default()
        }
    }
}

/// How a [`QueryRouter`] chooses sources for each query
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingStrategy {
    SingleSource { source: SourceId },
    /// Sources whose best match scores strictly above `threshold`
    ThresholdSimilarity { threshold: f32 },
    LlmClassified(ClassificationConfig),
    MultiSourceFanOut,
}

impl RoutingStrategy {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SingleSource { .. } => "single-source",
            Self::ThresholdSimilarity { .. } => "threshold",
            Self::LlmClassified(ClassificationConfig {
                mode: ClassificationMode::Gate { .. },
                ..
            }) => "llm-gate",
            Self::LlmClassified(_) => "llm-classified",
            Self::MultiSourceFanOut => "fan-out",
        }
    }
}

/// Sources to consult for one query, in registration order. Empty means
/// answer without retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingDecision {
    sources: Vec<SourceId>,
}

impl RoutingDecision {
    #[inline]
    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn sources(&self) -> &[SourceId] {
        &self.sources
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[inline]
    pub fn contains(&self, id: &SourceId) -> bool {
        self.sources.contains(id)
    }
}

/// Outcome of interpreting a classifier reply
#[derive(Debug, Clone, PartialEq, Eq)]
enum Classification {
    Selected(Vec<usize>),
    All,
    Nothing,
    Ambiguous,
}

pub struct QueryRouter {
    strategy: RoutingStrategy,
    sources: Vec<SharedSource>,
    model: Option<Arc<dyn ModelClient>>,
    observer: SharedObserver,
    timeout: Duration,
}

impl QueryRouter {
    /// Validate `strategy` against the registered sources.
    ///
    /// `timeout` bounds each similarity pre-check of the threshold strategy.
    #[inline]
    pub fn new(
        strategy: RoutingStrategy,
        sources: Vec<SharedSource>,
        model: Option<Arc<dyn ModelClient>>,
        observer: SharedObserver,
        timeout: Duration,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(RagError::InvalidParameter(
                "routing requires at least one content source".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.id().clone()) {
                return Err(RagError::InvalidParameter(format!(
                    "duplicate source id '{}'",
                    source.id()
                )));
            }
        }

        if timeout.is_zero() {
            return Err(RagError::InvalidParameter(
                "routing timeout must be greater than zero".to_string(),
            ));
        }

        match &strategy {
            RoutingStrategy::SingleSource { source } => {
                if !seen.contains(source) {
                    return Err(RagError::InvalidParameter(format!(
                        "source '{}' is not registered",
                        source
                    )));
                }
            }
            RoutingStrategy::ThresholdSimilarity { threshold } => {
                if !threshold.is_finite() {
                    return Err(RagError::InvalidParameter(format!(
                        "threshold must be finite, got {}",
                        threshold
                    )));
                }
            }
            RoutingStrategy::LlmClassified(config) => {
                if model.is_none() {
                    return Err(RagError::InvalidParameter(
                        "model-classified routing requires a model client".to_string(),
                    ));
                }
                if config.timeout.is_zero() {
                    return Err(RagError::InvalidParameter(
                        "classification timeout must be greater than zero".to_string(),
                    ));
                }
                if let ClassificationMode::Gate { question } = &config.mode {
                    if question.trim().is_empty() {
                        return Err(RagError::InvalidParameter(
                            "gate question must not be empty".to_string(),
                        ));
                    }
                }
            }
            RoutingStrategy::MultiSourceFanOut => {}
        }

        Ok(Self {
            strategy,
            sources,
            model,
            observer,
            timeout,
        })
    }

    #[inline]
    pub fn strategy(&self) -> &RoutingStrategy {
        &self.strategy
    }

    #[inline]
    pub fn sources(&self) -> &[SharedSource] {
        &self.sources
    }

    /// Decide which sources to consult. Never fails: classifier and
    /// pre-check problems resolve to the configured fallbacks.
    #[inline]
    pub async fn route(&self, query: &str, history: &[&ConversationTurn]) -> RoutingDecision {
        let decision = match &self.strategy {
            RoutingStrategy::SingleSource { source } => RoutingDecision {
                sources: vec![source.clone()],
            },
            RoutingStrategy::ThresholdSimilarity { threshold } => {
                self.route_by_threshold(query, *threshold).await
            }
            RoutingStrategy::LlmClassified(config) => {
                self.route_by_model(query, history, config).await
            }
            RoutingStrategy::MultiSourceFanOut => self.all_sources(),
        };

        self.observer.on_event(&RagEvent::RouteSelected {
            strategy: self.strategy.name(),
            sources: decision.sources.clone(),
        });
        decision
    }

    fn all_sources(&self) -> RoutingDecision {
        RoutingDecision {
            sources: self.sources.iter().map(|s| s.id().clone()).collect(),
        }
    }

    fn fallback(&self, fallback: RoutingFallback) -> RoutingDecision {
        match fallback {
            RoutingFallback::RouteToAll => self.all_sources(),
            RoutingFallback::DoNotRoute => RoutingDecision::none(),
        }
    }

    async fn route_by_threshold(&self, query: &str, threshold: f32) -> RoutingDecision {
        let checks = self.sources.iter().map(|source| async move {
            let operation = format!("similarity pre-check on {}", source.id());
            let result = with_deadline(&operation, self.timeout, source.best_score(query)).await;
            (source, result)
        });

        let mut selected = Vec::new();
        for (source, result) in join_all(checks).await {
            match result {
                Ok(Some(score)) if score > threshold => {
                    debug!("Source {} best score {} > {}", source.id(), score, threshold);
                    selected.push(source.id().clone());
                }
                Ok(score) => {
                    debug!("Source {} best score {:?} <= {}", source.id(), score, threshold);
                }
                Err(e) => {
                    self.observer.on_event(&RagEvent::SourceUnavailable {
                        source: source.id().clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        RoutingDecision { sources: selected }
    }

    async fn route_by_model(
        &self,
        query: &str,
        history: &[&ConversationTurn],
        config: &ClassificationConfig,
    ) -> RoutingDecision {
        let Some(model) = &self.model else {
            return self.fallback(config.on_failure);
        };

        let recent = &history[history.len().saturating_sub(config.history_turns)..];
        let prompt = match &config.mode {
            ClassificationMode::SelectSources => self.selection_prompt(query, recent),
            ClassificationMode::Gate { question } => gate_prompt(question, query, recent),
        };

        let classified = with_deadline("query classification", config.timeout, model.generate(&prompt));
        let answer = match classified.await {
            Ok(answer) => answer,
            Err(e) => {
                self.observer.on_event(&RagEvent::ClassificationFailed {
                    reason: e.to_string(),
                    fallback: config.on_failure,
                });
                return self.fallback(config.on_failure);
            }
        };

        debug!("Classifier answered {:?}", answer);

        let classification = match &config.mode {
            ClassificationMode::SelectSources => parse_selection(&answer, self.sources.len()),
            ClassificationMode::Gate { .. } => parse_gate(&answer, config.maybe_includes),
        };

        match classification {
            Classification::Selected(positions) => RoutingDecision {
                sources: self
                    .sources
                    .iter()
                    .enumerate()
                    .filter(|(position, _)| positions.contains(position))
                    .map(|(_, source)| source.id().clone())
                    .collect(),
            },
            Classification::All => self.all_sources(),
            Classification::Nothing => RoutingDecision::none(),
            Classification::Ambiguous => {
                self.observer.on_event(&RagEvent::ClassificationAmbiguous {
                    answer,
                    fallback: config.on_ambiguous,
                });
                self.fallback(config.on_ambiguous)
            }
        }
    }

    fn selection_prompt(&self, query: &str, history: &[&ConversationTurn]) -> String {
        let mut prompt = String::from(
            "Based on the user query, determine the most suitable data source(s) \
             to retrieve relevant information from the following options:\n",
        );
        for (position, source) in self.sources.iter().enumerate() {
            let _ = writeln!(prompt, "{}: {}", position + 1, source.description());
        }
        prompt.push_str(
            "It is very important that your answer consists of either a single number \
             or multiple numbers separated by commas and nothing else!\n\
             If none of the data sources above is suitable, answer \"none\".\n",
        );
        push_history(&mut prompt, history);
        let _ = write!(prompt, "User query: {}", query);
        prompt
    }
}

fn gate_prompt(question: &str, query: &str, history: &[&ConversationTurn]) -> String {
    let mut prompt = format!(
        "{}\nAnswer only with 'yes', 'no' or 'maybe'. Do not say anything else.\n",
        question.trim()
    );
    push_history(&mut prompt, history);
    let _ = write!(prompt, "Query: {}", query);
    prompt
}

fn push_history(prompt: &mut String, history: &[&ConversationTurn]) {
    if history.is_empty() {
        return;
    }
    prompt.push_str("Conversation so far:\n");
    for turn in history {
        let _ = writeln!(prompt, "{}: {}", turn.role, turn.text);
    }
}

fn is_match(regex: &Regex, text: &str) -> bool {
    regex.is_match(text).unwrap_or(false)
}

/// Zero-based positions from the first list of numbers in `answer` that
/// names a registered source. Later numbers in the prose are ignored.
/// "none" only counts when no source number was given.
fn parse_selection(answer: &str, source_count: usize) -> Classification {
    let in_range = |list: &str| -> Vec<usize> {
        NUMBER_REGEX
            .find_iter(list)
            .filter_map(|found| found.ok())
            .filter_map(|found| found.as_str().parse::<usize>().ok())
            .filter(|number| (1..=source_count).contains(number))
            .map(|number| number - 1)
            .collect()
    };

    let mut positions = NUMBER_LIST_REGEX
        .find_iter(answer)
        .filter_map(|found| found.ok())
        .map(|found| in_range(found.as_str()))
        .find(|positions| !positions.is_empty())
        .unwrap_or_default();
    positions.sort_unstable();
    positions.dedup();

    if !positions.is_empty() {
        Classification::Selected(positions)
    } else if is_match(&NONE_REGEX, answer) {
        Classification::Nothing
    } else {
        Classification::Ambiguous
    }
}

fn parse_gate(answer: &str, maybe_includes: bool) -> Classification {
    let yes = is_match(&YES_REGEX, answer);
    let no = is_match(&NO_REGEX, answer);
    let maybe = is_match(&MAYBE_REGEX, answer);

    if maybe {
        return if maybe_includes {
            Classification::All
        } else {
            Classification::Nothing
        };
    }

    match (yes, no) {
        (true, false) => Classification::All,
        (false, true) => Classification::Nothing,
        _ => Classification::Ambiguous,
    }
}
