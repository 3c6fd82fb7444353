use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::assistant::{Answer, Assistant};
use crate::config::{Config, RoutingConfig, StrategyKind};
use crate::documents::{DefaultDocumentLoader, DocumentLoader};
use crate::embeddings::{ChunkingConfig, split};
use crate::memory::ConversationMemory;
use crate::ollama::OllamaClient;
use crate::retrieval::{ExternalSearchSource, SharedSource, SourceId};
use crate::search::TavilyClient;
use crate::{ClassificationConfig, ClassificationMode, RoutingStrategy};

const WEB_SOURCE_ID: &str = "web";
const WEB_SOURCE_DESCRIPTION: &str = "Recent events and general knowledge found on the web";

/// Options of the `chat` command
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub docs: Vec<String>,
    /// Descriptions paired with `docs` by position
    pub descriptions: Vec<String>,
    pub strategy: Option<StrategyKind>,
    pub web: bool,
}

/// Ingest the given documents and answer questions interactively
#[inline]
pub async fn chat(config: Config, options: ChatOptions) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let probe = ollama.clone();
    match tokio::task::spawn_blocking(move || probe.health_check()).await {
        Ok(Ok(())) => info!("Ollama is reachable"),
        Ok(Err(e)) => warn!("Ollama health check failed: {:#}", e),
        Err(e) => warn!("Ollama health check did not complete: {}", e),
    }

    let client = Arc::new(ollama);
    let memory = ConversationMemory::new(config.memory.max_messages)?;
    let mut assistant = Assistant::new(client.clone(), client)
        .with_memory(memory)
        .with_retrieval(config.retrieval)
        .with_request_timeout(config.ollama.timeout());

    let mut sources: Vec<SharedSource> = Vec::new();
    if !options.docs.is_empty() {
        let bar = spinner(format!("Indexing {} documents", options.docs.len()));
        let handles = assistant.ingest_all(&options.docs, &config.chunking).await;
        bar.finish_and_clear();
        let handles = handles.context("Failed to ingest documents")?;

        for (position, (handle, location)) in handles.iter().zip(&options.docs).enumerate() {
            let id = source_id(position, location);
            let description = options
                .descriptions
                .get(position)
                .cloned()
                .unwrap_or_else(|| format!("Documents from {}", location));
            let source = assistant.index_source(*handle, id.clone(), description)?;
            eprintln!(
                "{} {} as {}",
                style("✓ Indexed").green(),
                location,
                style(id).cyan()
            );
            sources.push(Arc::new(source));
        }
    }

    if options.web {
        let search = TavilyClient::from_env(&config.search, config.retrieval.timeout())
            .context("Failed to set up web search")?;
        sources.push(Arc::new(ExternalSearchSource::new(
            WEB_SOURCE_ID,
            WEB_SOURCE_DESCRIPTION,
            Arc::new(search),
        )));
    }

    if sources.is_empty() {
        eprintln!(
            "{}",
            style("No documents or web search configured; answering from the model alone.")
                .yellow()
        );
    } else {
        let kind = options.strategy.unwrap_or(config.routing.strategy);
        let strategy = build_strategy(&config.routing, kind, &sources, config.ollama.timeout());
        eprintln!("Routing strategy: {}", style(strategy.name()).cyan());
        assistant.configure_routing(strategy, sources)?;
    }

    eprintln!(
        "{}",
        style("Ask a question. Type /reset to clear the conversation, /exit to quit.").dim()
    );

    loop {
        let line: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let query = line.trim();

        match query {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                assistant.reset_memory();
                eprintln!("{}", style("Conversation cleared.").dim());
                continue;
            }
            _ => {}
        }

        let bar = spinner("Thinking".to_string());
        let result = assistant.ask(query).await;
        bar.finish_and_clear();

        match result {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("{} {}", style("Error:").red().bold(), e),
        }
    }

    Ok(())
}

/// Print the segments a document would be split into
#[inline]
pub async fn preview_chunks(location: &str, chunking: ChunkingConfig) -> Result<()> {
    let loader = DefaultDocumentLoader::default();
    let document = loader
        .load(location)
        .await
        .with_context(|| format!("Failed to load {}", location))?;
    let segments = split(&document, &chunking)?;

    println!(
        "{} segments from {} (max {} chars, overlap {})",
        segments.len(),
        document.source(),
        chunking.max_chunk_size,
        chunking.overlap
    );

    for (position, segment) in segments.iter().enumerate() {
        let range = segment.byte_range();
        println!();
        println!(
            "{}",
            style(format!(
                "#{} bytes {}..{} ({} chars)",
                position + 1,
                range.start,
                range.end,
                segment.char_len()
            ))
            .bold()
            .yellow()
        );
        println!("{}", segment.text());
    }

    Ok(())
}

/// Map the configured strategy kind onto a routing strategy over `sources`
#[inline]
pub fn build_strategy(
    routing: &RoutingConfig,
    kind: StrategyKind,
    sources: &[SharedSource],
    classification_timeout: Duration,
) -> RoutingStrategy {
    let classification = |mode: ClassificationMode| ClassificationConfig {
        mode,
        on_ambiguous: routing.on_ambiguous,
        on_failure: routing.on_failure,
        maybe_includes: routing.maybe_includes,
        history_turns: routing.history_turns,
        timeout: classification_timeout,
    };

    match kind {
        StrategyKind::Single => sources.first().map_or(RoutingStrategy::MultiSourceFanOut, |source| {
            RoutingStrategy::SingleSource {
                source: source.id().clone(),
            }
        }),
        StrategyKind::Threshold => RoutingStrategy::ThresholdSimilarity {
            threshold: routing.threshold,
        },
        StrategyKind::Llm => RoutingStrategy::LlmClassified(classification(
            ClassificationMode::SelectSources,
        )),
        StrategyKind::Gate => RoutingStrategy::LlmClassified(classification(
            ClassificationMode::Gate {
                question: routing.gate_question.clone(),
            },
        )),
        StrategyKind::Fanout => RoutingStrategy::MultiSourceFanOut,
    }
}

fn source_id(position: usize, location: &str) -> SourceId {
    let stem = Path::new(location)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("doc");
    SourceId::from(format!("{}-{}", stem, position + 1))
}

fn spinner(message: String) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(spinner_style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_answer(answer: &Answer) {
    println!();
    println!("{}", answer.text.trim());

    if !answer.evidence.is_empty() {
        println!();
        println!("{}", style("Sources:").dim());
        for passage in &answer.evidence {
            println!(
                "  {} {} ({:.2})",
                style(&passage.source).cyan(),
                style(passage.segment.source()).dim(),
                passage.score
            );
        }
    }
    println!();
}
