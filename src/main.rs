use clap::{Parser, Subcommand};
use rag_router::Result;
use rag_router::commands::{ChatOptions, chat, preview_chunks};
use rag_router::config::{Config, StrategyKind, run_interactive_config, show_config};
use rag_router::embeddings::ChunkingConfig;

#[derive(Parser)]
#[command(name = "rag-router")]
#[command(about = "Retrieval-augmented chat that routes each question to the right sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection, chunking and routing
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chat with answers grounded in documents and optionally the web
    Chat {
        /// Document to index (file path or http(s) URL); repeat for several
        #[arg(long = "doc")]
        docs: Vec<String>,
        /// Description of the document at the same position, used for routing
        #[arg(long = "description")]
        descriptions: Vec<String>,
        /// Routing strategy, overriding the configured one
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,
        /// Add web search as a source (API key read from the configured variable)
        #[arg(long)]
        web: bool,
    },
    /// Preview how a document is split into segments
    Chunk {
        /// File path or http(s) URL
        location: String,
        /// Maximum segment size in chars
        #[arg(long)]
        max_chunk_size: Option<usize>,
        /// Chars shared by consecutive segments
        #[arg(long)]
        overlap: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Chat {
            docs,
            descriptions,
            strategy,
            web,
        } => {
            let config = Config::load()?;
            chat(
                config,
                ChatOptions {
                    docs,
                    descriptions,
                    strategy,
                    web,
                },
            )
            .await?;
        }
        Commands::Chunk {
            location,
            max_chunk_size,
            overlap,
        } => {
            let configured = Config::load()?.chunking;
            let chunking = ChunkingConfig::new(
                max_chunk_size.unwrap_or(configured.max_chunk_size),
                overlap.unwrap_or(configured.overlap),
            );
            preview_chunks(&location, chunking).await?;
        }
    }

    Ok(())
}
