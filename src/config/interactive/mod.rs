
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, OllamaConfig, RoutingConfig, StrategyKind};
use crate::embeddings::chunking::ChunkingConfig;
use crate::retrieval::router::RoutingFallback;

const STRATEGIES: &[(StrategyKind, &str)] = &[
    (StrategyKind::Single, "single - always use the first source"),
    (StrategyKind::Threshold, "threshold - sources whose best match clears a score"),
    (StrategyKind::Llm, "llm - let the chat model pick sources"),
    (StrategyKind::Gate, "gate - let the chat model decide whether to retrieve"),
    (StrategyKind::Fanout, "fanout - query every source"),
];

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 RAG Router Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embeddings and chat.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Chunking").bold().yellow());
    config.chunking = configure_chunking(config.chunking)?;

    eprintln!();
    eprintln!("{}", style("Routing").bold().yellow());
    configure_routing(&mut config.routing)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama)? {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before chatting.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.ollama.chat_model).cyan());
    eprintln!("  Temperature: {}", style(config.ollama.temperature).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  Chunks: {} chars, {} overlap",
        style(config.chunking.max_chunk_size).cyan(),
        style(config.chunking.overlap).cyan()
    );
    eprintln!(
        "  Results: up to {} with score >= {}",
        style(config.retrieval.max_results).cyan(),
        style(config.retrieval.min_score).cyan()
    );
    eprintln!("  Memory: {} messages", style(config.memory.max_messages).cyan());

    eprintln!();
    eprintln!("{}", style("Routing:").bold().yellow());
    eprintln!("  Strategy: {}", style(format!("{:?}", config.routing.strategy)).cyan());
    eprintln!("  Threshold: {}", style(config.routing.threshold).cyan());
    eprintln!(
        "  On ambiguous: {}",
        style(format!("{:?}", config.routing.on_ambiguous)).cyan()
    );
    eprintln!(
        "  On failure: {}",
        style(format!("{:?}", config.routing.on_failure)).cyan()
    );

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols
        .get(protocol_index)
        .copied()
        .unwrap_or("http")
        .to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model = prompt_model("Embedding model", &ollama.embedding_model)?;
    let chat_model = prompt_model("Chat model", &ollama.chat_model)?;

    let temperature: f32 = Input::new()
        .with_prompt("Chat temperature")
        .default(ollama.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_chat_model(chat_model)?;
    ollama.set_temperature(temperature)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn prompt_model(prompt: &str, current: &str) -> Result<String> {
    Ok(Input::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?)
}

fn configure_chunking(current: ChunkingConfig) -> Result<ChunkingConfig> {
    let max_chunk_size: usize = Input::new()
        .with_prompt("Maximum segment size (chars)")
        .default(current.max_chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Segment size must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let overlap: usize = Input::new()
        .with_prompt("Overlap between segments (chars)")
        .default(current.overlap.min(max_chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), String> {
            ChunkingConfig::new(max_chunk_size, *input)
                .validate()
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    Ok(ChunkingConfig::new(max_chunk_size, overlap))
}

fn configure_routing(routing: &mut RoutingConfig) -> Result<()> {
    let labels: Vec<&str> = STRATEGIES.iter().map(|(_, label)| *label).collect();
    let default_index = STRATEGIES
        .iter()
        .position(|(kind, _)| *kind == routing.strategy)
        .unwrap_or(0);

    let selected = Select::new()
        .with_prompt("Routing strategy")
        .default(default_index)
        .items(&labels)
        .interact()?;

    if let Some((kind, _)) = STRATEGIES.get(selected) {
        routing.strategy = *kind;
    }

    match routing.strategy {
        StrategyKind::Threshold => {
            routing.threshold = Input::new()
                .with_prompt("Relevance threshold (0.0 - 1.0)")
                .default(routing.threshold)
                .validate_with(|input: &f32| -> Result<(), &str> {
                    if (0.0..=1.0).contains(input) {
                        Ok(())
                    } else {
                        Err("Threshold must be between 0.0 and 1.0")
                    }
                })
                .interact_text()?;
        }
        StrategyKind::Gate => {
            routing.gate_question = Input::new()
                .with_prompt("Gate question")
                .default(routing.gate_question.clone())
                .validate_with(|input: &String| -> Result<(), ConfigError> {
                    if input.trim().is_empty() {
                        Err(ConfigError::InvalidGateQuestion)
                    } else {
                        Ok(())
                    }
                })
                .interact_text()?;
            routing.maybe_includes = Confirm::new()
                .with_prompt("Treat a 'maybe' answer as yes?")
                .default(routing.maybe_includes)
                .interact()?;
        }
        StrategyKind::Llm => {
            routing.on_ambiguous = if Confirm::new()
                .with_prompt("Query every source when the model's answer is unclear?")
                .default(routing.on_ambiguous == RoutingFallback::RouteToAll)
                .interact()?
            {
                RoutingFallback::RouteToAll
            } else {
                RoutingFallback::DoNotRoute
            };
        }
        StrategyKind::Single | StrategyKind::Fanout => {}
    }

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
