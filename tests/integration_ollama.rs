#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use rag_router::Assistant;
use rag_router::RoutingStrategy;
use rag_router::config::OllamaConfig;
use rag_router::embeddings::ChunkingConfig;
use rag_router::index::cosine_similarity;
use rag_router::ollama::OllamaClient;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn integration_config() -> OllamaConfig {
    let mut config = OllamaConfig {
        host: env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_OLLAMA_PORT),
        batch_size: 2,
        ..OllamaConfig::default()
    };
    if let Ok(model) = env::var("OLLAMA_EMBEDDING_MODEL") {
        config.embedding_model = model;
    }
    if let Ok(model) = env::var("OLLAMA_CHAT_MODEL") {
        config.chat_model = model;
    }
    config
}

fn create_integration_test_client() -> OllamaClient {
    OllamaClient::new(&integration_config())
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(120))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );

    let models = client.list_models().expect("models can be listed");
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_batch_embeddings() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts = vec![
        "Rust enforces memory safety with a borrow checker.".to_string(),
        "The borrow checker in Rust prevents data races.".to_string(),
        "Bread rises because yeast produces carbon dioxide.".to_string(),
    ];

    let embeddings = client
        .generate_embeddings_batch(&texts)
        .expect("batch embedding should succeed");

    assert_eq!(embeddings.len(), texts.len());
    let dimension = embeddings[0].len();
    assert!(dimension >= 100, "Embedding should have reasonable dimensions");
    assert!(embeddings.iter().all(|e| e.len() == dimension));

    let related = cosine_similarity(&embeddings[0], &embeddings[1]);
    let unrelated = cosine_similarity(&embeddings[0], &embeddings[2]);
    info!("related {:.3}, unrelated {:.3}", related, unrelated);
    assert!(related > unrelated);

    let empty = client
        .generate_embeddings_batch(&[])
        .expect("empty batch is handled");
    assert!(empty.is_empty());
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_completion() {
    init_test_tracing();

    let client = create_integration_test_client();
    let answer = client
        .generate_completion("Reply with the single word: pong")
        .expect("completion should succeed");

    assert!(!answer.trim().is_empty());
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_error_recovery() {
    init_test_tracing();

    let config = OllamaConfig {
        embedding_model: "non-existent-model-12345".to_string(),
        ..integration_config()
    };
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(10))
        .with_retry_attempts(1);

    assert!(
        client.health_check().is_err(),
        "Health check should fail with invalid model"
    );
    assert!(
        client
            .generate_embeddings_batch(&["test text".to_string()])
            .is_err()
    );
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_answers_from_a_document() {
    init_test_tracing();

    let dir = tempfile::TempDir::new().expect("should create temp dir");
    let notes = dir.path().join("notes.md");
    std::fs::write(
        &notes,
        "# Project Kestrel\n\nProject Kestrel ships on the 14th of March.\n\n\
         The Kestrel team meets every Tuesday in room 4B.",
    )
    .expect("should write notes");

    let client = Arc::new(create_integration_test_client());
    let mut assistant = Assistant::new(client.clone(), client);
    let handle = assistant
        .ingest(&notes.to_string_lossy(), &ChunkingConfig::new(80, 10))
        .await
        .expect("ingest should succeed");
    let source = assistant
        .index_source(handle, "kestrel", "Project Kestrel planning notes")
        .expect("handle is known");
    assistant
        .configure_routing(RoutingStrategy::MultiSourceFanOut, vec![Arc::new(source)])
        .expect("routing should be valid");

    let answer = assistant
        .ask("Where does the Kestrel team meet?")
        .await
        .expect("ask should succeed");

    info!("Answer: {}", answer.text);
    assert!(!answer.evidence.is_empty());
    assert!(
        answer
            .evidence
            .iter()
            .any(|p| p.segment.text().contains("room 4B"))
    );
}
