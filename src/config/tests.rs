use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.ollama.protocol = "https".to_string();
        original_config.ollama.host = "test-host".to_string();
        original_config.ollama.port = 8080;
        original_config.ollama.chat_model = "test-model".to_string();
        original_config.routing.strategy = StrategyKind::Llm;
        original_config.search.max_results = 3;

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config.ollama, loaded_config.ollama);
        assert_eq!(original_config.routing, loaded_config.routing);
        assert_eq!(original_config.search, loaded_config.search);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [ollama
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [ollama]
            protocol = "http"
            host = "localhost"
            port = 11434
            embedding_model = "nomic-embed-text:latest"
            chat_model = "llama3.2:latest"
            batch_size = 64
            temperature = 0.2
            timeout_secs = 60

            [chunking]
            max_chunk_size = 300
            overlap = 0

            [retrieval]
            max_results = 4
            min_score = 0.6
            timeout_secs = 10

            [routing]
            strategy = "threshold"
            threshold = 0.8
            on_ambiguous = "route_to_all"
            on_failure = "do_not_route"
            history_turns = 2

            [search]
            api_key_env = "MY_SEARCH_KEY"
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert_eq!(config.ollama.batch_size, 64);
        assert_eq!(config.ollama.timeout_secs, 60);
        assert_eq!(config.chunking.overlap, 0);
        assert_eq!(config.retrieval.max_results, 4);
        assert_eq!(config.routing.strategy, StrategyKind::Threshold);
        assert_eq!(config.routing.history_turns, 2);
        assert_eq!(config.search.api_key_env, "MY_SEARCH_KEY");
        assert_eq!(config.search.base_url, "https://api.tavily.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_validation_edge_cases() {
        let mut config = Config::default();
        config.ollama.host = String::new();

        assert!(config.validate().is_err());
    }

    #[test]
    fn ollama_url_generation_with_different_hosts() {
        let configs = vec![
            ("http", "localhost", 11434, "http://localhost:11434/"),
            ("http", "127.0.0.1", 8080, "http://127.0.0.1:8080/"),
            (
                "https",
                "secure.example.com",
                443,
                "https://secure.example.com/",
            ),
        ];

        for (protocol, host, port, expected_url) in configs {
            let ollama = OllamaConfig {
                protocol: protocol.to_string(),
                host: host.to_string(),
                port,
                ..OllamaConfig::default()
            };

            let url = ollama.ollama_url().expect("ollama_url is ok");
            assert_eq!(url.as_str(), expected_url);
        }
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::InvalidGateQuestion,
            ConfigError::InvalidScore(2.0),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(message.len() > 10);
        }
    }

    #[test]
    fn config_dir_is_resolvable() {
        let dir = get_config_dir().expect("should resolve config dir");
        assert!(dir.ends_with("rag-router") || dir.ends_with(".rag-router"));
    }
}
