// Configuration management module
// TOML settings for the pipeline and the interactive setup wizard

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, MemoryConfig, OllamaConfig, RetrievalConfig, RoutingConfig,
    SearchConfig, StrategyKind,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
