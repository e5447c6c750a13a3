// Configuration management module
// TOML settings file plus the interactive setup wizard

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChatConfig, Config, ConfigError, CorpusConfig, DEFAULT_CONFIG_FILE, EmbeddingConfig,
    IndexConfig, LlmConfig, ServerConfig,
};
