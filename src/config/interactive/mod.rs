
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::Path;

use super::{Config, ConfigError, LlmConfig};

#[inline]
pub fn run_interactive_config(config_path: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 RAG QA Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_path)?;

    eprintln!("{}", style("Language Model").bold().yellow());
    eprintln!("Configure the OpenAI-compatible chat completion API used to answer questions.");
    eprintln!();

    configure_llm(&mut config.llm)?;

    eprintln!();
    if config.llm.resolve_api_key().is_some() {
        eprintln!(
            "{}",
            style(format!("✓ API key found in ${}", config.llm.api_key_env)).green()
        );
    } else {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: ${} is not set; questions will fail until it is",
                config.llm.api_key_env
            ))
            .yellow()
        );
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
            style(config.path.display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Corpus & Index:").bold().yellow());
    eprintln!(
        "  Dataset: {}",
        style(config.corpus.dataset_dir.display()).cyan()
    );
    eprintln!("  Index: {}", style(config.index.path.display()).cyan());
    eprintln!("  Top K: {}", style(config.index.top_k).cyan());
    eprintln!(
        "  Chunking: {} chars, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());
    eprintln!(
        "  Cache: {}",
        style(config.embedding.resolved_cache_dir().display()).cyan()
    );
    eprintln!();
    eprintln!("{}", style("Language Model:").bold().yellow());
    match config.llm.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.llm.model).cyan());
    eprintln!("  Temperature: {}", style(config.llm.temperature).cyan());
    eprintln!(
        "  API key: {}",
        style(mask_api_key(config.llm.resolve_api_key().as_deref())).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Listen: {}", style(config.bind_address()).cyan());

    eprintln!();
    eprintln!("Config file: {}", style(config.path.display()).dim());

    Ok(())
}

fn load_existing_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
    }

    Config::load(config_path).map_or_else(
        |e| {
            eprintln!(
                "{}",
                style(format!("Existing configuration is invalid ({e:#}). Using defaults."))
                    .yellow()
            );
            Ok(Config {
                path: config_path.to_path_buf(),
                ..Config::default()
            })
        },
        Ok,
    )
}

fn configure_llm(llm: &mut LlmConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(llm.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = LlmConfig {
                base_url: input.clone(),
                ..LlmConfig::default()
            };
            candidate.endpoint_url()?;
            Ok(())
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Chat model")
        .default(llm.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Sampling temperature")
        .default(llm.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(llm.api_key_env.clone())
        .interact_text()?;

    llm.set_base_url(base_url)?;
    llm.set_model(model)?;
    llm.set_temperature(temperature)?;
    llm.set_api_key_env(api_key_env)?;

    Ok(())
}

/// Render an API key for display without revealing it
fn mask_api_key(key: Option<&str>) -> String {
    match key {
        None => "not set".to_string(),
        Some(key) => {
            let len = key.chars().count();
            if len <= 8 {
                return "********".to_string();
            }
            let tail: String = key.chars().skip(len - 4).collect();
            format!("********{tail}")
        }
    }
}
