//! Confab app cli definition and entrypoint.
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use confab_core::config::{Config, GenerationProfile, ModeConfig, get_config};
use confab_core::model::ModelConfig;

use crate::log::setup_logging;

/// Confab - chat with local and hosted language models.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show verbose logs.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question and print the answer.
    Ask {
        /// Question to ask.
        question: Vec<String>,
        /// Model to use, from the ask model table.
        #[arg(short, long)]
        model: Option<String>,
        /// Sampling temperature, within 0.0 to 1.0.
        #[arg(short, long)]
        temperature: Option<f32>,
        /// Bound on generated tokens, within 50 to 300.
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// Chat with a model, keeping conversation history.
    Chat {
        /// Model to use, from the chat model table.
        #[arg(short, long)]
        model: Option<String>,
        /// Sampling temperature, within 0.0 to 1.0.
        #[arg(short, long)]
        temperature: Option<f32>,
        /// Bound on generated tokens, within 50 to 300.
        #[arg(long)]
        max_tokens: Option<u32>,
    },
    /// List the model tables for both flows.
    Models,
}

/// Runs the main CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        setup_logging().context("Failed to set up logging")?;
    }

    // Load configuration
    let config = get_config(None).context("Failed to load configuration")?;

    match &cli.command {
        Commands::Ask {
            question,
            model,
            temperature,
            max_tokens,
        } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                bail!("Please provide a question to ask");
            }
            let model_config = select_model(&config.ask, model.as_deref())?;
            let profile = profile_with_overrides(&config.ask.profile, *temperature, *max_tokens);
            crate::ask::execute(question.trim(), model_config, profile).await
        }
        Commands::Chat {
            model,
            temperature,
            max_tokens,
        } => {
            let model_config = select_model(&config.chat, model.as_deref())?;
            let profile = profile_with_overrides(&config.chat.profile, *temperature, *max_tokens);
            crate::chat::execute(model_config, profile).await
        }
        Commands::Models => {
            print_models(&config);
            Ok(())
        }
    }
}

/// Pick from the mode's fixed model table; the first entry is the default.
fn select_model(mode: &ModeConfig, requested: Option<&str>) -> Result<ModelConfig> {
    match requested {
        Some(key) => mode.find_model(key).cloned().with_context(|| {
            let available = mode
                .models
                .iter()
                .map(|m| m.display_name())
                .collect::<Vec<_>>()
                .join(", ");
            format!("Model '{key}' is not in this flow's model table. Available: {available}")
        }),
        None => Ok(mode.default_model().clone()),
    }
}

/// CLI flags override the mode profile; the result is clamped into the
/// UI bounds before it reaches a provider.
fn profile_with_overrides(
    base: &GenerationProfile,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> GenerationProfile {
    GenerationProfile {
        temperature: temperature.unwrap_or(base.temperature),
        max_tokens: max_tokens.unwrap_or(base.max_tokens),
    }
    .clamped()
}

fn print_models(config: &Config) {
    for (flow, mode) in [("ask", &config.ask), ("chat", &config.chat)] {
        println!("{flow}:");
        for (i, model) in mode.models.iter().enumerate() {
            let marker = if i == 0 { "  (default)" } else { "" };
            if model.label.is_some() {
                println!("  {} -> {}{marker}", model.display_name(), model.name);
            } else {
                println!("  {}{marker}", model.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::model::ModelProvider;
    use std::collections::HashMap;

    fn mode_with(names: &[&str]) -> ModeConfig {
        ModeConfig {
            models: names
                .iter()
                .map(|name| ModelConfig {
                    name: name.to_string(),
                    label: None,
                    provider: ModelProvider::Ollama,
                    settings: HashMap::new(),
                })
                .collect(),
            profile: GenerationProfile::default(),
        }
    }

    #[test]
    fn test_select_model_defaults_to_first_entry() {
        let mode = mode_with(&["mistral", "llama3.2:1b"]);
        assert_eq!(select_model(&mode, None).unwrap().name, "mistral");
        assert_eq!(
            select_model(&mode, Some("llama3.2:1b")).unwrap().name,
            "llama3.2:1b"
        );
    }

    #[test]
    fn test_select_model_rejects_unknown_key() {
        let mode = mode_with(&["mistral"]);
        let err = select_model(&mode, Some("gpt-4")).unwrap_err();
        assert!(err.to_string().contains("not in this flow's model table"));
    }

    #[test]
    fn test_profile_overrides_are_clamped() {
        let base = GenerationProfile::default();
        let profile = profile_with_overrides(&base, Some(7.0), Some(1));
        assert_eq!(profile.temperature, 1.0);
        assert_eq!(profile.max_tokens, 50);

        let untouched = profile_with_overrides(&base, None, None);
        assert_eq!(untouched, base);
    }
}
