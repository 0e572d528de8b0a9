//! One-shot question flow: a fixed instruction plus a single question, no
//! history retained across calls.
use anyhow::{Context, Result};
use confab_core::completion::{
    CancellationToken, Completion, CompletionMetrics, GenerationError,
};
use confab_core::config::GenerationProfile;
use confab_core::get_completion_llm;
use confab_core::model::ModelConfig;
use confab_core::prompt::compose_question;
use futures::StreamExt;
use std::io::Write;
use tracing::debug;

use crate::console::{GenerationSpinner, MessageType, format_footer_metrics, style_text};

/// Run the ask command with the given question and generation profile.
pub async fn execute(
    question: &str,
    model_config: ModelConfig,
    profile: GenerationProfile,
) -> Result<()> {
    let mut model = get_completion_llm(model_config).context("Failed to initialize model")?;
    let messages = compose_question(question);
    debug!(
        temperature = profile.temperature as f64,
        max_tokens = profile.max_tokens,
        "Dispatching question"
    );

    let spinner = GenerationSpinner::new();
    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let mut metrics = CompletionMetrics::default();
    let mut finish_reason = None;
    let mut failure = None;
    let mut first_token = true;

    {
        let mut stream = model
            .complete(&messages, &profile, cancel_token.clone())
            .await;
        while let Some(result) = stream.next().await {
            match result {
                Ok(Completion::Response(response)) => {
                    if first_token {
                        spinner.clear();
                        first_token = false;
                    }
                    if response.finish_reason.is_some() {
                        finish_reason = response.finish_reason;
                    }
                    print!("{}", response.text);
                    std::io::stdout().flush()?;
                }
                Ok(Completion::Metrics(m)) => metrics = m,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
    }

    spinner.clear();
    ctrl_c.abort();

    if let Some(err) = failure {
        if matches!(err, GenerationError::Cancelled) {
            let footer = format_footer_metrics(&CompletionMetrics::default(), None, true);
            println!();
            println!("{}", style_text(&footer, MessageType::Footer));
            return Ok(());
        }
        return Err(err).context("Generation failed");
    }

    let footer = format_footer_metrics(&metrics, finish_reason.as_deref(), false);
    println!();
    println!();
    println!("{}", style_text(&footer, MessageType::Footer));

    Ok(())
}
