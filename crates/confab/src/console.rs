//! Terminal styling helpers shared by the chat and ask flows.
use confab_core::completion::CompletionMetrics;
use console::{Style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Prompt,
    Footer,
    Error,
}

pub fn style_text(text: &str, style: MessageType) -> StyledObject<&str> {
    let style_obj = match style {
        MessageType::Prompt => Style::new().blue().bold(),
        MessageType::Footer => Style::new().white().dim(),
        MessageType::Error => Style::new().red().bold(),
    };
    style_obj.apply_to(text)
}

pub fn present_error(err: &anyhow::Error) {
    eprintln!("{}", style_text(&format!("Error: {err:#}"), MessageType::Error));
}

/// Single-line turn summary printed under a reply.
pub fn format_footer_metrics(
    metrics: &CompletionMetrics,
    finish_reason: Option<&str>,
    is_cancelled: bool,
) -> String {
    if is_cancelled {
        return "◼ Cancelled.".to_string();
    }

    let mut parts = vec![match finish_reason {
        Some(reason) => format!("◼ Completed ({reason})."),
        None => "◼ Completed.".to_string(),
    }];

    let total_ms = metrics.prompt_eval_latency_ms + metrics.completion_latency_ms;
    if total_ms > 0.0 {
        parts.push(format!("{:.2}s total.", total_ms / 1000.0));
    }
    if metrics.completion_tokens > 0 {
        let mut tokens = format!("{} tokens", metrics.completion_tokens);
        if metrics.completion_latency_ms > 0.0 {
            let rate = metrics.completion_tokens as f32 * 1000.0 / metrics.completion_latency_ms;
            tokens.push_str(&format!(" at {rate:.1} tokens/s"));
        }
        tokens.push('.');
        parts.push(tokens);
    }
    if metrics.prompt_tokens > 0 {
        parts.push(format!("{} prompt tokens.", metrics.prompt_tokens));
    }

    parts.join(" ")
}

#[derive(Debug)]
pub struct GenerationSpinner {
    spinner: ProgressBar,
}

impl GenerationSpinner {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message("Generating...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));

        Self { spinner }
    }

    pub fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Default for GenerationSpinner {
    fn default() -> Self {
        Self::new()
    }
}
