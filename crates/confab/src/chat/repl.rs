// Handles user interaction for chat
use crate::chat::Chat;
use crate::console::{GenerationSpinner, MessageType, format_footer_metrics, style_text};
use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser, Subcommand};
use confab_core::completion::{CancellationToken, CompletionMetrics, Role};
use confab_core::config::GenerationProfile;
use confab_core::get_completion_llm;
use confab_core::model::ModelConfig;
use console::Style;
use rustyline::CompletionType;
use rustyline::completion::Candidate;
use rustyline::{Config, Context, Editor, Helper, Highlighter, Validator, error::ReadlineError};
use std::io::Write;

#[derive(Debug)]
struct CompletionCandidate {
    text: String,
    display_string: String,
}

impl CompletionCandidate {
    fn new(text: String) -> Self {
        let display_string = Style::new().white().apply_to(&text).to_string();
        Self {
            text,
            display_string,
        }
    }
}

impl Candidate for CompletionCandidate {
    fn display(&self) -> &str {
        &self.display_string
    }

    fn replacement(&self) -> &str {
        &self.text
    }
}

#[derive(Parser, Debug)]
#[command(multicall = true)]
struct SlashCommand {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clear chat history
    Clear,
    /// Show the recent conversation. E.g. /history 5
    #[command(alias = "h")]
    History {
        /// Number of turns to show
        n: Option<usize>,
    },
    /// Show raw provider chunks for the last reply
    Log,
    /// Exit the chat session
    #[command(alias = "q", alias = "quit")]
    Exit,
}

#[derive(Helper, Validator, Highlighter)]
struct CommandCompleter {
    command_names: Vec<String>,
}

impl rustyline::completion::Completer for CommandCompleter {
    type Candidate = CompletionCandidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context,
    ) -> Result<(usize, Vec<Self::Candidate>), ReadlineError> {
        // Only suggest commands at start of line
        if pos == 0 || line.starts_with('/') {
            let candidates = self
                .command_names
                .iter()
                .filter(|&cmd_name| cmd_name.starts_with(line))
                .map(|s| CompletionCandidate::new(s.clone()))
                .collect();

            Ok((0, candidates))
        } else {
            Ok((0, Vec::new()))
        }
    }
}

impl rustyline::hint::Hinter for CommandCompleter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context) -> Option<Self::Hint> {
        if line.is_empty() || pos < line.len() {
            return None;
        }
        if line.starts_with('/') {
            // Suggest command completions
            self.command_names
                .iter()
                .find(|&cmd_name| cmd_name.starts_with(line))
                .map(|cmd_name| {
                    format!("{}", Style::new().white().apply_to(&cmd_name[line.len()..]))
                })
        } else {
            None
        }
    }
}

/// Chat UX flow
pub async fn execute(model_config: ModelConfig, profile: GenerationProfile) -> Result<()> {
    let model = get_completion_llm(model_config.clone()).context("Failed to initialize chat model")?;
    let mut chat = Chat::new(model, profile);

    println!(
        "Welcome to confab chat with {}! Type '/help' for commands, '/q' to exit.",
        model_config.display_name()
    );

    // Configure rustyline
    let config = Config::builder()
        .history_ignore_dups(true)?
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let command_names = SlashCommand::command()
        .get_subcommands()
        .flat_map(|c| c.get_name_and_visible_aliases())
        .map(|s| format!("/{s}"))
        .collect::<Vec<_>>();

    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(CommandCompleter { command_names }));

    let prompt = (style_text("> ", MessageType::Prompt)).to_string();
    loop {
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(&line)?;
                let user_input = line.trim();

                // Skip empty input
                if user_input.is_empty() {
                    continue;
                }

                let continue_repl = match user_input.starts_with('/') {
                    true => process_command(&mut chat, user_input)?,
                    false => process_message(&mut chat, user_input).await?,
                };

                if continue_repl {
                    continue;
                }

                return Ok(());
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C pressed, but not during generation.
                // The generation flow handles Ctrl-C during generation.
                println!("Type /quit to exit.");
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D pressed
                println!("\nBye!");
                return Ok(());
            }
            Err(err) => {
                return Err(err.into());
            }
        }
    }
}

/// Returns false if the REPL should break.
fn process_command(chat: &mut Chat, user_input: &str) -> Result<bool> {
    // Handle commands
    let args = match shlex::split(user_input) {
        Some(args) => args,
        None => {
            println!("Invalid command syntax");
            return Ok(true);
        }
    };

    let continue_repl = match SlashCommand::try_parse_from(args) {
        Ok(SlashCommand { command }) => match command {
            Command::Clear => {
                chat.clear();
                println!("Chat history cleared");
                true
            }
            Command::History { n } => {
                show_history(chat, n.unwrap_or(10));
                true
            }
            Command::Log => {
                match chat.last_reply() {
                    Some(context) => {
                        println!(
                            "\n=== LOGS ({}) ===\n{}\n=============",
                            context.timestamp.format("%H:%M:%S"),
                            context.logs
                        );
                    }
                    None => println!("No logs available"),
                }
                true
            }
            Command::Exit => {
                println!("Bye!");
                false
            }
        },
        Err(e) => {
            e.print().unwrap();
            true
        }
    };

    Ok(continue_repl)
}

fn show_history(chat: &Chat, n: usize) {
    let mut shown = false;
    for turn in chat.session().recent(n) {
        let who = match turn.role {
            Role::User => "You:",
            Role::Assistant => "AI:",
            Role::System => continue,
        };
        println!("{} {}", style_text(who, MessageType::Prompt), turn.content);
        shown = true;
    }
    if !shown {
        println!("No conversation yet.");
    }
}

/// Returns false if the REPL should break.
async fn process_message(chat: &mut Chat, line: &str) -> Result<bool> {
    let spinner = GenerationSpinner::new();
    let cancel_token = CancellationToken::new();

    // Ctrl-C during generation cancels the turn, not the REPL.
    let ctrl_c_token = cancel_token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let mut first_token = true;
    let result = chat
        .send(line, cancel_token.clone(), |token| {
            if first_token {
                spinner.clear();
                first_token = false;
            }
            print!("{token}");
            let _ = std::io::stdout().flush();
        })
        .await;

    spinner.clear();
    ctrl_c.abort();

    let was_cancelled = cancel_token.is_cancelled();
    match result {
        Ok(_) => {
            let (metrics, finish_reason) = chat
                .last_reply()
                .map(|context| (context.metrics.clone(), context.finish_reason.clone()))
                .unwrap_or_default();
            let footer = format_footer_metrics(&metrics, finish_reason.as_deref(), false);
            println!();
            println!();
            println!("{}", style_text(&footer, MessageType::Footer));
            println!();
        }
        Err(_) if was_cancelled => {
            let footer = format_footer_metrics(&CompletionMetrics::default(), None, true);
            println!();
            println!();
            println!("{}", style_text(&footer, MessageType::Footer));
            println!();
        }
        Err(e) => {
            // The turn did not happen; the session is unchanged.
            println!();
            eprintln!("{}", style_text(&format!("Error: {e:#}"), MessageType::Error));
            println!();
        }
    }

    Ok(true)
}
