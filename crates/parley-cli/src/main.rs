use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use parley_cli::{format_models, format_usage, CliClient, CliError, DEFAULT_SERVER};
use parley_protocol::{Message, Role};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

const REPL_COMMANDS: &[&str] = &[
    "/model", "/models", "/system", "/history", "/reset", "/help", "/exit", "/quit",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Say(String),
    Model(String),
    ShowModel,
    Models,
    System(String),
    History,
    Reset,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

#[derive(Default)]
struct ReplHelper;

impl Helper for ReplHelper {}
impl Hinter for ReplHelper {
    type Hint = String;
}
impl Highlighter for ReplHelper {}
impl Validator for ReplHelper {}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let pos = pos.min(line.len());
        let input = &line[..pos];
        if input.contains(char::is_whitespace) {
            return Ok((pos, Vec::new()));
        }

        let pairs = complete_candidates(input)
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.to_string(),
                replacement: candidate.to_string(),
            })
            .collect();
        Ok((0, pairs))
    }
}

/// Lines starting with `/` are commands; anything else is chat text.
fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if !line.starts_with('/') {
        return ReplCommand::Say(line.to_string());
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let tail = parts.next().map(str::trim).unwrap_or_default();

    match command {
        "/exit" | "/quit" => ReplCommand::Exit,
        "/help" | "/?" => ReplCommand::Help,
        "/models" => ReplCommand::Models,
        "/history" => ReplCommand::History,
        "/reset" => ReplCommand::Reset,
        "/model" if !tail.is_empty() => ReplCommand::Model(tail.to_string()),
        "/model" => ReplCommand::ShowModel,
        "/system" if !tail.is_empty() => ReplCommand::System(tail.to_string()),
        "/system" => ReplCommand::Unknown("usage: /system <instruction>".to_string()),
        _ => ReplCommand::Unknown(format!("unknown command: {command}")),
    }
}

fn help_text() -> String {
    [
        "Type a message to chat. Commands:",
        "  /model <id|family>     Select the model for the next turns",
        "  /model                 Show the selected model",
        "  /models                List models offered by the gateway",
        "  /system <instruction>  Add a system instruction to the conversation",
        "  /history               Show the conversation so far",
        "  /reset                 Start a new conversation",
        "  /help                  Show this help",
        "  /exit | /quit          Exit REPL",
    ]
    .join("\n")
}

/// The gateway is stateless, so the REPL owns the conversation.
#[derive(Debug)]
struct ReplState {
    model: Option<String>,
    conversation: Vec<Message>,
    client: CliClient,
}

impl ReplState {
    fn new(client: CliClient, model: Option<String>) -> Self {
        Self {
            model,
            conversation: Vec::new(),
            client,
        }
    }
}

#[tokio::main]
async fn main() {
    if std::env::args().count() > 1 {
        let cli = parley_cli::Cli::parse();
        match parley_cli::run(cli).await {
            Ok(output) => {
                println!("{output}");
            }
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut editor = match Editor::<ReplHelper, rustyline::history::DefaultHistory>::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("error: failed to start REPL: {err}");
            std::process::exit(1);
        }
    };
    editor.set_helper(Some(ReplHelper));
    let history = history_file();
    let _ = editor.load_history(&history);

    let server = std::env::var("PARLEY_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
    let client = match CliClient::new(server) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    let mut state = ReplState::new(client, std::env::var("PARLEY_MODEL").ok());
    println!(
        "{}",
        "Parley interactive mode. Type `/help`.".bright_green()
    );
    loop {
        match editor.readline("parley> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);
                match run_repl_command(&mut state, parse_command(trimmed)).await {
                    Ok(should_exit) => {
                        if should_exit {
                            break;
                        }
                    }
                    Err(err) => eprintln!("{} {}", "error:".red(), err),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                eprintln!("{} {err}", "error:".red());
                break;
            }
        }
    }

    if let Err(err) = editor.save_history(&history) {
        eprintln!("{} failed to save history: {err}", "warning:".yellow());
    }
}

async fn run_repl_command(state: &mut ReplState, command: ReplCommand) -> Result<bool, CliError> {
    match command {
        ReplCommand::Say(text) => {
            let model = state.model.clone().ok_or_else(|| {
                CliError::InvalidArgument("select a model with `/model <id>` first".to_string())
            })?;
            state.conversation.push(Message::user(text));
            match state.client.chat(&model, &state.conversation).await {
                Ok(response) => {
                    println!("{}", response.content);
                    println!("{}", format_usage(&response).dimmed());
                    state.conversation.push(Message::assistant(response.content));
                }
                Err(err) => {
                    // a failed turn is not part of the conversation
                    state.conversation.pop();
                    return Err(err);
                }
            }
        }
        ReplCommand::Model(model) => {
            println!("{} {}", "using model".green(), model.cyan());
            state.model = Some(model);
        }
        ReplCommand::ShowModel => match &state.model {
            Some(model) => println!("{} {}", "current model:".green(), model.cyan()),
            None => println!("{}", "no model selected".yellow()),
        },
        ReplCommand::Models => {
            let models = state.client.models().await?;
            println!("{}", format_models(&models));
        }
        ReplCommand::System(instruction) => {
            state.conversation.push(Message::system(instruction));
            println!("{}", "system instruction added".green());
        }
        ReplCommand::History => {
            if state.conversation.is_empty() {
                println!("{}", "conversation is empty".yellow());
            }
            for message in &state.conversation {
                println!("{}", render_history_line(message));
            }
        }
        ReplCommand::Reset => {
            state.conversation.clear();
            println!("{}", "conversation cleared".green());
        }
        ReplCommand::Help => {
            println!("{}", help_text().bright_blue());
        }
        ReplCommand::Exit => {
            println!("{}", "bye".bright_green());
            return Ok(true);
        }
        ReplCommand::Empty => {}
        ReplCommand::Unknown(message) => {
            println!("{} {message}", "warning:".yellow());
            println!("{}", "Type `/help` for available commands.".yellow());
        }
    }

    Ok(false)
}

fn render_history_line(message: &Message) -> String {
    let role = match message.role {
        Role::System => message.role.as_str().magenta(),
        Role::User => message.role.as_str().cyan(),
        Role::Assistant => message.role.as_str().green(),
    };
    format!("{role}: {}", message.content)
}

fn history_file() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley-history");
    }
    PathBuf::from(".parley-history")
}

fn complete_candidates(prefix: &str) -> BTreeSet<&'static str> {
    REPL_COMMANDS
        .iter()
        .copied()
        .filter(|command| command.starts_with(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{complete_candidates, help_text, parse_command, ReplCommand};

    #[test]
    fn plain_text_is_chat() {
        let command = parse_command("  what is my name?  ");
        assert_eq!(command, ReplCommand::Say("what is my name?".to_string()));
    }

    #[test]
    fn parse_model_selection() {
        assert_eq!(
            parse_command("/model gpt-4o"),
            ReplCommand::Model("gpt-4o".to_string())
        );
        assert_eq!(parse_command("/model"), ReplCommand::ShowModel);
    }

    #[test]
    fn parse_system_requires_instruction() {
        assert_eq!(
            parse_command("/system"),
            ReplCommand::Unknown("usage: /system <instruction>".to_string())
        );
        assert_eq!(
            parse_command("/system answer in French"),
            ReplCommand::System("answer in French".to_string())
        );
    }

    #[test]
    fn unknown_slash_command_is_reported() {
        assert_eq!(
            parse_command("/frobnicate now"),
            ReplCommand::Unknown("unknown command: /frobnicate".to_string())
        );
        assert_eq!(parse_command("   "), ReplCommand::Empty);
        assert_eq!(parse_command("/quit"), ReplCommand::Exit);
    }

    #[test]
    fn complete_candidates_matches_prefix() {
        let candidates = complete_candidates("/mo");
        assert!(candidates.contains("/model"));
        assert!(candidates.contains("/models"));
        assert!(!candidates.contains("/reset"));
    }

    #[test]
    fn help_text_lists_commands() {
        let help = help_text();
        for command in ["/model <id|family>", "/models", "/system", "/history", "/reset"] {
            assert!(help.contains(command), "help text missing `{command}`");
        }
    }
}
