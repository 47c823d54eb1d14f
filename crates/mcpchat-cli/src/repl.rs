//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Turn progress events are rendered while the turn is still running.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use mcpchat_agent::{AgentLoop, Session, TurnEvent, TurnReport};

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// A line typed at the prompt.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Exit,
    New,
    List,
    Load(&'a str),
    Snapshots,
    Tools,
    Help,
    Unknown(&'a str),
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if EXIT_COMMANDS.contains(&trimmed.to_lowercase().as_str()) {
        return Input::Exit;
    }
    if !trimmed.starts_with('/') {
        return Input::Message(trimmed);
    }
    let (command, rest) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
    match (command.to_lowercase().as_str(), rest.trim()) {
        ("/new", _) => Input::New,
        ("/list", _) => Input::List,
        ("/load", id) if !id.is_empty() => Input::Load(id),
        ("/snapshots", _) => Input::Snapshots,
        ("/tools", _) => Input::Tools,
        ("/help", _) => Input::Help,
        _ => Input::Unknown(trimmed),
    }
}

/// Run the interactive REPL loop.
pub async fn run(agent: &AgentLoop, session: &mut Session, events: &mut UnboundedReceiver<TurnEvent>) -> Result<()> {
    helpers::print_banner(agent.model(), session.id());

    let mut editor = create_editor()?;

    loop {
        let line = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let input = parse_input(&line);
        if input == Input::Message("") {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        match input {
            Input::Exit => {
                println!("\nGoodbye!");
                break;
            }
            Input::New => {
                session.new_conversation();
                helpers::print_info(&format!("Started conversation {}", session.id()));
            }
            Input::List => match session.store().list() {
                Ok(summaries) => helpers::print_conversations(&summaries),
                Err(e) => helpers::print_error(&format!("Failed to list conversations: {e}")),
            },
            Input::Load(id) => match session.resume(id) {
                Ok(()) => {
                    helpers::print_info(&format!(
                        "Loaded conversation {} ({} messages)",
                        session.id(),
                        session.messages().len()
                    ));
                    for message in session.messages() {
                        helpers::print_message(message);
                    }
                }
                Err(e) => helpers::print_error(&format!("Failed to load {id}: {e}")),
            },
            Input::Snapshots => match session.store().snapshots(session.id()) {
                Ok(stamps) => helpers::print_snapshots(session.id(), &stamps),
                Err(e) => helpers::print_error(&format!("Failed to list snapshots: {e}")),
            },
            Input::Tools => match session.connect_tools().await {
                Ok(registry) => helpers::print_tools(registry),
                Err(e) => helpers::print_error(&format!("Error connecting to tool servers: {e}")),
            },
            Input::Help => helpers::print_help(),
            Input::Unknown(command) => helpers::print_error(&format!("Unknown command: {command} (try /help)")),
            Input::Message(text) => {
                debug!(conversation = %session.id(), "processing input");
                let report = drive_turn(agent, session, text, events).await;
                helpers::print_report_warnings(&report);
            }
        }
    }

    save_history(&mut editor);
    Ok(())
}

/// Run one turn, rendering progress events as they arrive.
pub async fn drive_turn(
    agent: &AgentLoop,
    session: &mut Session,
    input: &str,
    events: &mut UnboundedReceiver<TurnEvent>,
) -> TurnReport {
    helpers::print_thinking();
    let turn = agent.run_turn(session, input);
    tokio::pin!(turn);

    let report = loop {
        tokio::select! {
            report = &mut turn => break report,
            Some(event) = events.recv() => {
                helpers::clear_thinking();
                helpers::print_event(&event);
            }
        }
    };

    helpers::clear_thinking();
    while let Ok(event) = events.try_recv() {
        helpers::print_event(&event);
    }
    report
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    mcpchat_core::utils::get_data_path().join("history").join("cli_history")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
