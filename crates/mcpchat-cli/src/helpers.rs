//! Shared CLI helpers — banner, message rendering, tool progress lines.

use colored::Colorize;
use serde_json::Value;

use mcpchat_agent::{ToolRegistry, TurnEvent, TurnReport};
use mcpchat_core::store::ConversationSummary;
use mcpchat_core::types::{Message, ToolArguments};
use mcpchat_core::utils::truncate_string;

/// Longest tool output shown inline.
const MAX_PREVIEW: usize = 200;

/// Print the banner shown at REPL start.
pub fn print_banner(model: &str, conversation: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "mcpchat".cyan().bold(), version.dimmed());
    println!("{}", format!("model: {model} | conversation: {conversation}").dimmed());
    println!(
        "{}",
        "Type a message, /help for commands, or \"exit\" to quit.".dimmed()
    );
    println!();
}

pub fn print_help() {
    println!();
    println!("  {:<12} start a new conversation", "/new".bold());
    println!("  {:<12} list stored conversations", "/list".bold());
    println!("  {:<12} resume a stored conversation", "/load <id>".bold());
    println!("  {:<12} list audit snapshots of this conversation", "/snapshots".bold());
    println!("  {:<12} list available tools", "/tools".bold());
    println!("  {:<12} quit", "/exit".bold());
    println!();
}

/// Print a "thinking" placeholder.
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

pub fn print_info(text: &str) {
    println!("{}", text.dimmed());
}

pub fn print_error(text: &str) {
    eprintln!("{} {}", "✗".red().bold(), text.red());
}

/// Render one turn progress event.
pub fn print_event(event: &TurnEvent) {
    match event {
        TurnEvent::AssistantText(text) => print_response(text),
        TurnEvent::ToolCallPending { name, arguments, .. } => println!("{}", pending_line(name, arguments)),
        TurnEvent::ToolCallFinished {
            name,
            is_error,
            content,
            ..
        } => println!("{}", finished_line(name, *is_error, content)),
        TurnEvent::Error(text) => print_error(text),
    }
}

/// Print what the user should know about a finished turn beyond its events.
pub fn print_report_warnings(report: &TurnReport) {
    if let Some(ref e) = report.persistence_error {
        print_error(&format!("Conversation was not saved: {e}"));
    }
}

/// Print an agent response to stdout.
pub fn print_response(response: &str) {
    println!();
    println!("{}", "Assistant".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

/// Print a stored message.
pub fn print_message(message: &Message) {
    match message {
        Message::Human { text } => println!("{} {text}", "You:".green().bold()),
        Message::AgentText { text } => println!("{} {text}", "Assistant:".cyan().bold()),
        Message::AgentToolRequest { calls, text } => {
            if let Some(text) = text {
                println!("{} {text}", "Assistant:".cyan().bold());
            }
            for call in calls {
                println!("{}", pending_line(&call.name, &call.arguments));
            }
        }
        Message::ToolResult(result) => println!("{}", finished_line(&result.tool_name, result.is_error, &result.content)),
    }
}

pub fn print_conversations(summaries: &[ConversationSummary]) {
    if summaries.is_empty() {
        println!("{}", "No stored conversations.".dimmed());
        return;
    }
    for summary in summaries {
        println!("  {:<38} {}", summary.id, summary.display_last_updated().dimmed());
    }
}

pub fn print_snapshots(id: &str, stamps: &[String]) {
    if stamps.is_empty() {
        println!("{}", format!("No snapshots of {id}.").dimmed());
        return;
    }
    println!("{}", format!("{} snapshots of {id}, oldest first", stamps.len()).dimmed());
    for stamp in stamps {
        println!("  {stamp}");
    }
}

pub fn print_tools(registry: &ToolRegistry) {
    if registry.is_empty() {
        println!("{}", "No tools available.".dimmed());
        return;
    }
    println!(
        "{}",
        format!("{} tools from {} servers", registry.len(), registry.server_count()).dimmed()
    );
    for def in registry.definitions() {
        println!("  {:<24} {}", def.name.bold(), first_line(&def.description).dimmed());
    }
}

// ─────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────

/// `→ name(arg=value, ...)`
fn pending_line(name: &str, arguments: &ToolArguments) -> String {
    format!("  {} {}({})", "→".yellow(), name.bold(), format_arguments(arguments))
}

/// `✓ name: preview` or `✗ name: preview`
fn finished_line(name: &str, is_error: bool, content: &str) -> String {
    let preview = truncate_string(&first_line(content), MAX_PREVIEW);
    if is_error {
        format!("  {} {}: {}", "✗".red(), name.bold(), preview.red())
    } else {
        format!("  {} {}: {}", "✓".green(), name.bold(), preview.dimmed())
    }
}

fn format_arguments(arguments: &ToolArguments) -> String {
    arguments
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => format!("{s:?}"),
                other => other.to_string(),
            };
            format!("{key}={}", truncate_string(&rendered, 60))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_line(text: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("").to_string();
    if lines.next().is_some() {
        format!("{first} …")
    } else {
        first
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn arguments_render_in_order() {
        let mut args = ToolArguments::new();
        args.insert("city".into(), json!("Paris"));
        args.insert("days".into(), json!(3));
        assert_eq!(format_arguments(&args), r#"city="Paris", days=3"#);
    }

    #[test]
    fn pending_line_plain() {
        plain();
        assert_eq!(pending_line("get_time", &ToolArguments::new()), "  → get_time()");
    }

    #[test]
    fn finished_line_shows_error_marker() {
        plain();
        assert_eq!(finished_line("get_time", false, "12:00"), "  ✓ get_time: 12:00");
        assert_eq!(
            finished_line("teleport", true, "tool not found: teleport"),
            "  ✗ teleport: tool not found: teleport"
        );
    }

    #[test]
    fn finished_line_truncates_long_output() {
        plain();
        let long = "x".repeat(500);
        let line = finished_line("dump", false, &long);
        assert!(line.ends_with("..."));
        assert!(line.len() < 250);
    }

    #[test]
    fn first_line_marks_more() {
        assert_eq!(first_line("one\ntwo"), "one …");
        assert_eq!(first_line("only"), "only");
        assert_eq!(first_line(""), "");
    }
}
