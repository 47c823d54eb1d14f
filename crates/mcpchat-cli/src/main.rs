//! mcpchat CLI — entry point.
//!
//! # Commands
//!
//! - `mcpchat chat [-c ID] [-m MESSAGE] [--ephemeral]` — chat (single-shot or REPL)
//! - `mcpchat conversations` — list stored conversations
//! - `mcpchat show <ID> [--snapshots | --at TIMESTAMP]` — print a stored
//!   conversation, list its audit snapshots, or print one of them
//! - `mcpchat delete <ID>` — delete a stored conversation
//! - `mcpchat tools` — connect to the tool servers and list their tools
//! - `mcpchat onboard` — initialize config and a sample tool server document
//! - `mcpchat status` — show configuration status

mod helpers;
mod onboard;
mod repl;
mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mcpchat_agent::{AgentLoop, Session, ToolRegistry, TurnEvent};
use mcpchat_core::config::{load_config, load_mcp_config, Config};
use mcpchat_core::store::{ConversationStore, FileConversationStore, MemoryConversationStore};
use mcpchat_core::utils::expand_home;
use mcpchat_providers::HttpGateway;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// mcpchat — chat with a model that can call MCP tools
#[derive(Parser)]
#[command(name = "mcpchat", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single-shot or interactive REPL)
    Chat {
        /// Resume this conversation instead of starting a new one
        #[arg(short = 'c', long = "conversation")]
        conversation: Option<String>,

        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Keep the conversation in memory only
        #[arg(long, default_value_t = false)]
        ephemeral: bool,
    },

    /// List stored conversations, newest first
    Conversations,

    /// Print a stored conversation
    Show {
        /// Conversation id
        id: String,

        /// List the audit snapshots instead of printing the latest history
        #[arg(long, default_value_t = false, conflicts_with = "at")]
        snapshots: bool,

        /// Print the audit snapshot taken at this timestamp
        #[arg(long, value_name = "TIMESTAMP")]
        at: Option<String>,
    },

    /// Delete a stored conversation and its snapshots
    Delete {
        /// Conversation id
        id: String,
    },

    /// Connect to the declared tool servers and list their tools
    Tools,

    /// Initialize configuration and a sample tool server document
    Onboard,

    /// Show configuration status
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs, cli.log_json);

    match cli.command {
        Commands::Chat {
            conversation,
            message,
            ephemeral,
        } => run_chat(conversation, message, ephemeral).await,
        Commands::Conversations => list_conversations(),
        Commands::Show { id, snapshots, at } => {
            if snapshots {
                list_snapshots(&id)
            } else {
                show_conversation(&id, at.as_deref())
            }
        }
        Commands::Delete { id } => delete_conversation(&id),
        Commands::Tools => list_tools().await,
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run(),
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(conversation: Option<String>, message: Option<String>, ephemeral: bool) -> Result<()> {
    let config = load_config(None);
    let store = open_store(&config, ephemeral)?;

    match store.purge_expired() {
        Ok(0) => {}
        Ok(n) => debug!(removed = n, "purged expired conversation records"),
        Err(e) => warn!(error = %e, "failed to purge expired records"),
    }

    let mcp_path = mcp_config_path(&config);
    let mut session = Session::start(store, &mcp_path, conversation.as_deref())
        .with_context(|| format!("cannot start session with {}", mcp_path.display()))?
        .with_request_timeout(Duration::from_secs(config.agent.discovery_timeout_secs));

    let (tx, mut events) = mpsc::unbounded_channel::<TurnEvent>();
    let agent = build_agent_loop(&config)?.with_events(tx);
    info!(model = agent.model(), conversation = %session.id(), "chat started");

    let result = match message {
        Some(msg) => {
            let report = repl::drive_turn(&agent, &mut session, &msg, &mut events).await;
            helpers::print_report_warnings(&report);
            Ok(())
        }
        None => repl::run(&agent, &mut session, &mut events).await,
    };

    session.close().await;
    result
}

/// Build an `AgentLoop` from the loaded configuration.
fn build_agent_loop(config: &Config) -> Result<AgentLoop> {
    let timeout = Duration::from_secs(config.agent.backend_timeout_secs);
    let gateway = HttpGateway::new(&config.backend, timeout).context("failed to create model gateway")?;
    Ok(AgentLoop::from_config(Arc::new(gateway), &config.agent))
}

/// Open the conversation store named by the config, or an in-memory one.
fn open_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn ConversationStore>> {
    let ttl = chrono::Duration::days(config.store.ttl_days);
    if ephemeral {
        return Ok(Arc::new(MemoryConversationStore::new().with_ttl(ttl)));
    }
    let dir = expand_home(&config.store.directory);
    let store = FileConversationStore::new(Some(dir.clone()))
        .with_context(|| format!("failed to open conversation store at {}", dir.display()))?;
    Ok(Arc::new(store.with_ttl(ttl)))
}

/// Resolved path of the tool server document.
pub fn mcp_config_path(config: &Config) -> PathBuf {
    expand_home(&config.tools.mcp_config_path)
}

// ─────────────────────────────────────────────
// Conversation commands
// ─────────────────────────────────────────────

fn list_conversations() -> Result<()> {
    let store = open_store(&load_config(None), false)?;
    let summaries = store.list().context("failed to list conversations")?;
    helpers::print_conversations(&summaries);
    Ok(())
}

fn show_conversation(id: &str, at: Option<&str>) -> Result<()> {
    let store = open_store(&load_config(None), false)?;
    let messages = match at {
        Some(stamp) => store
            .load_snapshot(id, stamp)
            .with_context(|| format!("failed to load snapshot {stamp} of {id}"))?,
        None => store
            .load(id)
            .with_context(|| format!("failed to load conversation {id}"))?,
    };
    if messages.is_empty() {
        match at {
            Some(stamp) => println!("No stored messages for {id} at {stamp}."),
            None => println!("No stored messages for {id}."),
        }
    }
    for message in &messages {
        helpers::print_message(message);
    }
    Ok(())
}

fn list_snapshots(id: &str) -> Result<()> {
    let store = open_store(&load_config(None), false)?;
    let stamps = store
        .snapshots(id)
        .with_context(|| format!("failed to list snapshots of {id}"))?;
    helpers::print_snapshots(id, &stamps);
    Ok(())
}

fn delete_conversation(id: &str) -> Result<()> {
    let store = open_store(&load_config(None), false)?;
    if store
        .delete(id)
        .with_context(|| format!("failed to delete conversation {id}"))?
    {
        println!("Deleted {id}.");
    } else {
        println!("No stored conversation {id}.");
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Tools command
// ─────────────────────────────────────────────

async fn list_tools() -> Result<()> {
    let config = load_config(None);
    let path = mcp_config_path(&config);
    let servers = load_mcp_config(&path)
        .and_then(|doc| doc.servers())
        .with_context(|| format!("cannot read tool servers from {}", path.display()))?;

    let timeout = Duration::from_secs(config.agent.discovery_timeout_secs);
    let mut registry = ToolRegistry::discover(&servers, timeout)
        .await
        .context("tool discovery failed")?;
    helpers::print_tools(&registry);
    registry.close().await;
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("mcpchat=debug,mcpchat_core=debug,mcpchat_agent=debug,mcpchat_providers=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
