//! `mcpchat status` — show configuration status.
//!
//! - Shows the config path, backend and model
//! - Shows the tool server document and the servers it declares
//! - Shows the conversation store and agent limits

use anyhow::Result;
use colored::Colorize;

use mcpchat_core::config::{get_config_path, load_config, load_mcp_config, McpEndpoint};
use mcpchat_core::utils::expand_home;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "mcpchat status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        found_marker(config_path.exists())
    );

    // Backend
    println!("  {:<18} {}", "Backend:".bold(), config.backend.api_base);
    println!("  {:<18} {}", "Model:".bold(), config.backend.model);
    println!(
        "  {:<18} {}",
        "API key:".bold(),
        if config.backend.is_configured() {
            format!("{} (key set)", "✓".green())
        } else {
            format!("{}", "· not configured".dimmed())
        }
    );
    println!(
        "  {:<18} {} | max_tokens: {}",
        "Parameters:".bold(),
        format!("temp: {}", config.backend.temperature).dimmed(),
        format!("{}", config.backend.max_tokens).dimmed(),
    );
    println!(
        "  {:<18} {}",
        "Agent:".bold(),
        format!(
            "max rounds: {} | backend timeout: {}s | tool timeout: {}s | discovery timeout: {}s | parallel: {}",
            config.agent.max_tool_rounds,
            config.agent.backend_timeout_secs,
            config.agent.tool_timeout_secs,
            config.agent.discovery_timeout_secs,
            config.agent.parallel_tool_calls
        )
        .dimmed()
    );

    // Store
    let store_dir = expand_home(&config.store.directory);
    println!(
        "  {:<18} {} {}",
        "Conversations:".bold(),
        store_dir.display(),
        found_marker(store_dir.exists())
    );
    println!("  {:<18} {} days", "Retention:".bold(), config.store.ttl_days);

    // Tool servers
    let mcp_path = expand_home(&config.tools.mcp_config_path);
    println!();
    println!(
        "  {:<18} {} {}",
        "Tool servers:".bold(),
        mcp_path.display(),
        found_marker(mcp_path.exists())
    );
    if mcp_path.exists() {
        match load_mcp_config(&mcp_path).and_then(|doc| doc.servers()) {
            Ok(servers) if servers.is_empty() => println!("    {}", "(none declared)".dimmed()),
            Ok(servers) => {
                for server in servers {
                    let target = match server.endpoint {
                        McpEndpoint::Stdio { command, args, .. } => {
                            format!("stdio: {} {}", command, args.join(" "))
                        }
                        McpEndpoint::Http { url, .. } => format!("http: {url}"),
                    };
                    println!("    {:<20} {}", server.name, target.trim_end().dimmed());
                }
            }
            Err(e) => println!("    {} {}", "✗".red(), e.to_string().red()),
        }
    }

    println!();

    Ok(())
}

fn found_marker(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}
