//! `mcpchat onboard` — initialize configuration.
//!
//! - Creates `~/.mcpchat/config.json` with defaults
//! - Creates a sample tool server document where `tools.mcpConfigPath` points
//! - Creates the conversation store and history directories

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use mcpchat_core::config::{get_config_path, load_config, save_config};
use mcpchat_core::utils::{expand_home, get_data_path};

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "mcpchat setup".cyan().bold());
    println!();

    // 1. Config
    let config_path = get_config_path();
    let config = load_config(None);
    if config_path.exists() {
        println!("  {} config already exists at {}", "✓".green(), config_path.display());
    } else {
        save_config(&config, Some(&config_path))?;
        println!("  {} created config at {}", "✓".green(), config_path.display());
    }

    // 2. Tool server document
    let mcp_path = expand_home(&config.tools.mcp_config_path);
    create_template(&mcp_path, MCP_CONFIG_TEMPLATE)?;

    // 3. Store + history directories
    let store_dir = expand_home(&config.store.directory);
    std::fs::create_dir_all(&store_dir)?;
    println!("  {} conversations at {}", "✓".green(), store_dir.display());
    std::fs::create_dir_all(get_data_path().join("history"))?;

    println!();
    if !config.backend.is_configured() {
        println!(
            "  Set {} in {} (or {}).",
            "backend.apiKey".bold(),
            config_path.display(),
            "MCPCHAT_BACKEND__API_KEY".bold()
        );
    }
    println!("{}", "  Setup complete! Run `mcpchat chat` to start chatting.".green());
    println!();

    Ok(())
}

/// Create a file with `content` unless it already exists.
fn create_template(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("  {} {} already exists", "✓".green(), path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    println!("  {} created {}", "✓".green(), path.display());
    Ok(())
}

// ─────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────

const MCP_CONFIG_TEMPLATE: &str = r#"{
  "mcpServers": {
    "time": {
      "type": "stdio",
      "command": "uvx",
      "args": ["mcp-server-time"],
      "enabled": false
    },
    "docs": {
      "type": "http",
      "url": "http://localhost:8000/mcp",
      "headers": {},
      "enabled": false
    }
  }
}
"#;

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
