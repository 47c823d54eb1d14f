//! Config loader — reads `~/.mcpchat/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.mcpchat/config.json`
//! 3. Environment variables `MCPCHAT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `MCPCHAT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `MCPCHAT_BACKEND__API_BASE` / `__API_KEY` / `__MODEL` / `__MAX_TOKENS` / `__TEMPERATURE`
/// - `MCPCHAT_AGENT__MAX_TOOL_ROUNDS` / `__BACKEND_TIMEOUT_SECS` / `__TOOL_TIMEOUT_SECS`
///   / `__DISCOVERY_TIMEOUT_SECS` / `__PARALLEL_TOOL_CALLS`
/// - `MCPCHAT_TOOLS__MCP_CONFIG_PATH`
/// - `MCPCHAT_STORE__DIRECTORY` / `__TTL_DAYS`
fn apply_env_overrides(mut config: Config) -> Config {
    // Backend
    if let Ok(val) = std::env::var("MCPCHAT_BACKEND__API_BASE") {
        config.backend.api_base = val;
    }
    if let Ok(val) = std::env::var("MCPCHAT_BACKEND__API_KEY") {
        config.backend.api_key = val;
    }
    if let Ok(val) = std::env::var("MCPCHAT_BACKEND__MODEL") {
        config.backend.model = val;
    }
    if let Ok(val) = std::env::var("MCPCHAT_BACKEND__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.backend.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("MCPCHAT_BACKEND__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.backend.temperature = t;
        }
    }

    // Agent loop
    if let Ok(val) = std::env::var("MCPCHAT_AGENT__MAX_TOOL_ROUNDS") {
        if let Ok(n) = val.parse::<u32>() {
            config.agent.max_tool_rounds = n;
        }
    }
    if let Ok(val) = std::env::var("MCPCHAT_AGENT__BACKEND_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.agent.backend_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("MCPCHAT_AGENT__TOOL_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.agent.tool_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("MCPCHAT_AGENT__DISCOVERY_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.agent.discovery_timeout_secs = n;
        }
    }
    if let Ok(val) = std::env::var("MCPCHAT_AGENT__PARALLEL_TOOL_CALLS") {
        config.agent.parallel_tool_calls = val == "true" || val == "1";
    }

    // Tools
    if let Ok(val) = std::env::var("MCPCHAT_TOOLS__MCP_CONFIG_PATH") {
        config.tools.mcp_config_path = val;
    }

    // Store
    if let Ok(val) = std::env::var("MCPCHAT_STORE__DIRECTORY") {
        config.store.directory = val;
    }
    if let Ok(val) = std::env::var("MCPCHAT_STORE__TTL_DAYS") {
        if let Ok(n) = val.parse::<i64>() {
            config.store.ttl_days = n;
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.backend.max_tokens, 4096);
        assert_eq!(config.store.ttl_days, 30);
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "backend": {
                "apiBase": "http://localhost:8000/v1",
                "maxTokens": 2048
            },
            "agent": { "toolTimeoutSecs": 5 }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.backend.api_base, "http://localhost:8000/v1");
        assert_eq!(config.backend.max_tokens, 2048);
        assert_eq!(config.agent.tool_timeout_secs, 5);
        assert_eq!(config.backend.temperature, 0.7);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tool_rounds, 20);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.backend.model = "gpt-4o-mini".to_string();
        config.backend.system_prompt = Some("Be brief.".to_string());

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.backend.model, "gpt-4o-mini");
        assert_eq!(reloaded.backend.system_prompt.as_deref(), Some("Be brief."));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let file = write_temp_json(
            r#"{ "agent": { "maxIterations": 7, "discoveryTimeoutSecs": 12 }, "mcpConfigPath": "/x.json" }"#,
        );
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tool_rounds, 20);
        assert_eq!(config.agent.discovery_timeout_secs, 12);
        assert_eq!(config.tools.mcp_config_path, "mcp_config.json");
    }

    #[test]
    fn test_env_override_model() {
        std::env::set_var("MCPCHAT_BACKEND__MODEL", "test-model");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.backend.model, "test-model");
        std::env::remove_var("MCPCHAT_BACKEND__MODEL");
    }

    #[test]
    fn test_env_override_parallel_flag() {
        std::env::set_var("MCPCHAT_AGENT__PARALLEL_TOOL_CALLS", "1");
        let config = apply_env_overrides(Config::default());
        assert!(config.agent.parallel_tool_calls);
        std::env::remove_var("MCPCHAT_AGENT__PARALLEL_TOOL_CALLS");
    }

    #[test]
    fn test_env_override_ignores_unparseable_number() {
        std::env::set_var("MCPCHAT_STORE__TTL_DAYS", "thirty");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.store.ttl_days, 30);
        std::env::remove_var("MCPCHAT_STORE__TTL_DAYS");
    }
}
