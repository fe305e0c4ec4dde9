use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use atendia_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_key) in entries(&config) {
        let source =
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<(&'static str, String, Option<&'static str>)> {
    let optional = |value: Option<&str>| value.unwrap_or("<unset>").to_string();

    vec![
        ("database.url", config.database.url.clone(), Some("ATENDIA_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("ATENDIA_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            Some("ATENDIA_DATABASE_TIMEOUT_SECS"),
        ),
        ("channel.mode", format!("{:?}", config.channel.mode), Some("ATENDIA_CHANNEL_MODE")),
        (
            "channel.outbound_url",
            optional(config.channel.outbound_url.as_deref()),
            Some("ATENDIA_CHANNEL_OUTBOUND_URL"),
        ),
        ("channel.token", redact_secret(config.channel.token.as_ref()), Some("ATENDIA_CHANNEL_TOKEN")),
        ("llm.provider", format!("{:?}", config.llm.provider), Some("ATENDIA_LLM_PROVIDER")),
        ("llm.model", config.llm.model.clone(), Some("ATENDIA_LLM_MODEL")),
        ("llm.base_url", optional(config.llm.base_url.as_deref()), Some("ATENDIA_LLM_BASE_URL")),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref()), Some("ATENDIA_LLM_API_KEY")),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), Some("ATENDIA_LLM_TIMEOUT_SECS")),
        ("llm.max_tokens", config.llm.max_tokens.to_string(), Some("ATENDIA_LLM_MAX_TOKENS")),
        (
            "agent.max_tool_rounds",
            config.agent.max_tool_rounds.to_string(),
            Some("ATENDIA_AGENT_MAX_TOOL_ROUNDS"),
        ),
        (
            "agent.turn_timeout_secs",
            config.agent.turn_timeout_secs.to_string(),
            Some("ATENDIA_AGENT_TURN_TIMEOUT_SECS"),
        ),
        ("agent.history_limit", config.agent.history_limit.to_string(), None),
        ("reminders.enabled", config.reminders.enabled.to_string(), Some("ATENDIA_REMINDERS_ENABLED")),
        ("reminders.window_start_hour", config.reminders.window_start_hour.to_string(), None),
        ("reminders.window_end_hour", config.reminders.window_end_hour.to_string(), None),
        (
            "reminders.interval_secs",
            config.reminders.interval_secs.to_string(),
            Some("ATENDIA_REMINDERS_INTERVAL_SECS"),
        ),
        (
            "practice.utc_offset_minutes",
            config
                .practice
                .utc_offset_minutes
                .map(|minutes| minutes.to_string())
                .unwrap_or_else(|| "<host local time>".to_string()),
            Some("ATENDIA_PRACTICE_UTC_OFFSET_MINUTES"),
        ),
        ("server.bind_address", config.server.bind_address.clone(), Some("ATENDIA_SERVER_BIND_ADDRESS")),
        ("server.port", config.server.port.to_string(), Some("ATENDIA_SERVER_PORT")),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            Some("ATENDIA_SERVER_GRACEFUL_SHUTDOWN_SECS"),
        ),
        ("logging.level", config.logging.level.clone(), Some("ATENDIA_LOGGING_LEVEL")),
        ("logging.format", format!("{:?}", config.logging.format), Some("ATENDIA_LOGGING_FORMAT")),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("atendia.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/atendia.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most a four-character prefix so operators can tell keys apart.
fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.len() > 8 && trimmed.is_char_boundary(4) {
        return format!("{}***", &trimmed[..4]);
    }
    "<redacted>".to_string()
}
