use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::conversation::MAX_HISTORY_MESSAGES;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub reminders: ReminderConfig,
    pub practice: PracticeClockConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub mode: ChannelMode,
    pub outbound_url: Option<String>,
    pub token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_tool_rounds: u32,
    pub turn_timeout_secs: u64,
    /// How many stored messages seed the model's working history.
    pub history_limit: usize,
}

#[derive(Clone, Debug)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub window_start_hour: u32,
    pub window_end_hour: u32,
    pub interval_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct PracticeClockConfig {
    /// Offset of the practice clock from UTC; `None` uses the host's local zone.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    Noop,
    Bridge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub channel_mode: Option<ChannelMode>,
    pub channel_outbound_url: Option<String>,
    pub channel_token: Option<String>,
    pub reminders_enabled: Option<bool>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://atendia.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            channel: ChannelConfig { mode: ChannelMode::Noop, outbound_url: None, token: None },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_tokens: 1024,
            },
            agent: AgentConfig { max_tool_rounds: 5, turn_timeout_secs: 45, history_limit: 20 },
            reminders: ReminderConfig {
                enabled: true,
                window_start_hour: 8,
                window_end_hour: 20,
                interval_secs: 3600,
            },
            practice: PracticeClockConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ChannelMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Self::Noop),
            "bridge" => Ok(Self::Bridge),
            other => Err(ConfigError::Validation(format!(
                "unsupported channel mode `{other}` (expected noop|bridge)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("atendia.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(channel) = patch.channel {
            if let Some(mode) = channel.mode {
                self.channel.mode = mode;
            }
            if let Some(outbound_url) = channel.outbound_url {
                self.channel.outbound_url = Some(outbound_url);
            }
            if let Some(token) = channel.token {
                self.channel.token = Some(secret_value(token));
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_tool_rounds) = agent.max_tool_rounds {
                self.agent.max_tool_rounds = max_tool_rounds;
            }
            if let Some(turn_timeout_secs) = agent.turn_timeout_secs {
                self.agent.turn_timeout_secs = turn_timeout_secs;
            }
            if let Some(history_limit) = agent.history_limit {
                self.agent.history_limit = history_limit;
            }
        }

        if let Some(reminders) = patch.reminders {
            if let Some(enabled) = reminders.enabled {
                self.reminders.enabled = enabled;
            }
            if let Some(window_start_hour) = reminders.window_start_hour {
                self.reminders.window_start_hour = window_start_hour;
            }
            if let Some(window_end_hour) = reminders.window_end_hour {
                self.reminders.window_end_hour = window_end_hour;
            }
            if let Some(interval_secs) = reminders.interval_secs {
                self.reminders.interval_secs = interval_secs;
            }
        }

        if let Some(practice) = patch.practice {
            if let Some(utc_offset_minutes) = practice.utc_offset_minutes {
                self.practice.utc_offset_minutes = Some(utc_offset_minutes);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ATENDIA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ATENDIA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ATENDIA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ATENDIA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ATENDIA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ATENDIA_CHANNEL_MODE") {
            self.channel.mode = value.parse()?;
        }
        if let Some(value) = read_env("ATENDIA_CHANNEL_OUTBOUND_URL") {
            self.channel.outbound_url = Some(value);
        }
        if let Some(value) = read_env("ATENDIA_CHANNEL_TOKEN") {
            self.channel.token = Some(secret_value(value));
        }

        if let Some(value) = read_env("ATENDIA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("ATENDIA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("ATENDIA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("ATENDIA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("ATENDIA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("ATENDIA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ATENDIA_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("ATENDIA_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("ATENDIA_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_u32("ATENDIA_AGENT_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("ATENDIA_AGENT_TURN_TIMEOUT_SECS") {
            self.agent.turn_timeout_secs = parse_u64("ATENDIA_AGENT_TURN_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ATENDIA_REMINDERS_ENABLED") {
            self.reminders.enabled = parse_bool("ATENDIA_REMINDERS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("ATENDIA_REMINDERS_INTERVAL_SECS") {
            self.reminders.interval_secs = parse_u64("ATENDIA_REMINDERS_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("ATENDIA_PRACTICE_UTC_OFFSET_MINUTES") {
            self.practice.utc_offset_minutes =
                Some(parse_i32("ATENDIA_PRACTICE_UTC_OFFSET_MINUTES", &value)?);
        }

        if let Some(value) = read_env("ATENDIA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ATENDIA_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_u16("ATENDIA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ATENDIA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ATENDIA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("ATENDIA_LOGGING_LEVEL").or_else(|| read_env("ATENDIA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ATENDIA_LOGGING_FORMAT").or_else(|| read_env("ATENDIA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(channel_mode) = overrides.channel_mode {
            self.channel.mode = channel_mode;
        }
        if let Some(outbound_url) = overrides.channel_outbound_url {
            self.channel.outbound_url = Some(outbound_url);
        }
        if let Some(token) = overrides.channel_token {
            self.channel.token = Some(secret_value(token));
        }
        if let Some(enabled) = overrides.reminders_enabled {
            self.reminders.enabled = enabled;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_channel(&self.channel)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_reminders(&self.reminders)?;
        validate_practice(&self.practice)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("atendia.toml"), PathBuf::from("config/atendia.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_channel(channel: &ChannelConfig) -> Result<(), ConfigError> {
    if channel.mode == ChannelMode::Noop {
        return Ok(());
    }

    let Some(url) = channel.outbound_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    else {
        return Err(ConfigError::Validation(
            "channel.outbound_url is required when channel.mode = \"bridge\" (the bridge endpoint that delivers outbound messages)".to_string(),
        ));
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "channel.outbound_url must start with http:// or https://".to_string(),
        ));
    }

    let token_missing =
        channel.token.as_ref().map(|token| token.expose_secret().trim().is_empty()).unwrap_or(true);
    if token_missing {
        return Err(ConfigError::Validation(
            "channel.token is required when channel.mode = \"bridge\"; it authenticates both webhook and outbound calls".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_tool_rounds == 0 || agent.max_tool_rounds > 20 {
        return Err(ConfigError::Validation(
            "agent.max_tool_rounds must be in range 1..=20".to_string(),
        ));
    }

    if agent.turn_timeout_secs == 0 || agent.turn_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "agent.turn_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if agent.history_limit == 0 || agent.history_limit > MAX_HISTORY_MESSAGES {
        return Err(ConfigError::Validation(format!(
            "agent.history_limit must be in range 1..={MAX_HISTORY_MESSAGES}"
        )));
    }

    Ok(())
}

fn validate_reminders(reminders: &ReminderConfig) -> Result<(), ConfigError> {
    if reminders.window_start_hour > 23 || reminders.window_end_hour > 23 {
        return Err(ConfigError::Validation(
            "reminders window hours must be in range 0..=23".to_string(),
        ));
    }

    if reminders.window_start_hour > reminders.window_end_hour {
        return Err(ConfigError::Validation(
            "reminders.window_start_hour must not be after reminders.window_end_hour".to_string(),
        ));
    }

    if reminders.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "reminders.interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_practice(practice: &PracticeClockConfig) -> Result<(), ConfigError> {
    if let Some(offset) = practice.utc_offset_minutes {
        if !(-14 * 60..=14 * 60).contains(&offset) {
            return Err(ConfigError::Validation(
                "practice.utc_offset_minutes must be within -840..=840".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    channel: Option<ChannelPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    reminders: Option<ReminderPatch>,
    practice: Option<PracticePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    mode: Option<ChannelMode>,
    outbound_url: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_tool_rounds: Option<u32>,
    turn_timeout_secs: Option<u64>,
    history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ReminderPatch {
    enabled: Option<bool>,
    window_start_hour: Option<u32>,
    window_end_hour: Option<u32>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PracticePatch {
    utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
