use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discount_engine::DiscountPolicy;
use crate::profile::SegmentKeywords;
use crate::rate_limit::RateLimitPolicy;

const MAX_ABANDONED_CART_HOURS: u64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub transport: TransportConfig,
    pub llm: LlmConfig,
    pub engagement: EngagementConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub keywords: SegmentKeywords,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub reconnect_max_attempts: u32,
    pub reconnect_backoff_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone, Debug)]
pub struct EngagementConfig {
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_sweep_secs: u64,
    pub history_cap: usize,
    pub prompt_history: usize,
    pub abandoned_cart_hours: u64,
    pub abandoned_scan_secs: u64,
    pub max_discount_pct: u8,
    pub max_abandoned_cart_pct: u8,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    File,
    Sqlite,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    Disabled,
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
    pub storage_backend: Option<StorageBackend>,
    pub data_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
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
            storage: StorageConfig {
                backend: StorageBackend::File,
                data_dir: PathBuf::from("data"),
                database_url: "sqlite://vendedor.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            transport: TransportConfig { reconnect_max_attempts: 5, reconnect_backoff_secs: 5 },
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_tokens: 500,
                temperature: 0.7,
            },
            engagement: EngagementConfig {
                rate_limit_max_requests: 50,
                rate_limit_window_secs: 60,
                rate_limit_sweep_secs: 300,
                history_cap: 20,
                prompt_history: 10,
                abandoned_cart_hours: 2,
                abandoned_scan_secs: 300,
                max_discount_pct: 40,
                max_abandoned_cart_pct: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3001 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            keywords: SegmentKeywords::default(),
        }
    }
}

impl EngagementConfig {
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }

    pub fn discount_policy(&self) -> DiscountPolicy {
        DiscountPolicy {
            max_discount_pct: self.max_discount_pct,
            max_abandoned_cart_pct: self.max_abandoned_cart_pct,
            ..DiscountPolicy::default()
        }
    }

    pub fn abandoned_cart_threshold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.abandoned_cart_hours.min(MAX_ABANDONED_CART_HOURS) as i64)
    }
}

impl TransportConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Provider default when no explicit base url is configured.
    pub fn effective_base_url(&self) -> Option<String> {
        match (&self.base_url, self.provider) {
            (Some(url), _) => Some(url.clone()),
            (None, LlmProvider::OpenAi) => Some("https://api.openai.com/v1".to_string()),
            (None, LlmProvider::Ollama) => Some("http://localhost:11434/v1".to_string()),
            (None, LlmProvider::Disabled) => None,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unsupported storage backend `{other}` (expected file|sqlite|memory)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("vendedor.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(backend) = storage.backend {
                self.storage.backend = backend;
            }
            if let Some(data_dir) = storage.data_dir {
                self.storage.data_dir = data_dir;
            }
            if let Some(database_url) = storage.database_url {
                self.storage.database_url = database_url;
            }
            if let Some(max_connections) = storage.max_connections {
                self.storage.max_connections = max_connections;
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(transport) = patch.transport {
            if let Some(attempts) = transport.reconnect_max_attempts {
                self.transport.reconnect_max_attempts = attempts;
            }
            if let Some(backoff) = transport.reconnect_backoff_secs {
                self.transport.reconnect_backoff_secs = backoff;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
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
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(engagement) = patch.engagement {
            let target = &mut self.engagement;
            if let Some(value) = engagement.rate_limit_max_requests {
                target.rate_limit_max_requests = value;
            }
            if let Some(value) = engagement.rate_limit_window_secs {
                target.rate_limit_window_secs = value;
            }
            if let Some(value) = engagement.rate_limit_sweep_secs {
                target.rate_limit_sweep_secs = value;
            }
            if let Some(value) = engagement.history_cap {
                target.history_cap = value;
            }
            if let Some(value) = engagement.prompt_history {
                target.prompt_history = value;
            }
            if let Some(value) = engagement.abandoned_cart_hours {
                target.abandoned_cart_hours = value;
            }
            if let Some(value) = engagement.abandoned_scan_secs {
                target.abandoned_scan_secs = value;
            }
            if let Some(value) = engagement.max_discount_pct {
                target.max_discount_pct = value;
            }
            if let Some(value) = engagement.max_abandoned_cart_pct {
                target.max_abandoned_cart_pct = value;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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

        if let Some(keywords) = patch.keywords {
            if let Some(pastor) = keywords.pastor {
                self.keywords.pastor = pastor;
            }
            if let Some(young) = keywords.young {
                self.keywords.young = young;
            }
            if let Some(mother) = keywords.mother {
                self.keywords.mother = mother;
            }
            if let Some(faithful) = keywords.faithful {
                self.keywords.faithful = faithful;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VENDEDOR_STORAGE_BACKEND") {
            self.storage.backend = value.parse()?;
        }
        if let Some(value) = read_env("VENDEDOR_STORAGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(value);
        }
        let database_url =
            read_env("VENDEDOR_STORAGE_DATABASE_URL").or_else(|| read_env("VENDEDOR_DATABASE_URL"));
        if let Some(value) = database_url {
            self.storage.database_url = value;
        }
        if let Some(value) = read_env("VENDEDOR_STORAGE_MAX_CONNECTIONS") {
            self.storage.max_connections = parse_u32("VENDEDOR_STORAGE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_u64("VENDEDOR_STORAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("VENDEDOR_TRANSPORT_RECONNECT_MAX_ATTEMPTS") {
            self.transport.reconnect_max_attempts =
                parse_u32("VENDEDOR_TRANSPORT_RECONNECT_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_TRANSPORT_RECONNECT_BACKOFF_SECS") {
            self.transport.reconnect_backoff_secs =
                parse_u64("VENDEDOR_TRANSPORT_RECONNECT_BACKOFF_SECS", &value)?;
        }

        if let Some(value) = read_env("VENDEDOR_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("VENDEDOR_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VENDEDOR_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("VENDEDOR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("VENDEDOR_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("VENDEDOR_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("VENDEDOR_LLM_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("VENDEDOR_ENGAGEMENT_RATE_LIMIT_MAX_REQUESTS") {
            self.engagement.rate_limit_max_requests =
                parse_u32("VENDEDOR_ENGAGEMENT_RATE_LIMIT_MAX_REQUESTS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_ENGAGEMENT_RATE_LIMIT_WINDOW_SECS") {
            self.engagement.rate_limit_window_secs =
                parse_u64("VENDEDOR_ENGAGEMENT_RATE_LIMIT_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_ENGAGEMENT_HISTORY_CAP") {
            self.engagement.history_cap = parse_usize("VENDEDOR_ENGAGEMENT_HISTORY_CAP", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_ENGAGEMENT_ABANDONED_CART_HOURS") {
            self.engagement.abandoned_cart_hours =
                parse_u64("VENDEDOR_ENGAGEMENT_ABANDONED_CART_HOURS", &value)?;
        }

        if let Some(value) = read_env("VENDEDOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("VENDEDOR_SERVER_PORT").or_else(|| read_env("VENDEDOR_PORT"));
        if let Some(value) = port {
            self.server.port = parse_u16("VENDEDOR_SERVER_PORT", &value)?;
        }

        let log_level =
            read_env("VENDEDOR_LOGGING_LEVEL").or_else(|| read_env("VENDEDOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VENDEDOR_LOGGING_FORMAT").or_else(|| read_env("VENDEDOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend) = overrides.storage_backend {
            self.storage.backend = backend;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(database_url) = overrides.database_url {
            self.storage.database_url = database_url;
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
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_transport(&self.transport)?;
        validate_llm(&self.llm)?;
        validate_engagement(&self.engagement)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        if !self.keywords.is_complete() {
            return Err(ConfigError::Validation(
                "keywords.* lists must not be empty; remove the key to use the defaults"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("vendedor.toml"), PathBuf::from("config/vendedor.toml")]
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
        if ch != '$' || !matches!(chars.peek(), Some('{')) {
            output.push(ch);
            continue;
        }

        chars.next();
        let mut key = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(next) => key.push(next),
                None => return Err(ConfigError::UnterminatedInterpolation),
            }
        }

        let value =
            env::var(&key).map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
        output.push_str(&value);
    }

    Ok(output)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    match storage.backend {
        StorageBackend::Sqlite => {
            let url = storage.database_url.trim();
            let sqlite_url =
                url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
            if !sqlite_url {
                return Err(ConfigError::Validation(
                    "storage.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                        .to_string(),
                ));
            }
        }
        StorageBackend::File => {
            if storage.data_dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.data_dir is required for the file backend".to_string(),
                ));
            }
        }
        StorageBackend::Memory => {}
    }

    if storage.max_connections == 0 {
        return Err(ConfigError::Validation(
            "storage.max_connections must be greater than zero".to_string(),
        ));
    }

    if storage.timeout_secs == 0 || storage.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "storage.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_transport(transport: &TransportConfig) -> Result<(), ConfigError> {
    if transport.reconnect_backoff_secs > 600 {
        return Err(ConfigError::Validation(
            "transport.reconnect_backoff_secs must be at most 600".to_string(),
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

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (or set OPENAI_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let blank = llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(false);
            if blank {
                return Err(ConfigError::Validation(
                    "llm.base_url must not be blank for the ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
    }

    Ok(())
}

fn validate_engagement(engagement: &EngagementConfig) -> Result<(), ConfigError> {
    if engagement.rate_limit_max_requests == 0 || engagement.rate_limit_window_secs == 0 {
        return Err(ConfigError::Validation(
            "engagement.rate_limit_max_requests and rate_limit_window_secs must be greater than zero"
                .to_string(),
        ));
    }
    if engagement.history_cap == 0 {
        return Err(ConfigError::Validation(
            "engagement.history_cap must be greater than zero".to_string(),
        ));
    }
    if engagement.prompt_history > engagement.history_cap {
        return Err(ConfigError::Validation(
            "engagement.prompt_history must not exceed engagement.history_cap".to_string(),
        ));
    }
    if engagement.rate_limit_sweep_secs == 0 || engagement.abandoned_scan_secs == 0 {
        return Err(ConfigError::Validation(
            "engagement sweep and scan intervals must be greater than zero".to_string(),
        ));
    }
    if engagement.abandoned_cart_hours == 0
        || engagement.abandoned_cart_hours > MAX_ABANDONED_CART_HOURS
    {
        return Err(ConfigError::Validation(format!(
            "engagement.abandoned_cart_hours must be in range 1..={MAX_ABANDONED_CART_HOURS}"
        )));
    }
    if engagement.max_discount_pct > 100 || engagement.max_abandoned_cart_pct > 100 {
        return Err(ConfigError::Validation(
            "engagement discount caps must be in range 0..=100".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
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

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    transport: Option<TransportPatch>,
    llm: Option<LlmPatch>,
    engagement: Option<EngagementPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    keywords: Option<KeywordsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    backend: Option<StorageBackend>,
    data_dir: Option<PathBuf>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TransportPatch {
    reconnect_max_attempts: Option<u32>,
    reconnect_backoff_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct EngagementPatch {
    rate_limit_max_requests: Option<u32>,
    rate_limit_window_secs: Option<u64>,
    rate_limit_sweep_secs: Option<u64>,
    history_cap: Option<usize>,
    prompt_history: Option<usize>,
    abandoned_cart_hours: Option<u64>,
    abandoned_scan_secs: Option<u64>,
    max_discount_pct: Option<u8>,
    max_abandoned_cart_pct: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct KeywordsPatch {
    pastor: Option<Vec<String>>,
    young: Option<Vec<String>>,
    mother: Option<Vec<String>>,
    faithful: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        StorageBackend,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn missing_path(dir: &TempDir) -> LoadOptions {
        LoadOptions { config_path: Some(dir.path().join("absent.toml")), ..LoadOptions::default() }
    }

    #[test]
    fn defaults_match_engagement_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;

        let config = AppConfig::load(missing_path(&dir))
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.engagement.rate_limit_max_requests == 50, "default limit is 50")?;
        ensure(config.engagement.rate_limit_window_secs == 60, "default window is 60s")?;
        ensure(config.engagement.history_cap == 20, "default history cap is 20")?;
        ensure(config.engagement.abandoned_cart_hours == 2, "default abandonment is 2h")?;
        ensure(config.transport.reconnect_max_attempts == 5, "default reconnect attempts is 5")?;
        ensure(config.transport.reconnect_backoff_secs == 5, "default backoff is 5s")?;
        ensure(config.engagement.discount_policy().max_discount_pct == 40, "discount cap is 40")?;
        ensure(
            config.engagement.discount_policy().max_abandoned_cart_pct == 30,
            "abandoned-cart cap is 30",
        )?;
        ensure(!config.keywords.pastor.is_empty(), "default keywords are loaded")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_VENDEDOR_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("vendedor.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_VENDEDOR_LLM_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_VENDEDOR_LLM_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VENDEDOR_STORAGE_BACKEND", "sqlite");
        env::set_var("VENDEDOR_ENGAGEMENT_HISTORY_CAP", "30");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("vendedor.toml");
            fs::write(
                &path,
                r#"
[storage]
backend = "file"
database_url = "sqlite://from-file.db"

[engagement]
history_cap = 25
rate_limit_max_requests = 10

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.storage.backend == StorageBackend::Sqlite, "env backend should win")?;
            ensure(
                config.storage.database_url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.engagement.history_cap == 30, "env history cap should win over file")?;
            ensure(config.engagement.rate_limit_max_requests == 10, "file limit should apply")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")
        })();

        clear_vars(&["VENDEDOR_STORAGE_BACKEND", "VENDEDOR_ENGAGEMENT_HISTORY_CAP"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VENDEDOR_LOG_LEVEL", "warn");
        env::set_var("VENDEDOR_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let config = AppConfig::load(missing_path(&dir))
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["VENDEDOR_LOG_LEVEL", "VENDEDOR_LOG_FORMAT"]);
        result
    }

    #[test]
    fn keyword_lists_can_be_replaced_per_segment() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("vendedor.toml");
        fs::write(
            &path,
            r#"
[keywords]
young = ["skate", "rock"]
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.keywords.young == vec!["skate", "rock"], "young list should be replaced")?;
        ensure(config.keywords.pastor.contains(&"pastor".to_string()), "others keep defaults")
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VENDEDOR_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let saved_openai = env::var("OPENAI_API_KEY").ok();
            env::remove_var("OPENAI_API_KEY");
            let outcome = AppConfig::load(missing_path(&dir));
            if let Some(value) = saved_openai {
                env::set_var("OPENAI_API_KEY", value);
            }

            let error = match outcome {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["VENDEDOR_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VENDEDOR_TRANSPORT_RECONNECT_MAX_ATTEMPTS", "many");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let error = AppConfig::load(missing_path(&dir)).err();
            ensure(
                matches!(
                    error,
                    Some(ConfigError::InvalidEnvOverride { ref key, .. })
                        if key == "VENDEDOR_TRANSPORT_RECONNECT_MAX_ATTEMPTS"
                ),
                "bad numeric override should be rejected",
            )
        })();

        clear_vars(&["VENDEDOR_TRANSPORT_RECONNECT_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VENDEDOR_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let config = AppConfig::load(missing_path(&dir))
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["VENDEDOR_LLM_API_KEY"]);
        result
    }
}
