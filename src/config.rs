// Client configuration, passed explicitly to every engine and search
use crate::cache::CacheConfig;
use crate::parser::ReplyFormat;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const BROWSE_ROUTES_URL: &str = "http://partners.api.skyscanner.net/apiservices/browseroutes/v1.0";
pub const PRICING_URL: &str = "http://partners.api.skyscanner.net/apiservices/pricing/v1.0";

pub const ENV_API_KEY: &str = "FARESCOUT_API_KEY";
pub const ENV_API_KEY_FILE: &str = "FARESCOUT_API_KEY_FILE";
pub const ENV_POLL_TIMEOUT_SECS: &str = "FARESCOUT_POLL_TIMEOUT_SECS";
pub const ENV_MAX_CONCURRENCY: &str = "FARESCOUT_MAX_CONCURRENCY";
pub const ENV_REPLY_FORMAT: &str = "FARESCOUT_REPLY_FORMAT";
pub const ENV_SLOW_MAX_DELAY_MS: &str = "FARESCOUT_SLOW_MAX_DELAY_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot read key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub browse_routes_url: String,
    pub pricing_url: String,
    pub reply_format: ReplyFormat,
    pub poll_interval: Duration,
    // None waits for the session to complete however long it takes
    pub poll_timeout: Option<Duration>,
    pub request_timeout: Duration,
    // Zero disables the random delay before each call
    pub slow_max_delay: Duration,
    // None runs one task per destination at once
    pub max_concurrency: Option<usize>,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            browse_routes_url: BROWSE_ROUTES_URL.to_string(),
            pricing_url: PRICING_URL.to_string(),
            reply_format: ReplyFormat::Json,
            poll_interval: Duration::from_secs(1),
            poll_timeout: Some(Duration::from_secs(600)),
            request_timeout: Duration::from_secs(30),
            slow_max_delay: Duration::from_secs(5),
            max_concurrency: None,
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    // Same as from_env with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match (lookup(ENV_API_KEY), lookup(ENV_API_KEY_FILE)) {
            (Some(key), _) if !key.trim().is_empty() => key.trim().to_string(),
            (_, Some(path)) => read_key(path)?,
            _ => return Err(ConfigError::MissingVariable(ENV_API_KEY.to_string())),
        };
        let mut config = Self::new(&api_key);

        if let Some(value) = lookup(ENV_POLL_TIMEOUT_SECS) {
            // 0 turns the deadline off
            config.poll_timeout = match parse_number::<u64>(ENV_POLL_TIMEOUT_SECS, &value)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENCY) {
            config.max_concurrency = match parse_number::<usize>(ENV_MAX_CONCURRENCY, &value)? {
                0 => None,
                limit => Some(limit),
            };
        }
        if let Some(value) = lookup(ENV_REPLY_FORMAT) {
            config.reply_format = value.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(value) = lookup(ENV_SLOW_MAX_DELAY_MS) {
            config.slow_max_delay =
                Duration::from_millis(parse_number::<u64>(ENV_SLOW_MAX_DELAY_MS, &value)?);
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got '{}'", name, value)))
}

// API key stored in a file, surrounding whitespace ignored
pub fn read_key(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::KeyFile {
        path: path.display().to_string(),
        source,
    })?;

    let key = content.trim();
    if key.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "key file {} is empty",
            path.display()
        )));
    }
    Ok(key.to_string())
}
