//! Environment-driven application configuration.
//!
//! # Responsibility
//! - Resolve storage paths, logging, debounce timing, secrets and bind
//!   address from `SLUGNOTE_*` environment variables.
//!
//! # Invariants
//! - Blank values fall back to defaults.
//! - Malformed numeric or boolean values are errors, never silently ignored.

use crate::logging::default_log_level;
use crate::secret::SecretToken;
use crate::sync::scheduler::DEFAULT_DEBOUNCE;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const DB_FILE_NAME: &str = "slugnote.sqlite3";
const IDENTITY_FILE_NAME: &str = "slugnote_identity.json";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_SITE_TITLE: &str = "notes";

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Absolute directory for rolling log files; `None` disables file logs.
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub debounce: Duration,
    pub revalidate_token: SecretToken,
    pub admin_token: SecretToken,
    /// Marks the session cookie `Secure` (production).
    pub secure_cookies: bool,
    pub bind_addr: String,
    /// Durable client storage used by the CLI identity provider.
    pub identity_path: PathBuf,
    pub site_title: String,
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidBool { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { key, value } => {
                write!(f, "`{key}` must be a non-negative integer, got `{value}`")
            }
            Self::InvalidBool { key, value } => {
                write!(f, "`{key}` must be true|false|1|0, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}

impl AppConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, used by tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let debounce = match get("SLUGNOTE_DEBOUNCE_MS") {
            Some(raw) => Duration::from_millis(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidNumber {
                    key: "SLUGNOTE_DEBOUNCE_MS",
                    value: raw.clone(),
                }
            })?),
            None => DEFAULT_DEBOUNCE,
        };

        let secure_cookies = match get("SLUGNOTE_SECURE_COOKIES") {
            Some(raw) => parse_bool("SLUGNOTE_SECURE_COOKIES", &raw)?,
            None => !cfg!(debug_assertions),
        };

        Ok(Self {
            db_path: get("SLUGNOTE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join(DB_FILE_NAME)),
            log_dir: get("SLUGNOTE_LOG_DIR").map(PathBuf::from),
            log_level: get("SLUGNOTE_LOG_LEVEL").unwrap_or_else(|| default_log_level().to_string()),
            debounce,
            revalidate_token: SecretToken::new(get("SLUGNOTE_REVALIDATE_TOKEN").unwrap_or_default()),
            admin_token: SecretToken::new(get("SLUGNOTE_ADMIN_TOKEN").unwrap_or_default()),
            secure_cookies,
            bind_addr: get("SLUGNOTE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            identity_path: get("SLUGNOTE_IDENTITY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join(IDENTITY_FILE_NAME)),
            site_title: get("SLUGNOTE_SITE_TITLE").unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string()),
        })
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}
