//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;

use crate::model::{Commitment, OverlapPolicy};

pub const DEFAULT_FETCH_LIMIT: usize = 10;
/// `getSignaturesForAddress` refuses larger pages.
pub const MAX_FETCH_LIMIT: usize = 1_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 256;

/// Settings for the address watcher and its RPC source. Shared by the CLI and
/// the HTTP API so both read the same environment contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    rpc_url: String,
    commitment: Commitment,
    fetch_limit: usize,
    poll_interval: Duration,
    overlap: OverlapPolicy,
    rpc_timeout: Duration,
    addresses: Vec<String>,
}

impl WatcherConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let rpc_url = get_required_var("SOLANA_RPC_ENDPOINT")?;
        let commitment = match get_optional_var("WATCHLINE_COMMITMENT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidCommitment { value: raw })?,
            None => Commitment::default(),
        };
        let fetch_limit =
            parse_number("WATCHLINE_FETCH_LIMIT")?.unwrap_or(DEFAULT_FETCH_LIMIT as u64) as usize;
        if fetch_limit == 0 || fetch_limit > MAX_FETCH_LIMIT {
            return Err(ConfigError::OutOfRange {
                key: "WATCHLINE_FETCH_LIMIT",
                min: 1,
                max: MAX_FETCH_LIMIT as u64,
            });
        }
        let poll_interval = parse_millis("WATCHLINE_POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL);
        let rpc_timeout = parse_millis("WATCHLINE_RPC_TIMEOUT_MS")?.unwrap_or(DEFAULT_RPC_TIMEOUT);
        let overlap = match get_optional_var("WATCHLINE_OVERLAP") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidOverlapPolicy { value: raw })?,
            None => OverlapPolicy::default(),
        };
        let addresses = get_optional_var("WATCHLINE_ADDRESSES")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            rpc_url,
            commitment,
            fetch_limit,
            poll_interval,
            overlap,
            rpc_timeout,
            addresses,
        })
    }

    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            commitment: Commitment::default(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            overlap: OverlapPolicy::default(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            addresses: Vec::new(),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn overlap(&self) -> OverlapPolicy {
        self.overlap
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Addresses to seed the watch set with; not validated here.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}

/// API-specific configuration so the HTTP surface does not depend on
/// CLI-only environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    api_bind_address: String,
    internal_bind_address: Option<String>,
    autostart: bool,
    activity_capacity: usize,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let autostart = match get_optional_var("API_AUTOSTART") {
            Some(raw) => parse_bool("API_AUTOSTART", &raw)?,
            None => true,
        };
        let activity_capacity = parse_number("API_ACTIVITY_CAPACITY")?
            .map(|value| value as usize)
            .unwrap_or(DEFAULT_ACTIVITY_CAPACITY)
            .max(1);

        Ok(Self {
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            autostart,
            activity_capacity,
        })
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some()
    }

    pub fn autostart(&self) -> bool {
        self.autostart
    }

    pub fn activity_capacity(&self) -> usize {
        self.activity_capacity
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_number(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|raw| {
            raw.parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn parse_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match parse_number(key)? {
        Some(0) => Err(ConfigError::OutOfRange {
            key,
            min: 1,
            max: u64::MAX,
        }),
        other => Ok(other.map(Duration::from_millis)),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Splits a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("WATCHLINE_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be between {min} and {max}")]
    OutOfRange {
        key: &'static str,
        min: u64,
        max: u64,
    },
    #[error("invalid boolean `{value}` in `{key}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("unknown commitment level `{value}` (expected processed, confirmed or finalized)")]
    InvalidCommitment { value: String },
    #[error("unknown overlap policy `{value}` (expected skip or allow)")]
    InvalidOverlapPolicy { value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
