// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Configuration
//!
//! This module defines environment variable names, default values and the
//! [`ClientConfig`] consumed by [`crate::client::NodeClient`]. Configuration
//! can be built programmatically or loaded from the environment.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LIT_BOOTSTRAP_URLS` | Comma-separated node base URLs | Required |
//! | `LIT_MIN_NODE_COUNT` | Quorum size | `2` |
//! | `LIT_RETRY_MAX_ATTEMPTS` | Attempts per round | `3` |
//! | `LIT_RETRY_INTERVAL_MS` | Fixed wait between attempts | `100` |
//! | `LIT_CONNECT_TIMEOUT_MS` | Handshake budget | `20000` |
//! | `LIT_REQUEST_TIMEOUT_MS` | Per-node request timeout | `31000` |
//! | `LIT_NETWORK_SYNC_INTERVAL_SECS` | Background re-handshake interval | `30` |
//! | `LIT_STORAGE_DIR` | Directory for the file-backed session store | In-memory |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,threshold_node_client=debug` |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Environment variable name for the bootstrap node list.
pub const BOOTSTRAP_URLS_ENV: &str = "LIT_BOOTSTRAP_URLS";

/// Environment variable name for the quorum size.
pub const MIN_NODE_COUNT_ENV: &str = "LIT_MIN_NODE_COUNT";

/// Environment variable name for the retry attempt limit.
pub const RETRY_MAX_ATTEMPTS_ENV: &str = "LIT_RETRY_MAX_ATTEMPTS";

/// Environment variable name for the retry interval in milliseconds.
pub const RETRY_INTERVAL_MS_ENV: &str = "LIT_RETRY_INTERVAL_MS";

/// Environment variable name for the handshake budget in milliseconds.
pub const CONNECT_TIMEOUT_MS_ENV: &str = "LIT_CONNECT_TIMEOUT_MS";

/// Environment variable name for the per-node request timeout in milliseconds.
pub const REQUEST_TIMEOUT_MS_ENV: &str = "LIT_REQUEST_TIMEOUT_MS";

/// Environment variable name for the network sync interval in seconds.
pub const NETWORK_SYNC_INTERVAL_SECS_ENV: &str = "LIT_NETWORK_SYNC_INTERVAL_SECS";

/// Environment variable name for the file-backed session store directory.
pub const STORAGE_DIR_ENV: &str = "LIT_STORAGE_DIR";

/// Environment variable name for the log output format.
///
/// # Values
/// - `json` - one JSON object per event
/// - `pretty` (default) - human-readable output
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_MIN_NODE_COUNT: usize = 2;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(20_000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(31_000);
pub const DEFAULT_NETWORK_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Bounded fixed-interval retry policy for one logical round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTolerance {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait between attempts (no backoff)
    pub interval: Duration,
}

impl Default for RetryTolerance {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Configuration for a [`crate::client::NodeClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub bootstrap_urls: Vec<String>,
    pub min_node_count: usize,
    pub retry_tolerance: RetryTolerance,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub network_sync_interval: Duration,
    /// When set, session material is persisted under this directory.
    pub storage_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(bootstrap_urls: Vec<String>) -> Self {
        Self {
            bootstrap_urls,
            min_node_count: DEFAULT_MIN_NODE_COUNT,
            retry_tolerance: RetryTolerance::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            network_sync_interval: DEFAULT_NETWORK_SYNC_INTERVAL,
            storage_dir: None,
        }
    }

    pub fn with_min_node_count(mut self, min_node_count: usize) -> Self {
        self.min_node_count = min_node_count;
        self
    }

    pub fn with_retry_tolerance(mut self, retry_tolerance: RetryTolerance) -> Self {
        self.retry_tolerance = retry_tolerance;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_network_sync_interval(mut self, interval: Duration) -> Self {
        self.network_sync_interval = interval;
        self
    }

    /// Load configuration from the environment.
    pub fn from_env() -> ClientResult<Self> {
        let bootstrap_urls = env_required(BOOTSTRAP_URLS_ENV)?
            .split(',')
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect();

        let config = Self {
            bootstrap_urls,
            min_node_count: env_parse(MIN_NODE_COUNT_ENV, DEFAULT_MIN_NODE_COUNT)?,
            retry_tolerance: RetryTolerance {
                max_attempts: env_parse(RETRY_MAX_ATTEMPTS_ENV, DEFAULT_RETRY_MAX_ATTEMPTS)?,
                interval: Duration::from_millis(env_parse(
                    RETRY_INTERVAL_MS_ENV,
                    DEFAULT_RETRY_INTERVAL.as_millis() as u64,
                )?),
            },
            connect_timeout: Duration::from_millis(env_parse(
                CONNECT_TIMEOUT_MS_ENV,
                DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            )?),
            request_timeout: Duration::from_millis(env_parse(
                REQUEST_TIMEOUT_MS_ENV,
                DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            )?),
            network_sync_interval: Duration::from_secs(env_parse(
                NETWORK_SYNC_INTERVAL_SECS_ENV,
                DEFAULT_NETWORK_SYNC_INTERVAL.as_secs(),
            )?),
            storage_dir: env_optional(STORAGE_DIR_ENV).map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the client relies on before any round starts.
    pub fn validate(&self) -> ClientResult<()> {
        if self.bootstrap_urls.is_empty() {
            return Err(ClientError::invalid_argument(
                "at least one bootstrap URL is required",
            ));
        }
        for raw in &self.bootstrap_urls {
            url::Url::parse(raw).map_err(|e| {
                ClientError::invalid_argument(format!("invalid bootstrap URL {raw}: {e}"))
            })?;
        }
        if self.min_node_count == 0 {
            return Err(ClientError::invalid_argument(
                "min_node_count must be at least 1",
            ));
        }
        if self.min_node_count > self.bootstrap_urls.len() {
            return Err(ClientError::invalid_argument(format!(
                "min_node_count {} exceeds the {} bootstrap nodes",
                self.min_node_count,
                self.bootstrap_urls.len()
            )));
        }
        Ok(())
    }
}

/// Returns `true` when `LOG_FORMAT=json`.
pub fn json_logs_enabled() -> bool {
    env_or_default(LOG_FORMAT_ENV, "pretty").eq_ignore_ascii_case("json")
}

fn env_required(name: &str) -> ClientResult<String> {
    env_optional(name).ok_or_else(|| {
        ClientError::params_missing(format!("environment variable {name} is required"))
    })
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> ClientResult<T>
where
    T::Err: std::fmt::Display,
{
    match env_optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ClientError::invalid_param_type(format!("{name}={raw}: {e}"))),
        None => Ok(default),
    }
}
