//! Runtime configuration loaded from the environment.
//!
//! Every setting has a default in [`crate::defaults`]. Unparsable values fall
//! back to the default with a warning; an unsupported key size is an error,
//! because keys of different sizes must never mix in one deployment.

use std::path::PathBuf;
use std::time::Duration;

use shield_crypto::KeySize;
use tracing::warn;

use crate::defaults;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Connection settings for the notarization ledger gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub base_url: String,
    pub channel: String,
    pub chaincode: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ShieldConfig {
    pub database_url: String,
    pub key_size: KeySize,
    pub retry: RetryPolicy,
    pub key_cache_capacity: usize,
    pub data_dir: PathBuf,
    /// `None` disables notarization.
    pub ledger: Option<LedgerConfig>,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            key_size: KeySize::default(),
            retry: RetryPolicy::default(),
            key_cache_capacity: defaults::KEY_CACHE_CAPACITY,
            data_dir: PathBuf::from(defaults::DATA_DIR),
            ledger: None,
        }
    }
}

impl ShieldConfig {
    /// Load from the process environment (after reading `.env` if present).
    ///
    /// Reads:
    ///   DATABASE_URL                - PostgreSQL connection string
    ///   SHIELD_KEY_BITS             - 2048 (default) or 1024
    ///   SHIELD_RETRY_ATTEMPTS       - attempts per network call (default: 3)
    ///   SHIELD_RETRY_BASE_DELAY_MS  - first backoff delay (default: 1000)
    ///   SHIELD_RETRY_MULTIPLIER     - backoff growth factor (default: 2.0)
    ///   SHIELD_REQUEST_TIMEOUT_SECS - per-attempt timeout (default: 15)
    ///   SHIELD_KEY_CACHE_CAPACITY   - cached public keys (default: 1024)
    ///   SHIELD_DATA_DIR             - device-local vault and message log
    ///   SHIELD_LEDGER_URL           - notarization gateway; unset disables it
    ///   SHIELD_LEDGER_CHANNEL, SHIELD_LEDGER_CHAINCODE, SHIELD_LEDGER_TOKEN
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let key_size = match get("SHIELD_KEY_BITS") {
            Some(raw) => {
                let bits: usize = raw.parse().map_err(|_| {
                    Error::Config(format!("SHIELD_KEY_BITS is not a number: {}", raw))
                })?;
                KeySize::from_bits(bits)?
            }
            None => KeySize::default(),
        };

        let timeout = Duration::from_secs(parse_or(
            &get,
            "SHIELD_REQUEST_TIMEOUT_SECS",
            defaults::REQUEST_TIMEOUT_SECS,
        ));

        let retry = RetryPolicy::new(
            parse_or(&get, "SHIELD_RETRY_ATTEMPTS", defaults::RETRY_MAX_ATTEMPTS),
            Duration::from_millis(parse_or(
                &get,
                "SHIELD_RETRY_BASE_DELAY_MS",
                defaults::RETRY_BASE_DELAY_MS,
            )),
        )
        .with_multiplier(parse_or(
            &get,
            "SHIELD_RETRY_MULTIPLIER",
            defaults::RETRY_MULTIPLIER,
        ))
        .with_timeout(timeout);

        let ledger = get("SHIELD_LEDGER_URL").map(|base_url| LedgerConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            channel: get("SHIELD_LEDGER_CHANNEL")
                .unwrap_or_else(|| defaults::LEDGER_CHANNEL.to_string()),
            chaincode: get("SHIELD_LEDGER_CHAINCODE")
                .unwrap_or_else(|| defaults::LEDGER_CHAINCODE.to_string()),
            api_token: get("SHIELD_LEDGER_TOKEN"),
            timeout,
        });

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| defaults::DATABASE_URL.to_string()),
            key_size,
            retry,
            key_cache_capacity: parse_or(
                &get,
                "SHIELD_KEY_CACHE_CAPACITY",
                defaults::KEY_CACHE_CAPACITY,
            )
            .max(1),
            data_dir: get("SHIELD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(defaults::DATA_DIR)),
            ledger,
        })
    }

    pub fn vault_path(&self) -> PathBuf {
        self.data_dir.join(defaults::VAULT_FILE)
    }

    pub fn local_log_path(&self) -> PathBuf {
        self.data_dir.join(defaults::LOCAL_LOG_FILE)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, default = %default, "Invalid config value, using default");
                default
            }
        },
        None => default,
    }
}
