//! Structured logging schema and field name constants for cybershield.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (sign-in, provisioning), operation completions |
//! | DEBUG | Decision points, cache hits and misses, config choices |
//! | TRACE | Per-item iteration (history merge, enrichment) |
//!
//! Key material is never logged. Use [`KEY_FINGERPRINT`] with the SHA-256
//! fingerprint of the public key instead.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "crypto", "keys", "vault", "exchange", "session", "db", "ledger"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "key_store", "key_cache", "pool", "http_gateway"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "ensure_key_exists", "send", "fetch_history", "notarize"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// User identity (email) being operated on.
pub const IDENTITY: &str = "identity";

/// Message sender identity.
pub const SENDER: &str = "sender";

/// Message recipient identity.
pub const RECIPIENT: &str = "recipient";

/// Message UUID being operated on.
pub const MESSAGE_ID: &str = "message_id";

/// SHA-256 fingerprint of a public key.
pub const KEY_FINGERPRINT: &str = "key_fingerprint";

/// Message origin ("remote" or "local").
pub const ORIGIN: &str = "origin";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// 1-based attempt number within a retry loop.
pub const ATTEMPT: &str = "attempt";

/// Maximum attempts allowed by the retry policy.
pub const MAX_ATTEMPTS: &str = "max_attempts";

/// Delay before the next attempt in milliseconds.
pub const DELAY_MS: &str = "delay_ms";

/// Number of messages returned by a history query.
pub const RESULT_COUNT: &str = "result_count";

/// Plaintext length in bytes.
pub const PLAINTEXT_LEN: &str = "plaintext_len";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Database table or entity affected.
pub const DB_TABLE: &str = "db_table";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Provisioning outcome ("existing", "generated", "superseded").
pub const OUTCOME: &str = "outcome";

/// Install the global tracing subscriber.
///
/// Reads:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (falls back to `default_filter`)
///
/// Console output goes to stderr so command output on stdout stays parseable.
/// The returned guard must be held for the life of the process when file
/// logging is enabled, otherwise buffered lines are lost.
pub fn init_tracing(default_filter: &str) -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("cybershield.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    tracing::debug!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );

    guard
}
