//! Error types for swarm-dns.

use std::time::SystemTime;
use thiserror::Error;

/// Errors that can occur in the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Error talking to the cluster manager
    #[error("error fetching cluster state: {0}")]
    Cluster(String),

    /// HTTP client error (cluster manager API)
    #[error("cluster API error: {0}")]
    Http(#[from] reqwest::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// A stored answer could not be rendered as a wire record
    #[error("cannot format answer '{answer}' as {rtype}: {reason}")]
    AnswerFormat {
        /// Stored answer string.
        answer: String,
        /// Record type it was formatted as.
        rtype: String,
        /// Why formatting failed.
        reason: String,
    },

    /// A refresh attempt exceeded its per-invocation timeout
    #[error("refreshing timed out")]
    RefreshTimeout,

    /// The refresh loop was cancelled from upstream
    #[error("refreshing records cancelled")]
    RefreshCancelled,

    /// The staleness deadline elapsed without a successful refresh
    #[error(
        "exiting rather than serving stale records. staleness period: {}, last success: {}",
        fmt_duration(.staleness),
        fmt_last_success(.last_success)
    )]
    StaleRecords {
        /// Configured staleness deadline.
        staleness: std::time::Duration,
        /// Wall-clock time of the last successful refresh, if any.
        last_success: Option<SystemTime>,
    },
}

fn fmt_duration(d: &std::time::Duration) -> String {
    humantime::format_duration(*d).to_string()
}

fn fmt_last_success(t: &Option<SystemTime>) -> String {
    match t {
        Some(t) => humantime::format_rfc3339_seconds(*t).to_string(),
        None => "never".to_string(),
    }
}
