//! Metrics instrumentation for swarm-dns.
//!
//! All metrics are prefixed with `swarm_dns.`

use hickory_proto::rr::RecordType;
use metrics::{counter, gauge, histogram};
use std::time::Instant;

use crate::store::RrTable;

/// Outcome of a served DNS query, for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryOutcome {
    /// Answered from the record table.
    Hit,
    /// Name not present in the table.
    NxDomain,
    /// Record type outside the supported set.
    NotImplemented,
    /// A stored answer could not be rendered as a wire record.
    FormatError,
    /// Forwarded to an upstream nameserver.
    Forwarded,
    /// Upstream exchange failed.
    ForwardFailed,
    /// Out-of-domain query with recursion disabled.
    RecursionDisabled,
}

/// Record a served DNS query.
pub fn record_query(rtype: RecordType, outcome: QueryOutcome, duration: std::time::Duration) {
    let outcome_str = match outcome {
        QueryOutcome::Hit => "hit",
        QueryOutcome::NxDomain => "nxdomain",
        QueryOutcome::NotImplemented => "notimp",
        QueryOutcome::FormatError => "format_error",
        QueryOutcome::Forwarded => "forwarded",
        QueryOutcome::ForwardFailed => "forward_failed",
        QueryOutcome::RecursionDisabled => "recursion_disabled",
    };

    counter!("swarm_dns.query.count", "type" => rtype.to_string(), "outcome" => outcome_str)
        .increment(1);
    histogram!("swarm_dns.query.duration.seconds", "type" => rtype.to_string())
        .record(duration.as_secs_f64());
}

/// Record the eligibility split of a projected cluster snapshot.
pub fn record_task_counts(eligible: usize, ineligible: usize) {
    gauge!("swarm_dns.tasks.eligible").set(eligible as f64);
    gauge!("swarm_dns.tasks.ineligible").set(ineligible as f64);
}

/// Record the size of a freshly projected record table.
pub fn record_table_size(table: &RrTable) {
    let names: usize = table.values().map(|m| m.len()).sum();
    let answers: usize = table
        .values()
        .flat_map(|m| m.values())
        .map(|v| v.len())
        .sum();
    gauge!("swarm_dns.records.names").set(names as f64);
    gauge!("swarm_dns.records.answers").set(answers as f64);
}

/// Record a successful refresh.
pub fn record_refresh_success() {
    counter!("swarm_dns.refresh.count", "result" => "success").increment(1);
}

/// Record a failed refresh attempt.
pub fn record_refresh_error() {
    counter!("swarm_dns.refresh.count", "result" => "error").increment(1);
}

/// Record the fatal staleness exit.
pub fn record_stale_exit() {
    counter!("swarm_dns.staleness.exceeded").increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
