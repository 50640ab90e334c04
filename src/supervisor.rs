//! Staleness policy over the refresh event streams.
//!
//! The server prefers consistency over availability: rather than answering
//! queries from an outdated snapshot, it removes itself as an authority so
//! that upstream DNS failover can take effect. Operators are expected to run
//! the process under a supervisor that restarts it.

use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::DnsError;
use crate::metrics;

/// Terminal outcome of the supervision loop.
#[derive(Debug)]
pub enum Exit {
    /// A graceful shutdown was requested; nothing is wrong.
    Shutdown,
    /// Fatal condition; the refresh engine has been cancelled and the
    /// process should exit non-zero.
    Fatal(DnsError),
}

/// Watches the refresh engine's event streams and enforces the staleness
/// deadline.
pub struct Supervisor {
    staleness: Duration,
}

impl Supervisor {
    /// Create a supervisor with the given staleness deadline.
    pub fn new(staleness: Duration) -> Self {
        Self { staleness }
    }

    /// Consume refresh events until the records go stale, the refresh engine
    /// dies, or a shutdown is requested. `shutdown` is the operator's
    /// stop signal; `cancel` is the refresh engine's cancellation token and
    /// is fired on every exit path so in-flight refreshes stop. Only a
    /// [`Exit::Fatal`] outcome means something went wrong.
    pub async fn run(
        &self,
        mut err_rx: mpsc::Receiver<DnsError>,
        mut ok_rx: mpsc::Receiver<()>,
        shutdown: CancellationToken,
        cancel: CancellationToken,
    ) -> Exit {
        let start = Instant::now();
        let mut last_success: Option<Instant> = None;
        let mut last_success_at: Option<SystemTime> = None;
        let mut errs = 0u64;
        let mut oks = 0u64;

        loop {
            // Refresh events are not in tick order; only recency and counts
            // matter here.
            let deadline = last_success.unwrap_or(start) + self.staleness;

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    cancel.cancel();
                    metrics::record_stale_exit();
                    return Exit::Fatal(DnsError::StaleRecords {
                        staleness: self.staleness,
                        last_success: last_success_at,
                    });
                }
                _ = shutdown.cancelled() => {
                    cancel.cancel();
                    return Exit::Shutdown;
                }
                _ = cancel.cancelled() => {
                    // The engine stopped underneath us. During a shutdown
                    // that is expected, not fatal.
                    return if shutdown.is_cancelled() {
                        Exit::Shutdown
                    } else {
                        Exit::Fatal(DnsError::RefreshCancelled)
                    };
                }
                err = err_rx.recv() => match err {
                    Some(err) => {
                        errs += 1;
                        metrics::record_refresh_error();
                        warn!(consecutive = errs, "refresh error: {err}");
                    }
                    None => {
                        cancel.cancel();
                        return Exit::Fatal(DnsError::RefreshCancelled);
                    }
                },
                ok = ok_rx.recv() => match ok {
                    Some(()) => {
                        errs = 0;
                        oks += 1;
                        last_success = Some(Instant::now());
                        last_success_at = Some(SystemTime::now());
                        metrics::record_refresh_success();
                        info!(total = oks, "successfully refreshed records");
                    }
                    None => {
                        cancel.cancel();
                        return Exit::Fatal(DnsError::RefreshCancelled);
                    }
                },
            }
        }
    }
}
