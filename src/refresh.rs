//! Overlap-safe periodic task runner.
//!
//! Every tick starts a new, independent invocation of the refresh function;
//! a slow invocation never delays the next tick's start. Each invocation is
//! bounded by a timeout and resolved first-wins among timeout, upstream
//! cancellation, error and success.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DnsError;

/// Spawns the refresh loop for `f` and returns two event streams, one for
/// errors coming out of the invocations and one signaling every successful
/// return.
///
/// Both channels hold one event so a slow consumer cannot block the loop;
/// events beyond that are dropped. Invocations overlap, so neither stream is
/// ordered by tick index; consumers may only count events and track recency.
///
/// `cancel` stops tick processing and signals every in-flight invocation
/// through its own token. `f` is expected to observe its token promptly; the
/// loop neither aborts it nor waits for it to exit.
pub fn run<F, Fut>(
    f: F,
    mut ticks: mpsc::Receiver<Instant>,
    timeout: Duration,
    cancel: CancellationToken,
) -> (mpsc::Receiver<DnsError>, mpsc::Receiver<()>)
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DnsError>> + Send + 'static,
{
    let (err_tx, err_rx) = mpsc::channel(1);
    let (ok_tx, ok_rx) = mpsc::channel(1);

    let f = Arc::new(f);
    tokio::spawn(async move {
        loop {
            let tick = tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => tick,
                    None => break,
                },
            };
            debug!(at = ?tick, "refresh tick");

            let f = Arc::clone(&f);
            let err_tx = err_tx.clone();
            let ok_tx = ok_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let attempt = CancellationToken::new();
                let mut call = tokio::spawn(f(attempt.clone()));

                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        attempt.cancel();
                        let _ = err_tx.try_send(DnsError::RefreshTimeout);
                    }
                    _ = cancel.cancelled() => {
                        attempt.cancel();
                    }
                    res = &mut call => match res {
                        Ok(Ok(())) => {
                            let _ = ok_tx.try_send(());
                        }
                        Ok(Err(e)) => {
                            let _ = err_tx.try_send(e);
                        }
                        Err(join_err) => {
                            let _ = err_tx.try_send(DnsError::Cluster(format!(
                                "refresh task failed: {join_err}"
                            )));
                        }
                    },
                }
            });
        }
    });

    (err_rx, ok_rx)
}
