//! Keeps the DNS record table in sync with the cluster.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DnsError;
use crate::metrics;
use crate::records;
use crate::refresh;
use crate::store::RrStore;
use crate::task::ClusterState;

/// A distributed task execution environment.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Gives the active tasks in the cluster, which may or may not be
    /// eligible for DNS records due to reasons such as having no ports
    /// exposed.
    async fn tasks(&self) -> Result<ClusterState, DnsError>;
}

/// Ties the cluster source, the record projection and the record store
/// together.
pub struct ClusterDns {
    domain: String,
    store: RrStore,
    source: Arc<dyn ClusterSource>,
}

impl ClusterDns {
    /// Create a new syncer publishing into `store`.
    pub fn new(domain: &str, store: RrStore, source: Arc<dyn ClusterSource>) -> Self {
        Self {
            domain: domain.to_string(),
            store,
            source,
        }
    }

    /// Query the cluster and replace the record table with a fresh
    /// projection. The snapshot fetch is raced against `cancel`.
    pub async fn sync_records(&self, cancel: CancellationToken) -> Result<(), DnsError> {
        let state = tokio::select! {
            _ = cancel.cancelled() => return Err(DnsError::RefreshCancelled),
            state = self.source.tasks() => state?,
        };
        let table = records::build_table(&self.domain, &state);
        metrics::record_table_size(&table);
        self.store.set(table);
        Ok(())
    }

    /// Start refreshing the record table every `interval`, with each attempt
    /// bounded by `timeout`. Returns the error and success event streams of
    /// the underlying refresh loop.
    pub fn start_refreshing(
        self: Arc<Self>,
        interval: Duration,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<DnsError>, mpsc::Receiver<()>) {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The interval fires immediately once; the first refresh
                // belongs at one full interval after startup.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = ticker.tick() => {
                            let _ = tick_tx.try_send(Instant::now());
                        }
                    }
                }
            }
        });

        info!(interval = ?interval, "starting to refresh DNS records");
        refresh::run(
            move |attempt| {
                let this = Arc::clone(&self);
                async move {
                    debug!("refreshing DNS records");
                    this.sync_records(attempt).await
                }
            },
            tick_rx,
            timeout,
            cancel,
        )
    }
}
