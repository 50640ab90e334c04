//! swarm-dns - DNS service discovery for container clusters.
//!
//! This crate provides an authoritative DNS server that keeps its records in
//! sync with the containers running in a cluster. Containers opt in through
//! the `dns.service` and `dns.domain` labels and are resolvable at names like
//! `api.swarm.` (A) and `_api._tcp.swarm.` (SRV); queries outside the
//! cluster's domain are forwarded to external nameservers.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          swarm-dns                             │
//! │                                                                │
//! │  ┌───────────────┐ poll  ┌────────────┐ publish ┌───────────┐ │
//! │  │ Refresh loop  │──────▶│ Projection │────────▶│ RR store  │ │
//! │  │ (overlapping) │       │ (filters)  │         │ (A / SRV) │ │
//! │  └──────┬────────┘       └────────────┘         └─────┬─────┘ │
//! │         │ events                                      │       │
//! │         ▼                                             ▼       │
//! │  ┌───────────────┐                           ┌─────────────┐  │
//! │  │  Supervisor   │                           │ DNS handler │◀─── UDP :53
//! │  │  (staleness)  │                           │ + forwarder │  │
//! │  └───────────────┘                           └─────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency posture
//!
//! Every refresh replaces the whole record table; when refreshes keep failing
//! past the staleness deadline, the supervisor terminates the process instead
//! of serving outdated answers. Restart is the recovery mechanism.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use swarm_dns::{ClusterDns, DnsServer, RrStore, Supervisor, Swarm};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RrStore::new();
//!     let cluster = Arc::new(Swarm::new("127.0.0.1:2376", None).unwrap());
//!     let dns = Arc::new(ClusterDns::new("swarm.", store.clone(), cluster));
//!
//!     let cancel = CancellationToken::new();
//!     let (err_rx, ok_rx) = dns.start_refreshing(
//!         Duration::from_secs(15),
//!         Duration::from_secs(10),
//!         cancel.clone(),
//!     );
//!     tokio::spawn(async move {
//!         Supervisor::new(Duration::from_secs(60))
//!             .run(err_rx, ok_rx, cancel.clone())
//!             .await
//!     });
//!
//!     let server = DnsServer::new("swarm.", "0.0.0.0:53".parse().unwrap(), store, None).unwrap();
//!     server.run(CancellationToken::new()).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod records;
pub mod refresh;
pub mod rrtype;
pub mod server;
pub mod store;
pub mod supervisor;
pub mod swarm;
pub mod sync;
pub mod task;
pub mod telemetry;

// Re-export main types
pub use config::Options;
pub use error::DnsError;
pub use forward::Forwarder;
pub use server::{DnsHandler, DnsServer};
pub use store::{RrStore, RrTable};
pub use supervisor::{Exit, Supervisor};
pub use swarm::Swarm;
pub use sync::{ClusterDns, ClusterSource};
pub use task::{ClusterState, Port, Task};
