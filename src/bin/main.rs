//! swarm-dns binary entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use swarm_dns::supervisor::Exit;
use swarm_dns::swarm::TlsOptions;
use swarm_dns::{
    config, telemetry, ClusterDns, DnsServer, Forwarder, Options, RrStore, Supervisor, Swarm,
};

/// DNS service discovery for container clusters.
#[derive(Parser, Debug)]
#[command(name = "swarm-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// DNS domain (FQDN suffix) for which this server is authoritative.
    #[arg(long, env = "SWARM_DNS_DOMAIN", default_value = "swarm.")]
    domain: String,

    /// IP:port on which the server should listen.
    #[arg(long, env = "SWARM_DNS_BIND", default_value = ":53", value_parser = config::parse_bind_addr)]
    bind: std::net::SocketAddr,

    /// Address of the cluster manager.
    #[arg(long, env = "SWARM_DNS_CLUSTER_ADDR", default_value = "127.0.0.1:2376")]
    cluster_addr: String,

    /// Directory where TLS certs for the cluster manager are stored.
    #[arg(long, env = "DOCKER_CERT_PATH")]
    tls_dir: Option<PathBuf>,

    /// Verify the remote cluster manager's identity using TLS.
    #[arg(long, env = "DOCKER_TLS_VERIFY", default_value_t = false)]
    tls_verify: bool,

    /// Use external nameservers to resolve DNS requests outside the domain.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    external: bool,

    /// External nameserver(s) to forward requests to
    /// (default: nameservers in /etc/resolv.conf).
    #[arg(long = "ns")]
    nameservers: Vec<String>,

    /// How frequently to refresh the DNS table from cluster records.
    #[arg(long, default_value = "15s", value_parser = humantime::parse_duration)]
    refresh: Duration,

    /// Time allotted for the cluster manager to list containers.
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    refresh_timeout: Duration,

    /// How long to serve stale DNS records before exiting.
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    staleness: Duration,

    /// Log level filter (e.g. "info", "swarm_dns=debug,warn").
    #[arg(long, env = "SWARM_DNS_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    telemetry::init(&args.log_level);

    let mut opts = Options {
        domain: args.domain,
        bind_addr: args.bind,
        cluster_addr: args.cluster_addr,
        tls_dir: args.tls_dir,
        tls_verify: args.tls_verify,
        external: args.external,
        nameservers: args.nameservers,
        refresh_interval: args.refresh,
        refresh_timeout: args.refresh_timeout,
        staleness: args.staleness,
    };
    if let Err(e) = opts.validate() {
        error!("{e}");
        return Err(e.into());
    }

    info!(
        domain = %opts.domain,
        bind = %opts.bind_addr,
        cluster = %opts.cluster_addr,
        tls = opts.tls_dir.is_some(),
        tls_verify = opts.tls_verify,
        external = opts.external,
        nameservers = ?opts.nameservers,
        refresh = ?opts.refresh_interval,
        refresh_timeout = ?opts.refresh_timeout,
        staleness = ?opts.staleness,
        "starting swarm-dns"
    );

    serve(opts).await
}

/// Wires the components together and blocks until the server stops or the
/// supervisor declares the records stale.
async fn serve(opts: Options) -> Result<(), Box<dyn std::error::Error>> {
    let tls = opts.tls_dir.as_ref().map(|dir| TlsOptions {
        cert_dir: dir.clone(),
        verify: opts.tls_verify,
    });

    let store = RrStore::new();
    let cluster = Arc::new(Swarm::new(&opts.cluster_addr, tls)?);
    let dns = Arc::new(ClusterDns::new(&opts.domain, store.clone(), cluster));

    let forwarder = if opts.external {
        Some(Forwarder::new(opts.nameserver_addrs()?)?)
    } else {
        None
    };

    // Two distinct signals: `shutdown` is the operator asking us to stop,
    // `cancel` tears down the refresh engine. The supervisor fires `cancel`
    // on every exit path, so only it decides whether a stop was clean.
    let shutdown = CancellationToken::new();
    let cancel = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        }
    });

    let (err_rx, ok_rx) =
        dns.start_refreshing(opts.refresh_interval, opts.refresh_timeout, cancel.clone());

    let supervisor = Supervisor::new(opts.staleness);
    let supervision = tokio::spawn({
        let shutdown = shutdown.clone();
        let cancel = cancel.clone();
        async move { supervisor.run(err_rx, ok_rx, shutdown, cancel).await }
    });

    let server = DnsServer::new(&opts.domain, opts.bind_addr, store, forwarder)?;

    // The server stops once the supervisor cancels the engine, for a clean
    // shutdown and a fatal verdict alike; a listener error in turn tears the
    // refresh loop down through the same token.
    let server_result = server.run(cancel.clone()).await;
    cancel.cancel();

    let exit = match supervision.await {
        Ok(exit) => exit,
        Err(e) => {
            error!("supervisor task failed: {e}");
            Exit::Fatal(swarm_dns::DnsError::RefreshCancelled)
        }
    };

    if let Err(e) = &server_result {
        error!("DNS server error: {e}");
    }
    server_result?;

    match exit {
        Exit::Shutdown => {
            info!("swarm-dns shutdown complete");
            Ok(())
        }
        Exit::Fatal(fatal) => {
            error!("fatal: {fatal}");
            Err(fatal.into())
        }
    }
}
