//! Configuration and validation for swarm-dns.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::DnsError;

/// Effective server configuration, validated before use.
#[derive(Debug, Clone)]
pub struct Options {
    /// DNS domain (FQDN suffix) this server is authoritative for.
    pub domain: String,
    /// Address the DNS server listens on.
    pub bind_addr: SocketAddr,
    /// Cluster manager endpoint (`host:port`, `tcp://` or `http(s)://`).
    pub cluster_addr: String,
    /// Directory with TLS certs for the cluster manager; `None` disables TLS.
    pub tls_dir: Option<PathBuf>,
    /// Verify the cluster manager's identity using TLS.
    pub tls_verify: bool,
    /// Forward queries outside the domain to external nameservers.
    pub external: bool,
    /// External nameservers as `ip` or `ip:port`.
    pub nameservers: Vec<String>,
    /// How frequently to refresh the record table from the cluster.
    pub refresh_interval: Duration,
    /// Time allotted for the cluster to list its tasks.
    pub refresh_timeout: Duration,
    /// How long to serve unrefreshed records before exiting.
    pub staleness: Duration,
}

impl Options {
    /// Check logical correctness and consistency of the input arguments and
    /// normalize them in place: the domain becomes a lowercase FQDN and the
    /// nameserver list is resolved (from `/etc/resolv.conf` when empty) and
    /// canonicalized to `ip:port`.
    pub fn validate(&mut self) -> Result<(), DnsError> {
        // No NS must be specified if recursion is off.
        if !self.external && !self.nameservers.is_empty() {
            return Err(DnsError::Config(
                "external querying disabled, but external nameservers specified".to_string(),
            ));
        }

        // TLS verify can be used only if certs are specified.
        if self.tls_verify && self.tls_dir.is_none() {
            return Err(DnsError::Config(
                "TLS verify specified, but no TLS cert path".to_string(),
            ));
        }

        // No nameservers specified: fall back to the system resolvers.
        if self.external && self.nameservers.is_empty() {
            self.nameservers = system_nameservers()?;
            if self.nameservers.is_empty() {
                return Err(DnsError::Config(
                    "no nameservers found in /etc/resolv.conf".to_string(),
                ));
            }
        }

        for ns in &mut self.nameservers {
            *ns = normalize_nameserver(ns)?;
        }

        if self.refresh_timeout >= self.refresh_interval {
            return Err(DnsError::Config(format!(
                "refresh timeout ({:?}) should be less than refresh interval ({:?})",
                self.refresh_timeout, self.refresh_interval
            )));
        }

        self.domain = self.domain.to_lowercase();
        if !self.domain.ends_with('.') {
            self.domain.push('.');
        }

        Ok(())
    }

    /// The validated nameserver list as socket addresses.
    pub fn nameserver_addrs(&self) -> Result<Vec<SocketAddr>, DnsError> {
        self.nameservers
            .iter()
            .map(|ns| {
                ns.parse()
                    .map_err(|e| DnsError::Config(format!("invalid nameserver '{ns}': {e}")))
            })
            .collect()
    }
}

/// Parse a listen address, accepting the bare `:port` shorthand for all
/// interfaces.
pub fn parse_bind_addr(s: &str) -> Result<SocketAddr, DnsError> {
    let full = if s.starts_with(':') {
        format!("0.0.0.0{s}")
    } else {
        s.to_string()
    };
    full.parse()
        .map_err(|e| DnsError::Config(format!("invalid bind address '{s}': {e}")))
}

/// Canonicalize a nameserver to `ip:port`, adding the default DNS port when
/// missing. Hostnames are not supported.
fn normalize_nameserver(s: &str) -> Result<String, DnsError> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 53).to_string());
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr.to_string());
    }
    Err(DnsError::Config(format!(
        "nameserver is not an IP address: '{s}'"
    )))
}

/// Nameservers from the local resolver configuration.
fn system_nameservers() -> Result<Vec<String>, DnsError> {
    let (config, _opts) = hickory_resolver::system_conf::read_system_conf()
        .map_err(|e| DnsError::Config(format!("failed to load nameservers list: {e}")))?;

    // The system config lists each resolver once per protocol.
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for ns in config.name_servers() {
        if seen.insert(ns.socket_addr) {
            out.push(ns.socket_addr.to_string());
        }
    }
    Ok(out)
}
