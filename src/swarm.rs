//! Swarm cluster adapter.
//!
//! Polls the cluster manager's `/containers/json` endpoint and maps the
//! running containers into [`Task`] values. Containers opt into DNS through
//! the `dns.service` and `dns.domain` labels.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DnsError;
use crate::sync::ClusterSource;
use crate::task::{ClusterState, Port, Task};

/// Container label selecting the DNS service name.
const DNS_SERVICE_LABEL: &str = "dns.service";
/// Container label selecting the optional project domain.
const DNS_DOMAIN_LABEL: &str = "dns.domain";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS settings for the cluster manager connection. The certificate directory
/// holds `ca.pem`, `cert.pem` and `key.pem`.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Directory holding the PEM files.
    pub cert_dir: PathBuf,
    /// Verify the remote peer's identity.
    pub verify: bool,
}

/// Client for a Swarm manager's HTTP API.
pub struct Swarm {
    client: reqwest::Client,
    base: String,
}

/// Container item as it appears in the `/containers/json` endpoint.
#[derive(Debug, Deserialize)]
struct Container {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Ports", default)]
    ports: Vec<ContainerPort>,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

/// Port declaration item as it appears in `/containers/json`.
#[derive(Debug, Deserialize)]
struct ContainerPort {
    #[serde(rename = "IP", default)]
    ip: String,
    #[serde(rename = "PublicPort", default)]
    public_port: u16,
    #[serde(rename = "Type", default)]
    proto: String,
}

impl Swarm {
    /// Create a client for the manager at `addr`. Plain `host:port` and
    /// `tcp://` endpoints pick `http` or `https` based on whether TLS is
    /// configured.
    pub fn new(addr: &str, tls: Option<TlsOptions>) -> Result<Self, DnsError> {
        let (scheme, rest) = match addr.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("", addr),
        };
        let scheme = match scheme {
            "" | "tcp" => {
                if tls.is_some() {
                    "https"
                } else {
                    "http"
                }
            }
            "http" | "https" => scheme,
            other => {
                return Err(DnsError::Config(format!(
                    "unsupported cluster endpoint scheme '{other}': use host:port, tcp:// or http(s)://"
                )))
            }
        };

        Ok(Self {
            client: build_client(tls.as_ref())?,
            base: format!("{scheme}://{rest}"),
        })
    }

    async fn list_containers(&self) -> Result<Vec<Container>, DnsError> {
        let url = format!(
            "{}/containers/json?all=false",
            self.base.trim_end_matches('/')
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(DnsError::Cluster(format!(
                "cluster API error (status {status}) body: {body:?}"
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| DnsError::Cluster(format!("error unmarshaling container list: {e}")))
    }
}

#[async_trait]
impl ClusterSource for Swarm {
    async fn tasks(&self) -> Result<ClusterState, DnsError> {
        let containers = self.list_containers().await?;
        containers_to_tasks(containers)
    }
}

fn build_client(tls: Option<&TlsOptions>) -> Result<reqwest::Client, DnsError> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(tls) = tls {
        let ca = std::fs::read(tls.cert_dir.join("ca.pem"))?;
        let cert = std::fs::read(tls.cert_dir.join("cert.pem"))?;
        let key = std::fs::read(tls.cert_dir.join("key.pem"))?;

        let mut identity = cert;
        identity.extend_from_slice(&key);
        builder = builder
            .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
            .identity(reqwest::Identity::from_pem(&identity)?)
            .danger_accept_invalid_certs(!tls.verify);
    }
    Ok(builder.build()?)
}

/// Strips the container listing down to [`Task`] values.
fn containers_to_tasks(containers: Vec<Container>) -> Result<ClusterState, DnsError> {
    let mut out = Vec::with_capacity(containers.len());
    for c in containers {
        let ports = mapped_ports(&c.ports).map_err(|e| {
            DnsError::Cluster(format!(
                "error parsing ports for container {} ({:?}): {e}",
                c.id, c.names
            ))
        })?;
        let (service, domain) = dns_parts_from_labels(&c.labels);
        out.push(Task {
            id: c.id,
            ports,
            service,
            domain,
        });
    }
    Ok(out)
}

/// Extracts the service and domain labels a container was started with.
/// Labels are case-insensitive; the domain is meaningless without a service
/// and dropped in that case.
fn dns_parts_from_labels(labels: &HashMap<String, String>) -> (String, String) {
    let service = labels
        .get(DNS_SERVICE_LABEL)
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let mut domain = labels
        .get(DNS_DOMAIN_LABEL)
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if service.is_empty() {
        domain.clear();
    }
    (service, domain)
}

/// Keeps only the port declarations actually mapped to the host.
fn mapped_ports(ports: &[ContainerPort]) -> Result<Vec<Port>, String> {
    let mut out = Vec::new();
    for p in ports {
        if p.ip.is_empty() || p.public_port == 0 {
            continue;
        }
        let host_ip = p
            .ip
            .parse()
            .map_err(|_| format!("cannot parse IP '{}'", p.ip))?;
        out.push(Port {
            host_ip,
            host_port: p.public_port,
            proto: p.proto.clone(),
        });
    }
    Ok(out)
}
