//! Cluster-side view of running workloads.

use std::fmt;
use std::net::IpAddr;

/// Point-in-time snapshot of the cluster.
pub type ClusterState = Vec<Task>;

/// A running container in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Task {
    /// Identifies the container in the cluster.
    pub id: String,
    /// Container ports mapped to the host as `ip:port`.
    pub ports: Vec<Port>,
    /// Service name grouping tasks under the same DNS record. Empty when the
    /// workload is not configured for DNS.
    pub service: String,
    /// Optional sub-label grouping services (project or tenant name). Empty
    /// means the service sits directly under the root domain.
    pub domain: String,
}

/// A network port of a service, as visible on the host machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Host address the port is bound to.
    pub host_ip: IpAddr,
    /// Port number on the host.
    pub host_port: u16,
    /// Network protocol, e.g. "tcp" or "udp".
    pub proto: String,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host_ip, self.host_port, self.proto)
    }
}
