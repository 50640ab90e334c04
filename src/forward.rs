//! One-shot recursive forwarding to upstream nameservers.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::Message;
use rand::seq::IndexedRandom;
use tokio::net::UdpSocket;

use crate::error::DnsError;

/// Upstream exchanges get their own wall-clock bound; a stuck upstream must
/// not pin the query handler.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum size of an upstream UDP response we accept.
const MAX_RESPONSE_SIZE: usize = 4096;

/// Stateless client for the configured upstream nameservers.
///
/// Each call picks one nameserver uniformly at random and performs a single
/// exchange. A failed exchange is reported to the caller; there is no retry
/// against the remaining upstreams.
#[derive(Debug, Clone)]
pub struct Forwarder {
    nameservers: Vec<SocketAddr>,
}

impl Forwarder {
    /// Create a forwarder over a non-empty upstream list.
    pub fn new(nameservers: Vec<SocketAddr>) -> Result<Self, DnsError> {
        if nameservers.is_empty() {
            return Err(DnsError::Config(
                "no upstream nameservers to forward to".to_string(),
            ));
        }
        Ok(Self { nameservers })
    }

    /// Forward a query and return the upstream's response along with the
    /// nameserver that served it.
    pub async fn exchange(&self, query: &Message) -> Result<(Message, SocketAddr), DnsError> {
        let ns = *self
            .nameservers
            .choose(&mut rand::rng())
            .ok_or_else(|| DnsError::Config("no upstream nameservers to forward to".to_string()))?;

        let bind = match ns.ip() {
            IpAddr::V4(_) => SocketAddr::from((std::net::Ipv4Addr::UNSPECIFIED, 0)),
            IpAddr::V6(_) => SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(ns).await?;
        socket.send(&query.to_vec()?).await?;

        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        let len = tokio::time::timeout(EXCHANGE_TIMEOUT, socket.recv(&mut buf))
            .await
            .map_err(|_| {
                DnsError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("upstream {ns} did not answer"),
                ))
            })??;

        let response = Message::from_vec(&buf[..len])?;
        Ok((response, ns))
    }
}
