//! DNS server: authoritative answers for the cluster domain, recursive
//! forwarding for everything else.

use std::net::SocketAddr;

use async_trait::async_trait;
use hickory_proto::op::{Header, Message, MessageType, ResponseCode};
use hickory_proto::rr::{LowerName, Name, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use hickory_server::ServerFuture;
use rand::seq::SliceRandom;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DnsError;
use crate::forward::Forwarder;
use crate::metrics::{self, QueryOutcome, Timer};
use crate::rrtype;
use crate::store::RrStore;

/// Routes incoming questions by suffix match against the cluster domain and
/// answers them from the record store or an upstream nameserver.
pub struct DnsHandler {
    domain: LowerName,
    store: RrStore,
    forwarder: Option<Forwarder>,
}

impl DnsHandler {
    /// Create a handler authoritative for `domain`. Recursion is enabled iff
    /// a forwarder is given.
    pub fn new(
        domain: &str,
        store: RrStore,
        forwarder: Option<Forwarder>,
    ) -> Result<Self, DnsError> {
        let domain: LowerName = Name::from_ascii(domain)?.into();
        Ok(Self {
            domain,
            store,
            forwarder,
        })
    }

    async fn respond<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: &mut R,
    ) -> Result<ResponseInfo, DnsError> {
        let info = request.request_info()?;
        let qtype = info.query.query_type();
        let qname = info.query.name().to_string().trim().to_lowercase();
        let record_name = Name::from(info.query.name().clone());
        let internal = self.domain.zone_of(info.query.name());

        if internal {
            self.handle_domain(request, &qname, qtype, record_name, response_handle)
                .await
        } else {
            self.handle_external(request, &qname, qtype, response_handle)
                .await
        }
    }

    /// Answers questions inside the cluster's domain from the record store.
    async fn handle_domain<R: ResponseHandler>(
        &self,
        request: &Request,
        qname: &str,
        qtype: RecordType,
        record_name: Name,
        response_handle: &mut R,
    ) -> Result<ResponseInfo, DnsError> {
        let timer = Timer::start();
        debug!(query = %qtype, name = %qname, "internal query");

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        let builder = MessageResponseBuilder::from_message_request(request);

        if !rrtype::is_supported(qtype) {
            debug!(query = %qtype, name = %qname, "NOTIMP");
            metrics::record_query(qtype, QueryOutcome::NotImplemented, timer.elapsed());
            header.set_response_code(ResponseCode::NotImp);
            let response = builder.build_no_records(header);
            return Ok(response_handle.send_response(response).await?);
        }

        let Some(mut answers) = self.store.get(qname, qtype) else {
            debug!(query = %qtype, name = %qname, "NXDOMAIN");
            metrics::record_query(qtype, QueryOutcome::NxDomain, timer.elapsed());
            header.set_response_code(ResponseCode::NXDomain);
            let response = builder.build_no_records(header);
            return Ok(response_handle.send_response(response).await?);
        };

        // Each response gets its own permutation; this is the only
        // load-balancing mechanism.
        answers.shuffle(&mut rand::rng());

        let mut records = Vec::with_capacity(answers.len());
        for answer in &answers {
            match rrtype::to_record(qtype, &record_name, answer) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(query = %qtype, name = %qname, "SERVFAIL: record conversion: {e}");
                    metrics::record_query(qtype, QueryOutcome::FormatError, timer.elapsed());
                    header.set_response_code(ResponseCode::ServFail);
                    let response = builder.build_no_records(header);
                    return Ok(response_handle.send_response(response).await?);
                }
            }
        }

        debug!(query = %qtype, name = %qname, answers = records.len(), "answering");
        metrics::record_query(qtype, QueryOutcome::Hit, timer.elapsed());
        let response = builder.build(
            header,
            records.iter(),
            std::iter::empty(),
            std::iter::empty(),
            std::iter::empty(),
        );
        Ok(response_handle.send_response(response).await?)
    }

    /// Handles questions outside the cluster's domain, such as the public
    /// Internet.
    async fn handle_external<R: ResponseHandler>(
        &self,
        request: &Request,
        qname: &str,
        qtype: RecordType,
        response_handle: &mut R,
    ) -> Result<ResponseInfo, DnsError> {
        let timer = Timer::start();
        debug!(query = %qtype, name = %qname, "external query");

        let Some(forwarder) = &self.forwarder else {
            debug!(query = %qtype, name = %qname, "SERVFAIL: recursion disabled");
            metrics::record_query(qtype, QueryOutcome::RecursionDisabled, timer.elapsed());
            let mut header = Header::response_from_request(request.header());
            header.set_response_code(ResponseCode::ServFail);
            header.set_authoritative(false);
            header.set_recursion_available(false);
            let builder = MessageResponseBuilder::from_message_request(request);
            let response = builder.build_no_records(header);
            return Ok(response_handle.send_response(response).await?);
        };

        // Reconstruct the client's message for the upstream exchange,
        // carrying its question section, DNSSEC-related header bits and EDNS
        // negotiation (UDP payload size, DNSSEC-OK) along unchanged.
        let mut query = Message::new();
        query.set_id(request.header().id());
        query.set_message_type(MessageType::Query);
        query.set_op_code(request.header().op_code());
        query.set_recursion_desired(request.header().recursion_desired());
        query.set_checking_disabled(request.header().checking_disabled());
        query.set_authentic_data(request.header().authentic_data());
        for q in request.queries() {
            query.add_query(q.original().clone());
        }
        if let Some(edns) = request.edns() {
            *query.extensions_mut() = Some(edns.clone());
        }

        match forwarder.exchange(&query).await {
            Ok((upstream, ns)) => {
                debug!(
                    query = %qtype,
                    name = %qname,
                    upstream = %ns,
                    answers = upstream.answers().len(),
                    extra = upstream.additionals().len(),
                    ns_records = upstream.name_servers().len(),
                    "forwarded"
                );
                metrics::record_query(qtype, QueryOutcome::Forwarded, timer.elapsed());
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(upstream.response_code());
                header.set_authoritative(false);
                header.set_recursion_available(upstream.recursion_available());
                header.set_truncated(upstream.truncated());
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build(
                    header,
                    upstream.answers().iter(),
                    upstream.name_servers().iter(),
                    std::iter::empty(),
                    upstream.additionals().iter(),
                );
                Ok(response_handle.send_response(response).await?)
            }
            Err(e) => {
                warn!(query = %qtype, name = %qname, "SERVFAIL: upstream exchange: {e}");
                metrics::record_query(qtype, QueryOutcome::ForwardFailed, timer.elapsed());
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.set_authoritative(false);
                let builder = MessageResponseBuilder::from_message_request(request);
                let response = builder.build_no_records(header);
                Ok(response_handle.send_response(response).await?)
            }
        }
    }
}

#[async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        match self.respond(request, &mut response_handle).await {
            Ok(info) => info,
            Err(e) => {
                error!("failed to handle request: {e}");
                serve_failed()
            }
        }
    }
}

fn serve_failed() -> ResponseInfo {
    let mut header = Header::new();
    header.set_response_code(ResponseCode::ServFail);
    header.into()
}

/// UDP DNS server serving queries for the cluster domain out of the record
/// store.
pub struct DnsServer {
    bind_addr: SocketAddr,
    handler: DnsHandler,
}

impl DnsServer {
    /// Create a server ready to serve queries for `domain` on `bind_addr`
    /// using the given record table as the source of truth.
    pub fn new(
        domain: &str,
        bind_addr: SocketAddr,
        store: RrStore,
        forwarder: Option<Forwarder>,
    ) -> Result<Self, DnsError> {
        Ok(Self {
            bind_addr,
            handler: DnsHandler::new(domain, store, forwarder)?,
        })
    }

    /// Bind and serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DnsError> {
        let mut server = ServerFuture::new(self.handler);

        let udp = UdpSocket::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "DNS server started listening");
        server.register_socket(udp);

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("DNS server shutdown requested");
                Ok(())
            }
            result = server.block_until_done() => {
                result.map_err(DnsError::from)
            }
        }
    }
}
