//! Shared test infrastructure for DNS handler integration tests.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use swarm_dns::store::{RrStore, RrTable};
use swarm_dns::{DnsHandler, Forwarder};

// --- Constants ---

pub const DOMAIN: &str = "swarm.";

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `DnsHandler::handle_request()`. The response is serialized via
/// `MessageResponse::destructive_emit()` and stored as raw wire-format bytes,
/// which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Store / handler builders ---

/// Build an `RrTable` from `(record type, fqdn, answers)` triples.
pub fn build_table(entries: &[(RecordType, &str, &[&str])]) -> RrTable {
    let mut table = RrTable::new();
    for (rtype, fqdn, answers) in entries {
        table
            .entry(*rtype)
            .or_default()
            .insert(fqdn.to_string(), answers.iter().map(|s| s.to_string()).collect());
    }
    table
}

/// Build a handler for [`DOMAIN`] over the given table.
pub fn build_handler(entries: &[(RecordType, &str, &[&str])], forwarder: Option<Forwarder>) -> DnsHandler {
    let store = RrStore::new();
    store.set(build_table(entries));
    DnsHandler::new(DOMAIN, store, forwarder).expect("failed to create DnsHandler")
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` as it would arrive over UDP.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a `Request` carrying an EDNS OPT record with the given UDP payload
/// size and DNSSEC-OK set.
pub fn build_edns_request(name: &str, record_type: RecordType, id: u16, payload: u16) -> Request {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);

    let mut edns = Edns::new();
    edns.set_max_payload(payload);
    edns.set_dnssec_ok(true);
    *msg.extensions_mut() = Some(edns);

    let bytes = msg.to_vec().unwrap();
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute a query through the handler and return the parsed response.
pub async fn execute_query(handler: &DnsHandler, name: &str, record_type: RecordType) -> Message {
    let request = build_request(name, record_type, 7);
    let capture = TestResponseHandler::new();
    handler.handle_request(&request, capture.clone()).await;
    capture.into_message()
}

/// Extract A record addresses from a response, as strings, in answer order.
pub fn extract_a_answers(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(std::net::Ipv4Addr::from(*a).to_string()),
            _ => None,
        })
        .collect()
}

/// Extract SRV answers from a response as `target:port` strings (target
/// without its trailing dot), in answer order.
pub fn extract_srv_answers(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::SRV(srv) => {
                let target = srv.target().to_string();
                Some(format!("{}:{}", target.trim_end_matches('.'), srv.port()))
            }
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert the answers match as an unordered multiset.
pub fn assert_answer_set(mut actual: Vec<String>, expected: &[&str]) {
    actual.sort();
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(
        actual, expected,
        "answers mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}

// --- Stub upstream ---

/// Binds a local UDP stub upstream that answers every query with one fixed
/// A record, and returns its address.
pub async fn spawn_stub_upstream(answer: &str) -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let ip: std::net::Ipv4Addr = answer.parse().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let Ok(query) = Message::from_vec(&buf[..len]) else {
                continue;
            };

            let mut reply = Message::new();
            reply.set_id(query.id());
            reply.set_message_type(MessageType::Response);
            reply.set_op_code(OpCode::Query);
            reply.set_response_code(ResponseCode::NoError);
            reply.set_recursion_available(true);
            if let Some(q) = query.queries().first() {
                reply.add_query(q.clone());
                reply.add_answer(Record::from_rdata(
                    q.name().clone(),
                    60,
                    RData::A(A::from(ip)),
                ));
            }
            let _ = socket.send_to(&reply.to_vec().unwrap(), src).await;
        }
    });
    addr
}

/// Binds a UDP stub that records the last query it received and answers with
/// an empty NOERROR response. Returns the stub address and the recording
/// slot.
pub async fn spawn_recording_upstream() -> (SocketAddr, Arc<Mutex<Option<Message>>>) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let seen: Arc<Mutex<Option<Message>>> = Arc::new(Mutex::new(None));

    tokio::spawn({
        let seen = Arc::clone(&seen);
        async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    continue;
                };

                let mut reply = Message::new();
                reply.set_id(query.id());
                reply.set_message_type(MessageType::Response);
                reply.set_op_code(OpCode::Query);
                reply.set_response_code(ResponseCode::NoError);
                reply.set_recursion_available(true);
                if let Some(q) = query.queries().first() {
                    reply.add_query(q.clone());
                }
                *seen.lock().unwrap() = Some(query);
                let _ = socket.send_to(&reply.to_vec().unwrap(), src).await;
            }
        }
    });
    (addr, seen)
}

/// Binds a UDP stub that replies with bytes no DNS parser accepts.
pub async fn spawn_broken_upstream() -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((_, src)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let _ = socket.send_to(b"bogus", src).await;
        }
    });
    addr
}
