//! Conversion of stored answer strings into typed wire records.

use std::net::{Ipv4Addr, SocketAddr};

use hickory_proto::rr::rdata::{A, SRV};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};

use crate::error::DnsError;

/// Record types this server answers authoritatively.
const SUPPORTED: &[RecordType] = &[RecordType::A, RecordType::SRV];

/// Returns whether the server supports answering questions for the given
/// RR type.
pub fn is_supported(rtype: RecordType) -> bool {
    SUPPORTED.contains(&rtype)
}

/// Converts a stored answer into a DNS record for the given type. Authoritative
/// answers carry TTL 0 so that clients re-resolve on every use.
pub fn to_record(rtype: RecordType, name: &Name, answer: &str) -> Result<Record, DnsError> {
    match rtype {
        RecordType::A => format_a(name, answer),
        RecordType::SRV => format_srv(name, answer),
        other => Err(DnsError::AnswerFormat {
            answer: answer.to_string(),
            rtype: other.to_string(),
            reason: "formatting not implemented".to_string(),
        }),
    }
}

fn format_a(name: &Name, answer: &str) -> Result<Record, DnsError> {
    let ip: Ipv4Addr = answer.parse().map_err(|e| DnsError::AnswerFormat {
        answer: answer.to_string(),
        rtype: RecordType::A.to_string(),
        reason: format!("not a valid IPv4 address: {e}"),
    })?;
    let mut record = Record::from_rdata(name.clone(), 0, RData::A(A::from(ip)));
    record.set_dns_class(DNSClass::IN);
    Ok(record)
}

fn format_srv(name: &Name, answer: &str) -> Result<Record, DnsError> {
    let addr: SocketAddr = answer.parse().map_err(|e| DnsError::AnswerFormat {
        answer: answer.to_string(),
        rtype: RecordType::SRV.to_string(),
        reason: format!("not a valid ip:port pair: {e}"),
    })?;
    // Target carries a trailing dot per the SRV RFC.
    let target = Name::from_utf8(format!("{}.", addr.ip())).map_err(|e| DnsError::AnswerFormat {
        answer: answer.to_string(),
        rtype: RecordType::SRV.to_string(),
        reason: e.to_string(),
    })?;

    // Priority and weight are constant so all endpoints stay equal; load
    // balancing happens through answer shuffling instead.
    let srv = SRV::new(1, 1, addr.port(), target);
    let mut record = Record::from_rdata(name.clone(), 0, RData::SRV(srv));
    record.set_dns_class(DNSClass::IN);
    Ok(record)
}
