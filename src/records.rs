//! Projection of cluster state into DNS Resource Records.
//!
//! Finds the tasks eligible for DNS and generates their A and SRV entries,
//! grouped by `service[.domain]` FQDN.

use hickory_proto::rr::RecordType;
use tracing::{debug, warn};

use crate::metrics;
use crate::store::RrTable;
use crate::task::{ClusterState, Task};

/// Decides whether a task can have DNS records; gives a reason when it cannot.
type FilterFn = fn(&Task) -> Result<(), String>;

/// Filters applied in order to determine DNS eligibility of tasks. The first
/// failing filter records the task as ineligible and skips it.
const DNS_FILTERS: &[FilterFn] = &[has_service_name, has_ports, ports_have_protos];

fn has_service_name(t: &Task) -> Result<(), String> {
    if t.service.is_empty() {
        Err("has no DNS name specified (or not configured for DNS)".to_string())
    } else {
        Ok(())
    }
}

fn has_ports(t: &Task) -> Result<(), String> {
    if t.ports.is_empty() {
        Err("has no port mappings".to_string())
    } else {
        Ok(())
    }
}

fn ports_have_protos(t: &Task) -> Result<(), String> {
    for p in &t.ports {
        if p.proto.is_empty() {
            return Err(format!("no network protocol specified for port mapping '{p}'"));
        }
    }
    Ok(())
}

// TODO validate service/domain labels against DNS name rules (length, charset)

/// A task that cannot have DNS records, and why.
struct Ineligible<'a> {
    task: &'a Task,
    reason: String,
}

/// Splits tasks by DNS eligibility.
fn filter_tasks(state: &ClusterState) -> (Vec<&Task>, Vec<Ineligible<'_>>) {
    let mut good = Vec::new();
    let mut bad = Vec::new();
    for t in state {
        match DNS_FILTERS.iter().find_map(|f| f(t).err()) {
            Some(reason) => bad.push(Ineligible { task: t, reason }),
            None => good.push(t),
        }
    }
    (good, bad)
}

/// A single generated record before insertion into the table.
struct RrEntry {
    rtype: RecordType,
    fqdn: String,
    answer: String,
}

/// Ensures `s` ends with a trailing dot.
fn fqdn(s: &str) -> String {
    if s.ends_with('.') {
        s.to_string()
    } else {
        format!("{s}.")
    }
}

/// Builds the RR table for the given cluster state. Ineligible tasks are
/// logged with their reasons and contribute no records.
pub fn build_table(domain: &str, state: &ClusterState) -> RrTable {
    let (good, bad) = filter_tasks(state);
    if !bad.is_empty() {
        warn!(count = bad.len(), "tasks not eligible for DNS records");
        for v in &bad {
            warn!(id = %v.task.id, "ineligible: {}", v.reason);
        }
    }
    debug!(count = good.len(), "tasks with DNS records");
    metrics::record_task_counts(good.len(), bad.len());

    let mut table = RrTable::new();
    for t in good {
        for entry in task_records(domain, t) {
            debug!(rtype = %entry.rtype, fqdn = %entry.fqdn, answer = %entry.answer, "+RR");
            table
                .entry(entry.rtype)
                .or_default()
                .entry(entry.fqdn)
                .or_default()
                .push(entry.answer);
        }
    }
    table
}

/// Generates all records of a single eligible task.
///
/// The A record uses the first port mapping's host IP ("where is the
/// service"); one SRV record per port carries the exact `ip:port` endpoints.
fn task_records(domain: &str, t: &Task) -> Vec<RrEntry> {
    let mut tail = fqdn(domain);
    if !t.domain.is_empty() {
        tail = format!("{}{}", fqdn(&t.domain), tail);
    }

    let mut out = Vec::with_capacity(1 + t.ports.len());
    out.push(RrEntry {
        rtype: RecordType::A,
        fqdn: format!("{}.{}", t.service, tail).to_lowercase(),
        answer: t.ports[0].host_ip.to_string(),
    });
    for p in &t.ports {
        out.push(RrEntry {
            rtype: RecordType::SRV,
            fqdn: format!("_{}._{}.{}", t.service, p.proto, tail).to_lowercase(),
            answer: format!("{}:{}", p.host_ip, p.host_port),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Port;

    fn port(ip: &str, port: u16, proto: &str) -> Port {
        Port {
            host_ip: ip.parse().unwrap(),
            host_port: port,
            proto: proto.to_string(),
        }
    }

    fn answers<'t>(table: &'t RrTable, rtype: RecordType, fqdn: &str) -> &'t [String] {
        table
            .get(&rtype)
            .and_then(|m| m.get(fqdn))
            .map(|v| v.as_slice())
            .unwrap_or_else(|| panic!("no {rtype} entry for {fqdn}"))
    }

    #[test]
    fn test_task_records_without_domain() {
        let t = Task {
            id: "w".to_string(),
            service: "foo".to_string(),
            ports: vec![port("10.0.0.1", 8000, "tcp")],
            ..Default::default()
        };
        let rrs = task_records("domain", &t);
        let rendered: Vec<String> = rrs
            .iter()
            .map(|r| format!("{} {} {}", r.rtype, r.fqdn, r.answer))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "A foo.domain. 10.0.0.1",
                "SRV _foo._tcp.domain. 10.0.0.1:8000",
            ]
        );
    }

    #[test]
    fn test_task_records_with_domain_and_multiple_ports() {
        let t = Task {
            id: "w".to_string(),
            service: "api".to_string(),
            domain: "billing".to_string(),
            ports: vec![port("10.0.0.2", 8001, "tcp"), port("10.0.0.2", 8002, "udp")],
        };
        let rrs = task_records("domain", &t);
        let rendered: Vec<String> = rrs
            .iter()
            .map(|r| format!("{} {} {}", r.rtype, r.fqdn, r.answer))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "A api.billing.domain. 10.0.0.2",
                "SRV _api._tcp.billing.domain. 10.0.0.2:8001",
                "SRV _api._udp.billing.domain. 10.0.0.2:8002",
            ]
        );
    }

    #[test]
    fn test_build_table_empty_state() {
        assert!(build_table("domain", &Vec::new()).is_empty());
    }

    #[test]
    fn test_build_table_all_tasks_ineligible() {
        let state = vec![
            Task {
                id: "no-ports".to_string(),
                service: "api".to_string(),
                ..Default::default()
            },
            Task {
                id: "no-service-name".to_string(),
                ports: vec![port("10.0.0.2", 8001, "tcp")],
                ..Default::default()
            },
            Task {
                id: "no-proto".to_string(),
                service: "test".to_string(),
                ports: vec![port("10.0.0.3", 500, "")],
                ..Default::default()
            },
        ];
        assert!(build_table("domain", &state).is_empty());
    }

    #[test]
    fn test_build_table_same_service_two_tasks() {
        let state = vec![
            Task {
                id: "w1".to_string(),
                service: "api".to_string(),
                ports: vec![port("10.0.0.1", 8000, "tcp")],
                ..Default::default()
            },
            Task {
                id: "w2".to_string(),
                service: "api".to_string(),
                ports: vec![port("10.0.0.2", 8000, "tcp")],
                ..Default::default()
            },
        ];
        let table = build_table("swarm.", &state);

        assert_eq!(
            answers(&table, RecordType::A, "api.swarm."),
            ["10.0.0.1", "10.0.0.2"]
        );
        assert_eq!(
            answers(&table, RecordType::SRV, "_api._tcp.swarm."),
            ["10.0.0.1:8000", "10.0.0.2:8000"]
        );
    }

    #[test]
    fn test_build_table_task_with_project_domain() {
        let state = vec![Task {
            id: "b".to_string(),
            service: "dns".to_string(),
            domain: "infra".to_string(),
            ports: vec![port("192.168.0.3", 53, "udp")],
        }];
        let table = build_table("swarm.", &state);

        assert_eq!(
            answers(&table, RecordType::A, "dns.infra.swarm."),
            ["192.168.0.3"]
        );
        assert_eq!(
            answers(&table, RecordType::SRV, "_dns._udp.infra.swarm."),
            ["192.168.0.3:53"]
        );
    }

    #[test]
    fn test_build_table_mixed_workload() {
        let state = vec![
            Task {
                id: "bind".to_string(),
                service: "dns".to_string(),
                domain: "infra".to_string(),
                ports: vec![port("192.168.0.3", 53, "udp")],
            },
            Task {
                id: "web1".to_string(),
                service: "api".to_string(),
                ports: vec![port("192.168.0.1", 8000, "tcp")],
                ..Default::default()
            },
            Task {
                id: "web2".to_string(),
                service: "api".to_string(),
                ports: vec![
                    port("192.168.0.2", 8000, "tcp"),
                    port("192.168.0.2", 5000, "udp"),
                ],
                ..Default::default()
            },
            Task {
                id: "nginx".to_string(),
                service: "frontend".to_string(),
                domain: "blog".to_string(),
                ports: vec![port("192.168.0.3", 8000, "tcp")],
            },
            // no proto on port
            Task {
                id: "debian".to_string(),
                service: "test".to_string(),
                ports: vec![port("192.168.0.3", 500, "")],
                ..Default::default()
            },
            // no service name
            Task {
                id: "debian".to_string(),
                ports: vec![port("192.168.0.3", 500, "udp")],
                ..Default::default()
            },
        ];
        let table = build_table("domain", &state);

        let a = table.get(&RecordType::A).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a["dns.infra.domain."], ["192.168.0.3"]);
        assert_eq!(a["api.domain."], ["192.168.0.1", "192.168.0.2"]);
        assert_eq!(a["frontend.blog.domain."], ["192.168.0.3"]);

        let srv = table.get(&RecordType::SRV).unwrap();
        assert_eq!(srv.len(), 4);
        assert_eq!(srv["_dns._udp.infra.domain."], ["192.168.0.3:53"]);
        assert_eq!(srv["_api._tcp.domain."], ["192.168.0.1:8000", "192.168.0.2:8000"]);
        assert_eq!(srv["_api._udp.domain."], ["192.168.0.2:5000"]);
        assert_eq!(srv["_frontend._tcp.blog.domain."], ["192.168.0.3:8000"]);
    }

    #[test]
    fn test_build_table_fqdns_lowercase_with_trailing_dot() {
        let state = vec![Task {
            id: "w".to_string(),
            service: "api".to_string(),
            ports: vec![port("10.0.0.1", 80, "tcp")],
            ..Default::default()
        }];
        // Root domain without trailing dot and with mixed case.
        let table = build_table("Swarm", &state);
        for names in table.values() {
            for fqdn in names.keys() {
                assert!(fqdn.ends_with("swarm."), "fqdn {fqdn} not normalized");
                assert_eq!(fqdn, &fqdn.to_lowercase());
            }
        }
    }
}
