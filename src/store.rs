//! Concurrency-safe storage for DNS Resource Records.
//!
//! The refresh path replaces the whole table at once; the serving path reads
//! individual `(record type, FQDN)` entries. Readers proceed concurrently,
//! writes are serialized against both.

use hickory_proto::rr::RecordType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// FQDN answers per RR type.
///
/// Example:
/// ```text
/// {
///   A:   {"api.swarm." : ["10.0.0.3"]},
///   SRV: {"_api._tcp.swarm." : ["10.0.0.3:23481", "10.0.0.7:11215"]}
/// }
/// ```
pub type RrTable = HashMap<RecordType, HashMap<String, Vec<String>>>;

/// Thread-safe record table with wholesale replacement.
#[derive(Debug, Clone, Default)]
pub struct RrStore {
    inner: Arc<RwLock<RrTable>>,
}

impl RrStore {
    /// Create a new empty record table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the stored answers for an FQDN and record type.
    /// Returns `None` iff the pair is absent.
    pub fn get(&self, fqdn: &str, rtype: RecordType) -> Option<Vec<String>> {
        let table = self.inner.read();
        table.get(&rtype)?.get(fqdn).cloned()
    }

    /// Replace the entire table.
    pub fn set(&self, table: RrTable) {
        *self.inner.write() = table;
    }
}
