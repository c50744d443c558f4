//! The audit entry shape and its canonical, checksum-excluded byte form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity of an audit entry. Ordered so `level < min_level` filtering is
/// a plain comparison; `Unknown` only arises reading entries this crate
/// did not write itself (forward compatibility for the on-disk format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warn,
    Critical,
    Security,
    #[serde(other)]
    Unknown,
}

/// One line of the audit log. `context` uses a `BTreeMap` rather than a
/// hash map so its serialized key order is deterministic — required for
/// the checksum chain to be reproducible byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp_ns: i64,
    pub level: AuditLevel,
    pub event: String,
    pub component: String,
    pub file_path: Option<String>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub context: BTreeMap<String, serde_json::Value>,
    pub process_id: u32,
    pub checksum: String,
}

/// Every field of [`AuditEntry`] except `checksum`, in declaration order.
/// Serializing this (rather than `AuditEntry` with `checksum` blanked out)
/// keeps the canonical form from ever depending on how an empty/blank
/// checksum field would itself serialize.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    timestamp_ns: i64,
    level: AuditLevel,
    event: &'a str,
    component: &'a str,
    file_path: &'a Option<String>,
    old_value: &'a Option<serde_json::Value>,
    new_value: &'a Option<serde_json::Value>,
    context: &'a BTreeMap<String, serde_json::Value>,
    process_id: u32,
}

impl AuditEntry {
    /// Stable serialization of all fields but `checksum`. `serde_json`
    /// sorts object keys by default (no `preserve_order` feature enabled
    /// anywhere in this workspace), so this is byte-identical across runs
    /// given identical field values.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = CanonicalEntry {
            timestamp_ns: self.timestamp_ns,
            level: self.level,
            event: &self.event,
            component: &self.component,
            file_path: &self.file_path,
            old_value: &self.old_value,
            new_value: &self.new_value,
            context: &self.context,
            process_id: self.process_id,
        };
        serde_json::to_vec(&canonical).expect("AuditEntry fields are always JSON-serializable")
    }

    /// `checksum_n = hash(canonical(entry_n) || checksum_{n-1})`. Pass an
    /// empty string as `previous_checksum` for the first entry.
    pub fn compute_checksum(&self, previous_checksum: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.canonical_bytes());
        hasher.update(previous_checksum.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}
