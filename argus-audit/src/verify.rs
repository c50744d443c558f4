//! Linear-scan verification of the audit log's hash chain.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::entry::AuditEntry;

/// Outcome of [`verify_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub entries_checked: usize,
    /// 1-based line number of the first entry whose checksum does not
    /// match, if any.
    pub first_broken_at: Option<usize>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.first_broken_at.is_none()
    }
}

/// Re-derive each entry's checksum from its canonical bytes and the
/// previous entry's checksum, comparing against the stored value. Stops
/// counting further breaks after the first one, since every entry after a
/// tampered one is transitively invalid (spec scenario S6).
pub fn verify_chain(path: &Path) -> std::io::Result<ChainVerification> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut previous_checksum = String::new();
    let mut entries_checked = 0usize;
    let mut first_broken_at = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        entries_checked += 1;

        let expected = entry.compute_checksum(&previous_checksum);
        if expected != entry.checksum && first_broken_at.is_none() {
            first_broken_at = Some(idx + 1);
        }
        previous_checksum = entry.checksum.clone();
    }

    Ok(ChainVerification {
        entries_checked,
        first_broken_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::sink::AuditSink;
    use std::io::Write;

    #[test]
    fn intact_chain_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = AuditSink::new(AuditConfig {
            enabled: true,
            output_file: Some(path.clone()),
            buffer_size: 1,
            ..AuditConfig::default()
        });
        for i in 0..10 {
            sink.log_file_watch("watch_start", format!("/tmp/{i}.json"));
        }
        sink.flush();

        let result = verify_chain(&path).unwrap();
        assert_eq!(result.entries_checked, 10);
        assert!(result.is_valid());
    }

    #[test]
    fn tampering_with_one_entry_breaks_the_chain_from_there_on() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = AuditSink::new(AuditConfig {
            enabled: true,
            output_file: Some(path.clone()),
            buffer_size: 1,
            ..AuditConfig::default()
        });
        for i in 0..10 {
            sink.log_file_watch("watch_start", format!("/tmp/{i}.json"));
        }
        sink.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(|s| s.to_string()).collect();
        let mut fifth: AuditEntry = serde_json::from_str(&lines[4]).unwrap();
        fifth.event = "tampered".to_string();
        lines[4] = serde_json::to_string(&fifth).unwrap();

        let mut file = std::fs::File::create(&path).unwrap();
        for line in &lines {
            writeln!(file, "{line}").unwrap();
        }

        let result = verify_chain(&path).unwrap();
        assert_eq!(result.first_broken_at, Some(5));
        assert!(!result.is_valid());
    }
}
