//! Append-only ingest audit log (§6, `audit.log`). One JSON object per
//! ingest attempt, pre-redaction hashes only — the raw envelope's
//! plaintext never touches disk here, only its SHA-256.
//!
//! **(SUPPLEMENT)** `AuditRecord`, grounded in
//! `original_source/src/learning/StegoDetector.cpp` and
//! `UnicodeSanitizer.cpp`'s reporting conventions.

use crate::ingest::IngestResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub capsule_id: Option<String>,
    pub sender_id: String,
    pub stage_reached: String,
    pub outcome: String,
    pub envelope_sha256: String,
    pub timestamp_utc: chrono::DateTime<chrono::Utc>,
}

impl AuditRecord {
    pub fn new(capsule_id: Option<String>, sender_id: &str, result: &IngestResult, raw_envelope: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(raw_envelope);
        let hash = hasher.finalize();
        Self {
            capsule_id,
            sender_id: sender_id.to_string(),
            stage_reached: stage_name(result).to_string(),
            outcome: format!("{:?}", result),
            envelope_sha256: hex::encode(hash),
            timestamp_utc: chrono::Utc::now(),
        }
    }
}

fn stage_name(result: &IngestResult) -> &'static str {
    match result {
        IngestResult::Success | IngestResult::AlreadyExists => "corroborate",
        IngestResult::SchemaMismatch => "schema_validate",
        IngestResult::InvalidSignature => "signature_verify",
        IngestResult::DecryptionFailed => "decrypt",
        IngestResult::SteganographyDetected => "steganalysis",
        IngestResult::SandboxFailed => "sandbox",
        IngestResult::CorroborationFailed => "corroborate",
    }
}

pub struct AuditLog {
    path: std::path::PathBuf,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    pub fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(file, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_hashes_envelope_not_plaintext() {
        let record = AuditRecord::new(Some("c1".into()), "peer-1", &IngestResult::Success, b"raw envelope bytes");
        assert_eq!(record.envelope_sha256.len(), 64);
    }

    #[test]
    fn append_writes_one_json_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(&dir.path().join("audit.log"));
        log.append(&AuditRecord::new(None, "peer-1", &IngestResult::SteganographyDetected, b"x")).unwrap();
        log.append(&AuditRecord::new(None, "peer-1", &IngestResult::Success, b"y")).unwrap();
        let content = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
