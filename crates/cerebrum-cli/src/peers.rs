//! Peer key file loader. `cerebrum-core::ingest::crypto::PeerRegistry` is
//! populated programmatically by design (pairing is an external
//! collaborator's concern, §9); this CLI-level convenience reads that
//! registry's contents from a `peers.json` file under the store
//! directory so `cerebrum ingest-file` and `cerebrum run` don't need a
//! live pairing session to exercise C10 end to end.

use cerebrum_core::ingest::crypto::PeerRegistry;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct PeerFileEntry {
    verifying_key_base64: String,
    symmetric_key_base64: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PeerFileError {
    #[error("io error reading {0}: {1}")]
    Io(std::path::PathBuf, std::io::Error),
    #[error("malformed peers file: {0}")]
    Malformed(String),
}

pub struct PeerEntry {
    pub sender_id: String,
    pub verifying_key: VerifyingKey,
    pub symmetric_key: [u8; 32],
}

/// Loads `<store_dir>/peers.json`. A missing file is not an error: it
/// yields an empty list, matching the "no peers paired yet" state a
/// fresh install starts in (pairing is an external collaborator's
/// concern, §9 — this file is the CLI's stand-in for that protocol).
pub fn load_peer_entries(store_dir: &Path) -> Result<Vec<PeerEntry>, PeerFileError> {
    let path = store_dir.join("peers.json");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| PeerFileError::Io(path.clone(), e))?;
    let entries: std::collections::HashMap<String, PeerFileEntry> =
        serde_json::from_str(&raw).map_err(|e| PeerFileError::Malformed(e.to_string()))?;

    let mut out = Vec::with_capacity(entries.len());
    for (sender_id, entry) in entries {
        let verifying_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &entry.verifying_key_base64)
            .map_err(|e| PeerFileError::Malformed(format!("{sender_id}: {e}")))?;
        let verifying_array: [u8; 32] = verifying_bytes
            .as_slice()
            .try_into()
            .map_err(|_| PeerFileError::Malformed(format!("{sender_id}: verifying key must be 32 bytes")))?;
        let verifying_key = VerifyingKey::from_bytes(&verifying_array)
            .map_err(|e| PeerFileError::Malformed(format!("{sender_id}: {e}")))?;

        let symmetric_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &entry.symmetric_key_base64)
            .map_err(|e| PeerFileError::Malformed(format!("{sender_id}: {e}")))?;
        let symmetric_key: [u8; 32] = symmetric_bytes
            .as_slice()
            .try_into()
            .map_err(|_| PeerFileError::Malformed(format!("{sender_id}: symmetric key must be 32 bytes")))?;

        out.push(PeerEntry { sender_id, verifying_key, symmetric_key });
    }

    Ok(out)
}

/// Builds an ad hoc `PeerRegistry` from the loaded entries, for
/// one-shot CLI commands (`ingest-file`) that don't go through an
/// `Orchestrator`.
pub fn build_registry(entries: &[PeerEntry]) -> PeerRegistry {
    let mut registry = PeerRegistry::new();
    for entry in entries {
        registry.register(entry.sender_id.clone(), entry.verifying_key.to_owned(), entry.symmetric_key);
    }
    registry
}
