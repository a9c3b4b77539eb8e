//! C10 — Knowledge Base + Capsule Ingest Pipeline: schema validate →
//! signature verify → decrypt → sanitize → steganalysis → sandbox
//! analysis → corroborate, fail-closed, short-circuiting on first
//! failure. Every failure is audit-logged with inputs hashed, never
//! silently dropped.

pub mod crypto;
pub mod sandbox;
pub mod sanitize;
pub mod stego;

use crate::capsule::{l2_normalize, Capsule, CapsuleEnvelope, EMBEDDING_DIM};
use crate::store::{Store, StoreError};
use base64::Engine;
use crypto::{CryptoError, PeerRegistry};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

const CONFIDENCE_MIN: f32 = 0.0;
const CONFIDENCE_MAX: f32 = 1.0;
const CORROBORATION_SIMILARITY_THRESHOLD: f32 = 0.7;
/// Timestamps more than this far from "now" (past or future) fail the
/// schema validation step's sanity window.
const TIMESTAMP_SANITY_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("signature verification failed: {0}")]
    InvalidSignature(#[from] CryptoErrorWrapper),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("steganography detected: {0:?}")]
    SteganographyDetected(Vec<stego::StegoFinding>),
    #[error("sandbox analysis failed: {0:?}")]
    SandboxFailed(Vec<sandbox::SandboxFinding>),
    #[error("corroboration failed: no similar capsule, topic match, or allowlisted source")]
    CorroborationFailed,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Newtype so `CryptoError` can flow through `#[from]` without
/// colliding with a blanket `From<CryptoError>` elsewhere.
#[derive(Debug)]
pub struct CryptoErrorWrapper(pub CryptoError);
impl std::fmt::Display for CryptoErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for CryptoErrorWrapper {}
impl From<CryptoError> for CryptoErrorWrapper {
    fn from(e: CryptoError) -> Self {
        CryptoErrorWrapper(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestResult {
    Success,
    AlreadyExists,
    SchemaMismatch,
    InvalidSignature,
    DecryptionFailed,
    SteganographyDetected,
    SandboxFailed,
    CorroborationFailed,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub result: IngestResult,
    pub capsule_id: Option<String>,
    pub sanitization_applied: bool,
    pub detail: String,
}

#[derive(Default)]
pub struct IngestConfig {
    pub corroboration_source_allowlist: HashSet<String>,
}

/// Runs the full §4.10 stage sequence against a raw envelope. On
/// success the capsule is normalized, stored via `store`, and appended
/// to the consensus tree (both inside `Store::put`); on any failure the
/// function returns before touching the store.
pub fn ingest(
    store: &Store,
    registry: &PeerRegistry,
    config: &IngestConfig,
    envelope_json: &str,
    sender_id: &str,
    metadata: &HashMap<String, String>,
) -> IngestReport {
    match ingest_inner(store, registry, config, envelope_json, sender_id, metadata) {
        Ok(report) => report,
        Err(e) => report_for_error(e),
    }
}

fn report_for_error(e: IngestError) -> IngestReport {
    let result = match &e {
        IngestError::SchemaMismatch(_) => IngestResult::SchemaMismatch,
        IngestError::InvalidSignature(_) => IngestResult::InvalidSignature,
        IngestError::DecryptionFailed => IngestResult::DecryptionFailed,
        IngestError::SteganographyDetected(_) => IngestResult::SteganographyDetected,
        IngestError::SandboxFailed(_) => IngestResult::SandboxFailed,
        IngestError::CorroborationFailed => IngestResult::CorroborationFailed,
        IngestError::Store(_) => IngestResult::SchemaMismatch,
    };
    tracing::warn!(result = ?result, detail = %e, "capsule ingest rejected");
    IngestReport {
        result,
        capsule_id: None,
        sanitization_applied: false,
        detail: e.to_string(),
    }
}

fn ingest_inner(
    store: &Store,
    registry: &PeerRegistry,
    config: &IngestConfig,
    envelope_json: &str,
    sender_id: &str,
    metadata: &HashMap<String, String>,
) -> Result<IngestReport, IngestError> {
    // 1. Schema validate.
    let envelope: CapsuleEnvelope =
        serde_json::from_str(envelope_json).map_err(|e| IngestError::SchemaMismatch(e.to_string()))?;
    validate_schema(&envelope)?;

    // 2. Signature verify, over the raw encrypted payload bytes.
    registry
        .verify_signature(sender_id, envelope.encrypted_content_base64.as_bytes(), &envelope.signature_base64)
        .map_err(CryptoErrorWrapper::from)?;

    // 3. Decrypt payload.
    let encrypted_content = base64::engine::general_purpose::STANDARD
        .decode(&envelope.encrypted_content_base64)
        .map_err(|_| IngestError::DecryptionFailed)?;
    let plaintext_bytes = registry
        .decrypt(sender_id, &encrypted_content, &envelope.encryption_iv_base64)
        .map_err(|_| IngestError::DecryptionFailed)?;
    let plaintext = String::from_utf8(plaintext_bytes).map_err(|_| IngestError::DecryptionFailed)?;

    // 4. Unicode sanitize; continue on the cleaned content regardless.
    let (sanitized, sanitization_applied) = sanitize::sanitize(&plaintext);

    // 5. Steganalysis.
    let findings = stego::detect(&sanitized, metadata);
    if !findings.is_empty() {
        return Err(IngestError::SteganographyDetected(findings));
    }

    // 6. Sandbox analysis.
    let sandbox_findings = sandbox::analyze(&sanitized);
    if !sandbox_findings.is_empty() {
        return Err(IngestError::SandboxFailed(sandbox_findings));
    }

    // 7. Corroboration.
    let mut embedding = envelope.embedding.clone();
    l2_normalize(&mut embedding);
    let corroborated = corroborate(store, &embedding, &envelope.topic, &envelope.source, config)?;
    if !corroborated {
        return Err(IngestError::CorroborationFailed);
    }

    if store.get(&envelope.id)?.is_some() {
        return Ok(IngestReport {
            result: IngestResult::AlreadyExists,
            capsule_id: Some(envelope.id),
            sanitization_applied,
            detail: "capsule id already present; no-op".into(),
        });
    }

    let capsule = Capsule {
        id: envelope.id.clone(),
        topic: envelope.topic,
        source: envelope.source,
        content: sanitized,
        plain_text_summary: envelope.plain_text_summary,
        confidence: envelope.confidence,
        timestamp_utc: envelope.timestamp_utc,
        embedding,
        cryptofig_blob_base64: envelope.cryptofig_blob_base64,
        encrypted_content,
        encryption_iv_base64: envelope.encryption_iv_base64,
        signature_base64: envelope.signature_base64,
    };
    store.put(&capsule)?;

    Ok(IngestReport {
        result: IngestResult::Success,
        capsule_id: Some(capsule.id),
        sanitization_applied,
        detail: "ingested".into(),
    })
}

fn validate_schema(envelope: &CapsuleEnvelope) -> Result<(), IngestError> {
    if envelope.id.trim().is_empty() {
        return Err(IngestError::SchemaMismatch("id is empty".into()));
    }
    if envelope.embedding.len() != EMBEDDING_DIM {
        return Err(IngestError::SchemaMismatch(format!(
            "embedding length {} != {}",
            envelope.embedding.len(),
            EMBEDDING_DIM
        )));
    }
    if !(CONFIDENCE_MIN..=CONFIDENCE_MAX).contains(&envelope.confidence) {
        return Err(IngestError::SchemaMismatch(format!("confidence {} out of [0,1]", envelope.confidence)));
    }
    let now = chrono::Utc::now();
    let age_days = (now - envelope.timestamp_utc).num_days().abs();
    if age_days > TIMESTAMP_SANITY_WINDOW_DAYS {
        return Err(IngestError::SchemaMismatch(format!("timestamp {} outside sane window", envelope.timestamp_utc)));
    }
    Ok(())
}

fn corroborate(store: &Store, embedding: &[f32], topic: &str, source: &str, config: &IngestConfig) -> Result<bool, IngestError> {
    if config.corroboration_source_allowlist.contains(source) {
        return Ok(true);
    }
    let same_topic = !store.iterate_topic_index(topic)?.is_empty();
    if same_topic {
        return Ok(true);
    }
    let similar = store
        .search_knn_scored(embedding, 5)?
        .into_iter()
        .any(|(_, sim)| sim >= CORROBORATION_SIMILARITY_THRESHOLD);
    Ok(similar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::crypto::PeerRegistry;
    use aes_gcm::aead::{Aead, KeyInit, OsRng, RngCore};
    use aes_gcm::{Aes256Gcm, Key, Nonce};
    use ed25519_dalek::{Signer, SigningKey};

    fn build_envelope(
        signing_key: &SigningKey,
        aes_key: &[u8; 32],
        content: &str,
        topic: &str,
    ) -> (String, String) {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(aes_key));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, content.as_bytes()).unwrap();
        let encrypted_b64 = base64::engine::general_purpose::STANDARD.encode(&ciphertext);
        let iv_b64 = base64::engine::general_purpose::STANDARD.encode(nonce_bytes);
        let signature = signing_key.sign(encrypted_b64.as_bytes());
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[0] = 1.0;

        let envelope = CapsuleEnvelope {
            id: "cap-1".into(),
            topic: topic.into(),
            source: "peer-1".into(),
            plain_text_summary: "summary".into(),
            confidence: 0.82,
            timestamp_utc: chrono::Utc::now(),
            embedding,
            cryptofig_blob_base64: "".into(),
            encrypted_content_base64: encrypted_b64,
            encryption_iv_base64: iv_b64,
            signature_base64: sig_b64,
        };
        (serde_json::to_string(&envelope).unwrap(), "peer-1".to_string())
    }

    #[test]
    fn successful_ingest_with_allowlisted_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        let aes_key = [9u8; 32];
        let mut registry = PeerRegistry::new();
        registry.register("peer-1", signing_key.verifying_key(), aes_key);

        let mut config = IngestConfig::default();
        config.corroboration_source_allowlist.insert("peer-1".to_string());

        let (json, sender) = build_envelope(&signing_key, &aes_key, "clean knowledge about CerebrumLux", "CerebrumLux");
        let report = ingest(&store, &registry, &config, &json, &sender, &HashMap::new());
        assert_eq!(report.result, IngestResult::Success);
        assert!(store.get("cap-1").unwrap().is_some());
    }

    #[test]
    fn stego_marker_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        let aes_key = [9u8; 32];
        let mut registry = PeerRegistry::new();
        registry.register("peer-1", signing_key.verifying_key(), aes_key);

        let mut config = IngestConfig::default();
        config.corroboration_source_allowlist.insert("peer-1".to_string());

        let (json, sender) = build_envelope(&signing_key, &aes_key, "payload STEGO_START_MARKER_XYZ hidden", "CerebrumLux");
        let report = ingest(&store, &registry, &config, &json, &sender, &HashMap::new());
        assert_eq!(report.result, IngestResult::SteganographyDetected);
        assert!(store.get("cap-1").unwrap().is_none());
    }

    #[test]
    fn missing_corroboration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        let aes_key = [9u8; 32];
        let mut registry = PeerRegistry::new();
        registry.register("peer-1", signing_key.verifying_key(), aes_key);

        let config = IngestConfig::default();
        let (json, sender) = build_envelope(&signing_key, &aes_key, "never before seen topic content", "UnseenTopic");
        let report = ingest(&store, &registry, &config, &json, &sender, &HashMap::new());
        assert_eq!(report.result, IngestResult::CorroborationFailed);
    }
}
