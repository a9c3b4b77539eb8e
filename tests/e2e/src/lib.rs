//! Shared fixtures for cross-crate journey tests: building signed
//! capsule envelopes and a small deterministic signal generator, so
//! each journey test exercises the orchestrator the way an external
//! signal source / capsule producer actually would.

use aes_gcm::aead::{Aead, KeyInit, OsRng as AesOsRng, RngCore};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use cerebrum_core::capsule::{CapsuleEnvelope, EMBEDDING_DIM};
use cerebrum_core::signals::{AtomicSignal, KeyClass, KeyEventType, Sensor, SignalPayload};
use ed25519_dalek::{Signer, SigningKey};

/// A freshly generated peer keypair plus the envelope-building helper
/// bound to it, standing in for the external pairing protocol (§9).
pub struct TestPeer {
    pub sender_id: String,
    pub signing_key: SigningKey,
    pub aes_key: [u8; 32],
}

impl TestPeer {
    pub fn new(sender_id: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            signing_key: SigningKey::generate(&mut rand_core::OsRng),
            aes_key: [11u8; 32],
        }
    }

    /// Builds a signed, encrypted envelope for `content` under this
    /// peer's keys, ready for `cerebrum_core::ingest::ingest`.
    pub fn build_envelope(&self, id: &str, topic: &str, content: &str, confidence: f32) -> String {
        let mut nonce_bytes = [0u8; 12];
        AesOsRng.fill_bytes(&mut nonce_bytes);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.aes_key));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, content.as_bytes()).expect("encrypt");
        let encrypted_b64 = base64::engine::general_purpose::STANDARD.encode(&ciphertext);
        let iv_b64 = base64::engine::general_purpose::STANDARD.encode(nonce_bytes);
        let signature = self.signing_key.sign(encrypted_b64.as_bytes());
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        embedding[topic.len() % EMBEDDING_DIM] = 1.0;

        let envelope = CapsuleEnvelope {
            id: id.to_string(),
            topic: topic.to_string(),
            source: self.sender_id.clone(),
            plain_text_summary: content.chars().take(80).collect(),
            confidence,
            timestamp_utc: chrono::Utc::now(),
            embedding,
            cryptofig_blob_base64: String::new(),
            encrypted_content_base64: encrypted_b64,
            encryption_iv_base64: iv_b64,
            signature_base64: sig_b64,
        };
        serde_json::to_string(&envelope).expect("serialize envelope")
    }
}

/// A short burst of plausible keyboard signals, enough to trip C1's
/// rebuild trigger and give C2 a non-trivial feature vector to encode.
pub fn typing_burst(start_us: u64, count: usize, app_fingerprint: u16) -> Vec<AtomicSignal> {
    (0..count)
        .map(|i| AtomicSignal {
            timestamp_us: start_us + (i as u64) * 120_000,
            sensor: Sensor::Keyboard,
            payload: SignalPayload::Keyboard {
                key_class: KeyClass::Alphanumeric,
                event: KeyEventType::Down,
                is_alphanumeric: true,
            },
            app_fingerprint,
        })
        .collect()
}
