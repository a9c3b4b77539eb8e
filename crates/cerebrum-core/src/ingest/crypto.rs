//! Signature verification and payload decryption for capsule ingest
//! (§4.10 steps 2–3). Real RustCrypto primitives substitute for the
//! original's "Ed25519-like" description: `ed25519-dalek` for
//! signatures, AES-256-GCM (`aes-gcm`) for the per-peer symmetric
//! payload encryption.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unknown sender id: {0}")]
    UnknownSender(String),
    #[error("signature is malformed")]
    MalformedSignature,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("payload is malformed base64 or has a bad IV length")]
    MalformedPayload,
    #[error("AEAD authentication failed during decrypt")]
    DecryptionFailed,
}

pub struct PeerKeys {
    pub verifying_key: VerifyingKey,
    pub symmetric_key: [u8; 32],
}

/// Registry of known senders' Ed25519 public keys and per-peer AES-256
/// symmetric keys. In production this is populated from a pairing
/// protocol external to this crate; callers register keys up front.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerKeys>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sender_id: impl Into<String>, verifying_key: VerifyingKey, symmetric_key: [u8; 32]) {
        self.peers.insert(
            sender_id.into(),
            PeerKeys {
                verifying_key,
                symmetric_key,
            },
        );
    }

    fn get(&self, sender_id: &str) -> Result<&PeerKeys, CryptoError> {
        self.peers.get(sender_id).ok_or_else(|| CryptoError::UnknownSender(sender_id.to_string()))
    }

    /// Verifies `signature_b64` over `payload` under `sender_id`'s
    /// registered public key.
    pub fn verify_signature(&self, sender_id: &str, payload: &[u8], signature_b64: &str) -> Result<(), CryptoError> {
        let peer = self.get(sender_id)?;
        let sig_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, signature_b64)
            .map_err(|_| CryptoError::MalformedSignature)?;
        let sig_array: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| CryptoError::MalformedSignature)?;
        let signature = Signature::from_bytes(&sig_array);
        peer.verifying_key
            .verify(payload, &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// AES-256-GCM decrypt with the per-peer symmetric key and the
    /// capsule's IV; authentication-tag failure maps to
    /// `CryptoError::DecryptionFailed`.
    pub fn decrypt(&self, sender_id: &str, encrypted_content: &[u8], iv_b64: &str) -> Result<Vec<u8>, CryptoError> {
        let peer = self.get(sender_id)?;
        let iv = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, iv_b64).map_err(|_| CryptoError::MalformedPayload)?;
        if iv.len() != 12 {
            return Err(CryptoError::MalformedPayload);
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&peer.symmetric_key));
        let nonce = Nonce::from_slice(&iv);
        cipher.decrypt(nonce, encrypted_content).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::OsRng;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn valid_signature_verifies() {
        let mut registry = PeerRegistry::new();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        registry.register("peer-1", signing_key.verifying_key(), [7u8; 32]);

        let payload = b"capsule payload bytes";
        let signature = signing_key.sign(payload);
        let sig_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, signature.to_bytes());

        assert!(registry.verify_signature("peer-1", payload, &sig_b64).is_ok());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut registry = PeerRegistry::new();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        registry.register("peer-1", signing_key.verifying_key(), [7u8; 32]);

        let signature = signing_key.sign(b"original");
        let sig_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, signature.to_bytes());

        assert!(registry.verify_signature("peer-1", b"tampered", &sig_b64).is_err());
    }

    #[test]
    fn decrypt_round_trips() {
        let mut registry = PeerRegistry::new();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        let key_bytes = [42u8; 32];
        registry.register("peer-1", signing_key.verifying_key(), key_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let nonce_bytes: [u8; 12] = {
            use aes_gcm::aead::rand_core::RngCore;
            let mut n = [0u8; 12];
            OsRng.fill_bytes(&mut n);
            n
        };
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, b"hello capsule".as_ref()).unwrap();
        let iv_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, nonce_bytes);

        let plaintext = registry.decrypt("peer-1", &ciphertext, &iv_b64).unwrap();
        assert_eq!(plaintext, b"hello capsule");
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let mut registry = PeerRegistry::new();
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        registry.register("peer-1", signing_key.verifying_key(), [1u8; 32]);
        registry.register("peer-2", signing_key.verifying_key(), [2u8; 32]);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&[1u8; 32]));
        let nonce = Nonce::from_slice(&[0u8; 12]);
        let ciphertext = cipher.encrypt(nonce, b"secret".as_ref()).unwrap();
        let iv_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0u8; 12]);

        assert!(registry.decrypt("peer-2", &ciphertext, &iv_b64).is_err());
    }
}
