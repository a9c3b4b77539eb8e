//! Capsule — the durable unit of knowledge stored by C11 and produced
//! by the C10 ingest pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EMBEDDING_DIM: usize = 128;
const NORM_TOLERANCE: f32 = 1e-5;

/// Wire-format capsule as received over the ingest boundary, before
/// decryption/sanitization. `#[serde(deny_unknown_fields)]` rejects
/// envelopes carrying fields this schema doesn't know about, hardening
/// the thin schema-validation stage the original left ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapsuleEnvelope {
    pub id: String,
    pub topic: String,
    pub source: String,
    pub plain_text_summary: String,
    pub confidence: f32,
    pub timestamp_utc: DateTime<Utc>,
    pub embedding: Vec<f32>,
    pub cryptofig_blob_base64: String,
    pub encrypted_content_base64: String,
    pub encryption_iv_base64: String,
    pub signature_base64: String,
}

/// Normalized, decrypted capsule as stored in the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capsule {
    pub id: String,
    pub topic: String,
    pub source: String,
    pub content: String,
    pub plain_text_summary: String,
    pub confidence: f32,
    pub timestamp_utc: DateTime<Utc>,
    pub embedding: Vec<f32>,
    pub cryptofig_blob_base64: String,
    pub encrypted_content: Vec<u8>,
    pub encryption_iv_base64: String,
    pub signature_base64: String,
}

impl Capsule {
    /// `‖embedding‖₂` must equal 1 within `NORM_TOLERANCE`.
    pub fn embedding_is_normalized(&self) -> bool {
        let norm: f32 = self.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() <= NORM_TOLERANCE
    }
}

/// L2-normalizes in place; idempotent by construction (normalizing an
/// already-unit vector is a no-op up to floating-point error).
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_is_idempotent() {
        let mut v = vec![3.0, 4.0, 0.0];
        l2_normalize(&mut v);
        let once = v.clone();
        l2_normalize(&mut v);
        assert_eq!(once, v);
    }

    #[test]
    fn cosine_similarity_of_identical_unit_vectors_is_one() {
        let mut v = vec![1.0, 2.0, 3.0];
        l2_normalize(&mut v);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
