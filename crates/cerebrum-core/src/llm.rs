//! External LLM/embedding adapter seam (§6). The core never implements
//! an LLM itself; `LlmAdapter` is the trait-bounded boundary an
//! external collaborator (or a test mock) satisfies, invoked
//! synchronously from a dedicated worker with a bounded timeout.

use crate::capsule::EMBEDDING_DIM;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InferenceParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm adapter error: {0}")]
    Backend(String),
}

/// Synchronous external collaborator boundary: `infer` and `embed` are
/// called from a dedicated worker thread, never from the pipeline
/// thread directly, so a slow or hanging adapter can't stall C1–C9.
pub trait LlmAdapter: Send + Sync {
    fn infer(&self, prompt: &str, params: &InferenceParams) -> Result<String, LlmError>;

    /// Returns an embedding of length ≤ 128; callers L2-normalize the
    /// result before use (the adapter is not required to).
    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(20)
    }
}

/// Deterministic mock used in tests and as a conservative fallback: it
/// never actually calls an external model, only derives reproducible
/// output from its input so assertions are stable.
pub struct MockLlmAdapter;

impl LlmAdapter for MockLlmAdapter {
    fn infer(&self, prompt: &str, _params: &InferenceParams) -> Result<String, LlmError> {
        Ok(format!("[mock response to: {}]", prompt.chars().take(80).collect::<String>()))
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        for (i, byte) in text.bytes().enumerate() {
            embedding[i % EMBEDDING_DIM] += byte as f32 / 255.0;
        }
        crate::capsule::l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embed_returns_normalized_vector_of_correct_length() {
        let adapter = MockLlmAdapter;
        let embedding = adapter.embed("hello world").unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn mock_infer_is_deterministic() {
        let adapter = MockLlmAdapter;
        let a = adapter.infer("ping", &InferenceParams::default()).unwrap();
        let b = adapter.infer("ping", &InferenceParams::default()).unwrap();
        assert_eq!(a, b);
    }
}
