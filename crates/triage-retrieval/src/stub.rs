//! Deterministic hash-based embedding provider for tests and local runs.
//!
//! Each whitespace-separated token maps to a fixed pseudo-random unit
//! vector; a text embeds to the normalized sum of its token vectors. Texts
//! sharing tokens therefore score high cosine similarity and identical
//! texts embed identically, which is what retrieval and duplicate-detection
//! tests need from a stand-in embedder.
use async_trait::async_trait;

use triage_core::traits::{CollaboratorError, EmbeddingProvider};

const DEFAULT_DIMENSION: usize = 64;

#[derive(Debug, Clone)]
pub struct StubEmbedding {
    dimension: usize,
}

impl Default for StubEmbedding {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl StubEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        // FNV-1a seed, then a splitmix-style sequence per component
        let mut seed = 0xcbf2_9ce4_8422_2325u64;
        for byte in token.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut out = Vec::with_capacity(self.dimension);
        let mut x = seed;
        for _ in 0..self.dimension {
            x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = x;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            // map to [-1, 1]
            out.push((z as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32);
        }
        out
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let mut sum = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lowered = token.to_lowercase();
            for (acc, v) in sum.iter_mut().zip(self.token_vector(&lowered)) {
                *acc += v;
            }
            tokens += 1;
        }
        if tokens == 0 {
            return Ok(sum);
        }
        let norm = sum.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut sum {
                *v = (f64::from(*v) / norm) as f32;
            }
        }
        Ok(sum)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
