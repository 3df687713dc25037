//! Deterministic feature-hashing embedder.
//!
//! Buckets lowercased word and bigram features into a fixed-dimension vector
//! via FNV-1a, then L2-normalizes. No model files, no warm-up; identical
//! input always produces the identical vector, which makes it suitable for
//! tests, `engram doctor`, and environments without a model runtime.
//! Semantic quality is far below a real sentence transformer.

use crate::error::Result;

use super::Embedder;

pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let h = fnv1a(feature.as_bytes());
        let index = (h % self.dim as u64) as usize;
        // One hash bit decides the sign so buckets cancel rather than pile up.
        let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];

        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }
        for pair in tokens.windows(2) {
            let (index, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[index] += sign * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn is_loading(&self) -> bool {
        false
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
