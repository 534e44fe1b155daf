//! Cosine-distance matching of two embeddings against a fixed threshold.

use crate::types::{Comparison, Embedding, Verdict};
use thiserror::Error;

/// Cosine distance at or below which two faces are the same person.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero vector on
    /// either side has similarity 0.
    pub fn similarity(&self, other: &Embedding) -> Result<f32, MatchError> {
        if self.len() != other.len() {
            return Err(MatchError::DimensionMismatch {
                left: self.len(),
                right: other.len(),
            });
        }

        // f64 accumulation: squared norms of any f32 vector neither overflow nor underflow
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        // sqrt of the product keeps a·a / |a||a| exactly 1.0
        let denom = (norm_a * norm_b).sqrt();
        Ok(if denom > 0.0 { (dot / denom).clamp(-1.0, 1.0) as f32 } else { 0.0 })
    }

    /// Cosine distance `1 - similarity`, in [0, 2]. Lower = more similar.
    pub fn cosine_distance(&self, other: &Embedding) -> Result<f32, MatchError> {
        Ok(1.0 - self.similarity(other)?)
    }
}

/// Strategy for deciding whether two embeddings belong to the same person.
pub trait Matcher {
    fn compare(&self, a: &Embedding, b: &Embedding) -> Result<Comparison, MatchError>;
}

/// Cosine distance matcher with an inclusive threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineMatcher {
    pub threshold: f32,
}

impl CosineMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher for CosineMatcher {
    fn compare(&self, a: &Embedding, b: &Embedding) -> Result<Comparison, MatchError> {
        let distance = a.cosine_distance(b)?;
        let verdict = if distance <= self.threshold {
            Verdict::SamePerson
        } else {
            Verdict::DifferentPersons
        };

        Ok(Comparison {
            verdict,
            distance,
            threshold: self.threshold,
        })
    }
}
