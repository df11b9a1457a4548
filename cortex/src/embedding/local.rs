//! Deterministic local embedder.
//!
//! This model hashes token and character-trigram features into a fixed
//! 384-bucket vector: each feature lands in a bucket chosen by the leading
//! bytes of its SHA-256 digest, with a digest-derived sign so unrelated
//! features cancel rather than accumulate. Counts are log-scaled and the
//! result is unit-normalised.
//!
//! The model is purely arithmetic over the input bytes: the same text
//! always produces the same vector, there is no model file to load, and
//! cost is linear in the input length, which keeps it cheap enough to run
//! synchronously in the store path.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::{EMBEDDING_DIM, EmbedError, Embedder, normalize_in_place};

/// Weight of whole-token features relative to trigram features.
const TOKEN_WEIGHT: f32 = 1.0;
/// Trigrams smooth over inflection and typos but should not dominate.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic hashed-feature embedder.
#[derive(Clone, Debug, Default)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn accumulate(buckets: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let index = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
            % EMBEDDING_DIM;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        buckets[index] += sign * weight;
    }
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let lowered = text.to_lowercase();

        let mut token_counts: HashMap<&str, u32> = HashMap::new();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            *token_counts.entry(token).or_insert(0) += 1;
        }

        if token_counts.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let mut buckets = vec![0.0f32; EMBEDDING_DIM];

        for (token, count) in &token_counts {
            let weight = TOKEN_WEIGHT * (1.0 + (*count as f32).ln());
            Self::accumulate(&mut buckets, token.as_bytes(), weight);

            let chars: Vec<char> = token.chars().collect();
            if chars.len() >= 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    Self::accumulate(&mut buckets, trigram.as_bytes(), TRIGRAM_WEIGHT);
                }
            }
        }

        if !normalize_in_place(&mut buckets) {
            // Signed buckets cancelling to an exact zero vector is not a
            // caller error; treat it like an unembeddable input.
            return Err(EmbedError::EmptyInput);
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn same_input_same_vector() {
        let embedder = LocalEmbedder::new();
        let a = embedder.embed("Redis uses skip lists for sorted sets").expect("embed");
        let b = embedder.embed("Redis uses skip lists for sorted sets").expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[test]
    fn output_is_unit_normalised() {
        let embedder = LocalEmbedder::new();
        let v = embedder.embed("ownership and borrowing").expect("embed");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[test]
    fn related_texts_score_higher_than_unrelated() {
        let embedder = LocalEmbedder::new();
        let base = embedder
            .embed("rust ownership borrowing memory safety")
            .expect("embed");
        let related = embedder
            .embed("memory safety through ownership in rust")
            .expect("embed");
        let unrelated = embedder
            .embed("croissants pair well with espresso")
            .expect("embed");

        assert!(
            cosine(&base, &related) > cosine(&base, &unrelated),
            "related {} <= unrelated {}",
            cosine(&base, &related),
            cosine(&base, &unrelated)
        );
    }

    #[test]
    fn case_is_folded() {
        let embedder = LocalEmbedder::new();
        let a = embedder.embed("Skip Lists").expect("embed");
        let b = embedder.embed("skip lists").expect("embed");
        assert_eq!(a, b);
    }

    #[test]
    fn whitespace_only_input_is_rejected() {
        let embedder = LocalEmbedder::new();
        assert!(matches!(
            embedder.embed("   \t\n"),
            Err(EmbedError::EmptyInput)
        ));
    }
}
