//! Embedding generation
//!
//! The embedding model is an external, swappable capability behind the
//! [`Embedder`] trait. The built-in `hashing` model is deterministic and
//! fully local, so the store works without any network dependency.
//!
//! Consumers must treat embedding failure as retryable, not fatal: the
//! retrieval path degrades to recency-only results instead of raising.

mod cache;
mod queue;

pub use cache::{CachedEmbedder, EmbeddingCache, EmbeddingCacheStats};
pub use queue::{EmbeddingQueue, EmbeddingRequest, EmbeddingWorker};

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Map text to a fixed-length vector. Deterministic for identical
    /// input and model version.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Fixed dimensionality of this model
    fn dimensions(&self) -> usize;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier (currently only "hashing")
    pub model: String,
    /// Vector dimensionality, fixed per deployment
    pub dimensions: usize,
    /// Cache capacity in bytes
    pub cache_max_bytes: usize,
    /// Cache entry time-to-live in seconds
    pub cache_ttl_secs: u64,
    /// Batch size for the background worker
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "hashing".to_string(),
            dimensions: 384,
            cache_max_bytes: 32 * 1024 * 1024,
            cache_ttl_secs: 3600,
            batch_size: 16,
        }
    }
}

/// Create an embedder from configuration, wrapped in the content-hash cache
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.model.as_str() {
        "hashing" => Arc::new(HashingEmbedder::new(config.dimensions)),
        other => {
            return Err(MemoryError::validation(
                "embedding.model",
                format!("unknown embedding model '{}'", other),
            ))
        }
    };

    Ok(Arc::new(CachedEmbedder::new(
        inner,
        config.cache_max_bytes,
        std::time::Duration::from_secs(config.cache_ttl_secs),
    )))
}

/// Conversational filler that carries no recall signal. Chat transcripts
/// are dominated by these, so hashing them would mostly add bucket noise.
const STOPWORDS: &[&str] = &[
    "about", "after", "all", "and", "are", "at", "because", "but", "can",
    "could", "did", "do", "for", "from", "had", "has", "have", "her", "him",
    "his", "how", "into", "is", "it", "its", "just", "like", "me", "my",
    "not", "of", "on", "or", "our", "out", "she", "so", "some", "that",
    "the", "their", "them", "then", "there", "they", "this", "to", "too",
    "was", "we", "were", "what", "when", "who", "will", "with", "would",
    "you", "your",
];

/// Signed feature-hashing embedder over content words and their character
/// trigrams, L2 normalized.
///
/// Word buckets give exact-term recall; trigram buckets make it tolerant
/// of the typos and inflections chat transcripts are full of ("pizzeria"
/// still lands near "pizzaria"). Longer words contribute more trigrams,
/// which doubles as a rarity prior.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Lowercased alphanumeric tokens with conversational filler removed
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2 && !STOPWORDS.contains(t))
            .map(String::from)
            .collect()
    }

    /// One hash per feature feeds both the bucket index and the collision
    /// sign: low bit picks the sign, the rest picks the bucket.
    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
        (((h >> 1) as usize) % self.dimensions, sign)
    }

    fn add(&self, buckets: &mut [f32], feature: &str, weight: f32) {
        let (idx, sign) = self.bucket(feature);
        buckets[idx] += weight * sign;
    }
}

/// Trigram feature weight relative to the whole-word feature
const TRIGRAM_WEIGHT: f32 = 0.4;

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut buckets = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(buckets);
        }

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token).or_insert(0) += 1;
        }

        for (token, count) in counts {
            // A word said five times is not five times the memory cue
            let weight = (count as f32).sqrt();
            self.add(&mut buckets, token, weight);

            // Boundary-marked character trigrams
            let padded: Vec<char> = format!("^{}$", token).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add(&mut buckets, &gram, TRIGRAM_WEIGHT * weight);
            }
        }

        let norm: f32 = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut buckets {
                *x /= norm;
            }
        }

        Ok(buckets)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_stopwords_do_not_change_the_vector() {
        let embedder = HashingEmbedder::new(384);
        let bare = embedder.embed("watched rain plaza").unwrap();
        let chatty = embedder
            .embed("we watched the rain on the plaza for a while... it was this and that")
            .unwrap();

        // "while" is content; everything else added above is filler
        let with_while = embedder.embed("watched rain plaza while").unwrap();
        assert_ne!(bare, with_while);
        assert_eq!(chatty, with_while);
    }

    #[test]
    fn test_typo_tolerance_via_trigrams() {
        let embedder = HashingEmbedder::new(384);
        let canonical = embedder.embed("pizzeria").unwrap();
        let typo = embedder.embed("pizzaria").unwrap();
        let unrelated = embedder.embed("rainstorm").unwrap();

        let sim_typo = cosine_similarity(&canonical, &typo);
        let sim_other = cosine_similarity(&canonical, &unrelated);
        assert!(
            sim_typo > sim_other + 0.2,
            "typo variant should stay close: {} vs {}",
            sim_typo,
            sim_other
        );
    }

    #[test]
    fn test_repetition_does_not_steer_the_direction() {
        let embedder = HashingEmbedder::new(384);
        let once = embedder.embed("pizza").unwrap();
        let thrice = embedder.embed("pizza pizza pizza").unwrap();
        assert!(cosine_similarity(&once, &thrice) > 0.999);
    }

    #[test]
    fn test_topical_overlap_beats_no_overlap() {
        let embedder = HashingEmbedder::new(384);
        let e1 = embedder
            .embed("ren loved the margherita pizza at the festival")
            .unwrap();
        let e2 = embedder.embed("which pizza did ren enjoy").unwrap();
        let e3 = embedder.embed("quantum physics homework due tomorrow").unwrap();

        assert!(cosine_similarity(&e1, &e2) > cosine_similarity(&e1, &e3));
    }

    #[test]
    fn test_blank_and_filler_only_input_embeds_to_zero() {
        let embedder = HashingEmbedder::new(384);
        for text in ["", "   ", "the and of it"] {
            let e = embedder.embed(text).unwrap();
            assert_eq!(e.len(), 384);
            assert!(e.iter().all(|&x| x == 0.0), "text {:?}", text);
        }
    }

    #[test]
    fn test_embedding_is_unit_length_and_deterministic() {
        let embedder = HashingEmbedder::new(384);
        let e1 = embedder.embed("stargazing on the rooftop after sunset").unwrap();
        let e2 = embedder.embed("stargazing on the rooftop after sunset").unwrap();
        assert_eq!(e1, e2);

        let norm: f32 = e1.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_create_embedder_rejects_unknown_model() {
        let config = EmbeddingConfig {
            model: "clippy-large-v9".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
