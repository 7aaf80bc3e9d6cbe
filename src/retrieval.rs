//! Retrieval ranking
//!
//! Two-stage design: the store returns a candidate superset by raw
//! similarity, then the ranker re-scores in process with a composite of
//! similarity, recency and importance. The similarity metric alone
//! ignores the latter two, which matter for conversational relevance;
//! re-ranking here keeps the store free of compound scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::types::{MemoryRecord, RetrievalBasis, RetrievedMemory};

/// Ranking configuration. The three weights must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Weight for cosine similarity
    pub semantic_weight: f32,
    /// Weight for the recency factor
    pub temporal_weight: f32,
    /// Weight for stored importance
    pub importance_weight: f32,
    /// Half-life of the recency factor, in seconds
    pub recency_half_life_secs: f32,
    /// Candidate superset size as a multiple of the requested limit
    pub candidate_multiplier: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.5,
            temporal_weight: 0.2,
            importance_weight: 0.3,
            recency_half_life_secs: 7.0 * 24.0 * 3600.0,
            candidate_multiplier: 3,
        }
    }
}

impl RankerConfig {
    pub fn validate(&self) -> Result<()> {
        let sum = self.semantic_weight + self.temporal_weight + self.importance_weight;
        if (sum - 1.0).abs() > 1e-3 {
            return Err(MemoryError::validation(
                "ranking weights",
                format!("must sum to 1.0, got {}", sum),
            ));
        }
        if self.semantic_weight < 0.0 || self.temporal_weight < 0.0 || self.importance_weight < 0.0
        {
            return Err(MemoryError::validation(
                "ranking weights",
                "must be non-negative",
            ));
        }
        if self.recency_half_life_secs <= 0.0 {
            return Err(MemoryError::validation(
                "recency_half_life_secs",
                "must be positive",
            ));
        }
        if self.candidate_multiplier == 0 {
            return Err(MemoryError::validation(
                "candidate_multiplier",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// How many candidates to pull from the store for a given limit
    pub fn candidate_limit(&self, limit: usize) -> usize {
        limit.saturating_mul(self.candidate_multiplier).max(limit)
    }
}

/// Composite re-ranker
pub struct RetrievalRanker {
    config: RankerConfig,
}

impl RetrievalRanker {
    pub fn new(config: RankerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Recency factor: exponential decay with the configured half-life,
    /// monotonically decreasing with age, 1.0 at zero age.
    pub fn recency_factor(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let age_secs = (now - created_at).num_milliseconds() as f32 / 1000.0;
        if age_secs <= 0.0 {
            return 1.0;
        }
        0.5_f32.powf(age_secs / self.config.recency_half_life_secs)
    }

    /// Composite score for one candidate
    pub fn composite(&self, similarity: f32, record: &MemoryRecord, now: DateTime<Utc>) -> f32 {
        self.config.semantic_weight * similarity
            + self.config.temporal_weight * self.recency_factor(record.created_at, now)
            + self.config.importance_weight * record.importance
    }

    /// Re-rank a candidate superset and truncate to `limit`.
    /// Sort is descending by composite score, ties broken by newer
    /// `created_at`.
    pub fn rank(
        &self,
        candidates: Vec<(MemoryRecord, f32)>,
        limit: usize,
    ) -> Vec<RetrievedMemory> {
        let now = Utc::now();

        let mut scored: Vec<RetrievedMemory> = candidates
            .into_iter()
            .map(|(record, similarity)| {
                let score = self.composite(similarity, &record, now);
                RetrievedMemory {
                    record,
                    score,
                    basis: RetrievalBasis::Semantic(similarity),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        });
        scored.truncate(limit);
        scored
    }
}
