//! Importance scoring
//!
//! Assigns a bounded retention score to a record from kind-specific
//! features: a base value plus weighted adjustments, clamped to [0, 1].
//! The scorer is pure and deterministic; it runs at creation and during
//! lifecycle re-scoring, never inside the hot retrieval path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AttributeMap, MemoryKind};

/// Configuration for the importance scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Starting point before kind-specific adjustments
    pub base: f32,
    /// Conversation: weight applied to `response_quality`
    pub response_quality_weight: f32,
    /// Conversation: flat bonus when tone is in the high-salience set
    pub high_salience_bonus: f32,
    /// Conversation: tones that earn the bonus
    pub high_salience_tones: Vec<String>,
    /// Interaction: weight applied to `intensity`
    pub interaction_intensity_weight: f32,
    /// Interaction: weight applied to `min(duration_secs / 60, 1)`
    pub interaction_duration_weight: f32,
    /// Emotional: weight applied to `intensity`
    pub emotional_intensity_weight: f32,
    /// WorldEvent: attribute name -> weight, summed over numeric values
    pub world_event_weights: HashMap<String, f32>,
    /// UserRelationship: attribute name -> weight, summed over numeric values
    pub user_relationship_weights: HashMap<String, f32>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            base: 0.5,
            response_quality_weight: 0.3,
            high_salience_bonus: 0.2,
            high_salience_tones: vec![
                "excited".to_string(),
                "angry".to_string(),
                "sad".to_string(),
            ],
            interaction_intensity_weight: 0.4,
            interaction_duration_weight: 0.1,
            emotional_intensity_weight: 0.5,
            world_event_weights: HashMap::from([("significance".to_string(), 0.3)]),
            user_relationship_weights: HashMap::from([("closeness".to_string(), 0.4)]),
        }
    }
}

/// Component breakdown of a score, for explainability in tests and logs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub base: f32,
    pub kind_adjustment: f32,
    /// Final value after clamping to [0, 1]
    pub total: f32,
}

/// Pure importance scorer
pub struct ImportanceScorer {
    config: ScorerConfig,
}

impl Default for ImportanceScorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default())
    }
}

impl ImportanceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score a record's features. Always in [0, 1], whatever the input.
    pub fn score(&self, kind: MemoryKind, attributes: &AttributeMap) -> f32 {
        self.score_with_components(kind, attributes).total
    }

    pub fn score_with_components(
        &self,
        kind: MemoryKind,
        attributes: &AttributeMap,
    ) -> ScoreComponents {
        let adjustment = match kind {
            MemoryKind::Conversation => self.conversation_adjustment(attributes),
            MemoryKind::Interaction => self.interaction_adjustment(attributes),
            MemoryKind::Emotional => {
                self.config.emotional_intensity_weight * numeric(attributes, "intensity")
            }
            MemoryKind::WorldEvent => {
                Self::table_adjustment(&self.config.world_event_weights, attributes)
            }
            MemoryKind::UserRelationship => {
                Self::table_adjustment(&self.config.user_relationship_weights, attributes)
            }
        };

        let total = (self.config.base + adjustment).clamp(0.0, 1.0);
        ScoreComponents {
            base: self.config.base,
            kind_adjustment: adjustment,
            total,
        }
    }

    fn conversation_adjustment(&self, attributes: &AttributeMap) -> f32 {
        let mut adjustment =
            self.config.response_quality_weight * numeric(attributes, "response_quality");

        if let Some(tone) = attributes.get("tone").and_then(|v| v.as_str()) {
            let tone = tone.to_lowercase();
            if self.config.high_salience_tones.iter().any(|t| t == &tone) {
                adjustment += self.config.high_salience_bonus;
            }
        }

        adjustment
    }

    fn interaction_adjustment(&self, attributes: &AttributeMap) -> f32 {
        let intensity = numeric(attributes, "intensity");
        let duration = numeric(attributes, "duration_secs");

        self.config.interaction_intensity_weight * intensity
            + self.config.interaction_duration_weight * (duration / 60.0).min(1.0)
    }

    fn table_adjustment(weights: &HashMap<String, f32>, attributes: &AttributeMap) -> f32 {
        weights
            .iter()
            .map(|(field, weight)| weight * numeric(attributes, field))
            .sum()
    }
}

fn numeric(attributes: &AttributeMap, field: &str) -> f32 {
    attributes
        .get(field)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32
}
