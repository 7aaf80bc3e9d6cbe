//! Core types for the memory store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{MemoryError, Result};

/// Unique identifier for a memory record (UUID v4, assigned at creation)
pub type RecordId = String;

/// Generate a fresh record id
pub fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// Open mapping of kind-specific fields
pub type AttributeMap = HashMap<String, serde_json::Value>;

/// A persisted unit of experience available for later retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, immutable
    pub id: RecordId,
    /// Closed variant tag; determines which attributes are populated
    pub kind: MemoryKind,
    /// Free text, the unit offered to similarity search
    pub content: String,
    /// Kind-specific fields, validated at construction
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Retention/relevance score in [0, 1]; recomputed and decayed over time
    #[serde(default = "default_importance")]
    pub importance: f32,
    /// Set once, never mutated
    pub created_at: DateTime<Utc>,
    /// Whether the embedding vector has been computed and stored
    #[serde(default)]
    pub has_embedding: bool,
    /// Optional scoping key for filtered retrieval
    pub owner_user_id: Option<String>,
    /// Optional scoping key for filtered retrieval
    pub owner_world_id: Option<String>,
}

fn default_importance() -> f32 {
    0.5
}

/// Memory kind classification (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A conversational exchange (speaker, tone, topic, response quality)
    Conversation,
    /// A detected in-world interaction (type, target, intensity, duration)
    Interaction,
    /// An emotional episode (emotion, intensity)
    Emotional,
    /// Something that happened in the world (event type)
    WorldEvent,
    /// Relationship knowledge about a specific user
    UserRelationship,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Interaction => "interaction",
            MemoryKind::Emotional => "emotional",
            MemoryKind::WorldEvent => "world_event",
            MemoryKind::UserRelationship => "user_relationship",
        }
    }

    pub fn all() -> &'static [MemoryKind] {
        &[
            MemoryKind::Conversation,
            MemoryKind::Interaction,
            MemoryKind::Emotional,
            MemoryKind::WorldEvent,
            MemoryKind::UserRelationship,
        ]
    }

    /// Attributes that must be present for this kind
    pub fn required_attributes(&self) -> &'static [&'static str] {
        match self {
            MemoryKind::Conversation => &["speaker", "tone", "topic", "response_quality"],
            MemoryKind::Interaction => {
                &["interaction_type", "target", "intensity", "duration_secs"]
            }
            MemoryKind::Emotional => &["emotion", "intensity"],
            MemoryKind::WorldEvent => &["event_type"],
            MemoryKind::UserRelationship => &["user_id"],
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(MemoryKind::Conversation),
            "interaction" => Ok(MemoryKind::Interaction),
            "emotional" => Ok(MemoryKind::Emotional),
            "world_event" => Ok(MemoryKind::WorldEvent),
            "user_relationship" => Ok(MemoryKind::UserRelationship),
            _ => Err(format!("Unknown memory kind: {}", s)),
        }
    }
}

/// Validate kind-specific attributes. Absence of a required field is a
/// construction error, not a silent default; numeric fields must parse
/// as numbers.
pub fn validate_attributes(kind: MemoryKind, attributes: &AttributeMap) -> Result<()> {
    for field in kind.required_attributes() {
        match attributes.get(*field) {
            None => {
                return Err(MemoryError::validation(
                    *field,
                    format!("required for kind '{}'", kind),
                ));
            }
            Some(serde_json::Value::Null) => {
                return Err(MemoryError::validation(
                    *field,
                    format!("must not be null for kind '{}'", kind),
                ));
            }
            Some(_) => {}
        }
    }

    // Fields used in scoring must be numeric where the scorer expects it
    for numeric in ["response_quality", "intensity", "duration_secs"] {
        if let Some(value) = attributes.get(numeric) {
            if kind.required_attributes().contains(&numeric) && value.as_f64().is_none() {
                return Err(MemoryError::validation(
                    numeric,
                    format!("must be numeric, got {}", value),
                ));
            }
        }
    }

    Ok(())
}

/// Input for creating a memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub kind: MemoryKind,
    pub content: String,
    #[serde(default)]
    pub attributes: AttributeMap,
    pub owner_user_id: Option<String>,
    pub owner_world_id: Option<String>,
}

impl CreateMemoryInput {
    /// Validate and turn the input into a record with a fresh id.
    /// Importance is assigned by the scorer afterwards.
    pub fn into_record(self) -> Result<MemoryRecord> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::validation("content", "must not be empty"));
        }
        validate_attributes(self.kind, &self.attributes)?;

        Ok(MemoryRecord {
            id: new_record_id(),
            kind: self.kind,
            content: self.content,
            attributes: self.attributes,
            importance: default_importance(),
            created_at: Utc::now(),
            has_embedding: false,
            owner_user_id: self.owner_user_id,
            owner_world_id: self.owner_world_id,
        })
    }
}

/// Conjunctive metadata filter applied alongside similarity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub kind: Option<MemoryKind>,
    pub owner_user_id: Option<String>,
    pub owner_world_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl MemoryFilter {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.owner_user_id.is_none()
            && self.owner_world_id.is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }
}

/// Why a retrieved record was selected
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalBasis {
    /// Selected by vector similarity; carries the cosine similarity
    Semantic(f32),
    /// Selected by recency scan while semantic ranking was degraded
    Recency,
}

/// A record handed back to the prompt-assembly caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub record: MemoryRecord,
    /// Composite ranking score (semantic path) or 0.0 (recency path)
    pub score: f32,
    pub basis: RetrievalBasis,
}

/// Outcome of a maintenance operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceOutcome {
    pub success: bool,
    /// Records affected (deleted, decayed, or restored)
    pub affected: usize,
    /// Elapsed wall time
    pub duration_ms: f64,
}

impl MaintenanceOutcome {
    pub fn new(affected: usize, duration_ms: f64) -> Self {
        Self {
            success: true,
            affected,
            duration_ms,
        }
    }

    pub fn failed(duration_ms: f64) -> Self {
        Self {
            success: false,
            affected: 0,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conversation_attributes() -> AttributeMap {
        HashMap::from([
            ("speaker".to_string(), json!("ren")),
            ("tone".to_string(), json!("excited")),
            ("topic".to_string(), json!("food")),
            ("response_quality".to_string(), json!(0.8)),
        ])
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in MemoryKind::all() {
            let parsed: MemoryKind = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn valid_input_becomes_record() {
        let input = CreateMemoryInput {
            kind: MemoryKind::Conversation,
            content: "I love pizza".to_string(),
            attributes: conversation_attributes(),
            owner_user_id: Some("user-1".to_string()),
            owner_world_id: None,
        };

        let record = input.into_record().unwrap();
        assert_eq!(record.kind, MemoryKind::Conversation);
        assert!(!record.has_embedding);
        assert!(!record.id.is_empty());
    }

    #[test]
    fn missing_required_attribute_is_rejected() {
        let mut attributes = conversation_attributes();
        attributes.remove("tone");

        let input = CreateMemoryInput {
            kind: MemoryKind::Conversation,
            content: "hello".to_string(),
            attributes,
            owner_user_id: None,
            owner_world_id: None,
        };

        match input.into_record() {
            Err(MemoryError::Validation { field, .. }) => assert_eq!(field, "tone"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_scoring_field_is_rejected() {
        let mut attributes = conversation_attributes();
        attributes.insert("response_quality".to_string(), json!("great"));

        let input = CreateMemoryInput {
            kind: MemoryKind::Conversation,
            content: "hello".to_string(),
            attributes,
            owner_user_id: None,
            owner_world_id: None,
        };

        assert!(input.into_record().is_err());
    }

    #[test]
    fn empty_content_is_rejected() {
        let input = CreateMemoryInput {
            kind: MemoryKind::WorldEvent,
            content: "   ".to_string(),
            attributes: HashMap::from([("event_type".to_string(), json!("rain"))]),
            owner_user_id: None,
            owner_world_id: None,
        };
        assert!(input.into_record().is_err());
    }
}
