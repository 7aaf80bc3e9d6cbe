//! Property-based tests
//!
//! These tests verify invariants that must hold for all inputs:
//! - Scores stay in their documented bounds
//! - Embedding and similarity never panic
//! - Ranking output is bounded and ordered
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// IMPORTANCE SCORING TESTS
// ============================================================================

mod scoring_tests {
    use super::*;
    use reverie::scoring::ImportanceScorer;
    use reverie::types::{AttributeMap, MemoryKind};
    use serde_json::json;

    fn arb_kind() -> impl Strategy<Value = MemoryKind> {
        prop_oneof![
            Just(MemoryKind::Conversation),
            Just(MemoryKind::Interaction),
            Just(MemoryKind::Emotional),
            Just(MemoryKind::WorldEvent),
            Just(MemoryKind::UserRelationship),
        ]
    }

    fn arb_attributes() -> impl Strategy<Value = AttributeMap> {
        proptest::collection::hash_map(
            prop_oneof![
                Just("response_quality".to_string()),
                Just("tone".to_string()),
                Just("intensity".to_string()),
                Just("duration_secs".to_string()),
                Just("significance".to_string()),
                Just("closeness".to_string()),
                "[a-z_]{1,16}",
            ],
            prop_oneof![
                any::<f64>().prop_map(|f| json!(f)),
                any::<i64>().prop_map(|i| json!(i)),
                "\\PC{0,32}".prop_map(|s| json!(s)),
                Just(json!(null)),
                Just(json!(true)),
            ],
            0..8,
        )
    }

    proptest! {
        /// Invariant: scores land in [0, 1] for any kind and any attributes,
        /// including NaN-producing and absurdly large numeric inputs
        #[test]
        fn score_always_bounded(kind in arb_kind(), attrs in arb_attributes()) {
            let score = ImportanceScorer::default().score(kind, &attrs);
            prop_assert!((0.0..=1.0).contains(&score), "score was {}", score);
        }

        /// Invariant: scoring is deterministic
        #[test]
        fn score_is_deterministic(kind in arb_kind(), attrs in arb_attributes()) {
            let scorer = ImportanceScorer::default();
            prop_assert_eq!(scorer.score(kind, &attrs), scorer.score(kind, &attrs));
        }
    }
}

// ============================================================================
// EMBEDDING TESTS
// ============================================================================

mod embedding_tests {
    use super::*;
    use reverie::embedding::{cosine_similarity, Embedder, HashingEmbedder};

    proptest! {
        /// Invariant: embedding never panics, has the configured length,
        /// and is unit-norm (or all-zero when no tokens survive)
        #[test]
        fn embed_shape_and_norm(text in "\\PC{0,200}", dims in 4usize..128) {
            let embedder = HashingEmbedder::new(dims);
            let vector = embedder.embed(&text).unwrap();
            prop_assert_eq!(vector.len(), dims);

            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!(norm < 1e-6 || (norm - 1.0).abs() < 1e-3, "norm was {}", norm);
        }

        /// Invariant: the same text always embeds to the same vector
        #[test]
        fn embed_is_deterministic(text in "\\PC{0,200}") {
            let embedder = HashingEmbedder::new(64);
            prop_assert_eq!(embedder.embed(&text).unwrap(), embedder.embed(&text).unwrap());
        }

        /// Invariant: cosine similarity is symmetric and within [-1, 1]
        #[test]
        fn cosine_symmetric_and_bounded(
            a in proptest::collection::vec(-100.0f32..100.0, 8),
            b in proptest::collection::vec(-100.0f32..100.0, 8),
        ) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-5);
            prop_assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&ab), "similarity was {}", ab);
        }

        /// Invariant: a vector is maximally similar to itself
        #[test]
        fn cosine_self_similarity(text in "[a-z ]{2,100}") {
            let embedder = HashingEmbedder::new(64);
            let v = embedder.embed(&text).unwrap();
            let sim = cosine_similarity(&v, &v);
            // Zero vectors compare at 0 by convention
            prop_assert!(sim == 0.0 || (sim - 1.0).abs() < 1e-5);
        }
    }
}

// ============================================================================
// RANKING TESTS
// ============================================================================

mod ranking_tests {
    use super::*;
    use chrono::{Duration, Utc};
    use reverie::retrieval::{RankerConfig, RetrievalRanker};
    use reverie::types::{new_record_id, MemoryKind, MemoryRecord};
    use std::collections::HashMap;

    fn arb_candidates() -> impl Strategy<Value = Vec<(MemoryRecord, f32)>> {
        proptest::collection::vec(
            (0.0f32..=1.0, -1.0f32..=1.0, 0i64..10_000_000),
            0..40,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(importance, similarity, age_secs)| {
                    let record = MemoryRecord {
                        id: new_record_id(),
                        kind: MemoryKind::WorldEvent,
                        content: "event".to_string(),
                        attributes: HashMap::new(),
                        importance,
                        created_at: Utc::now() - Duration::seconds(age_secs),
                        has_embedding: true,
                        owner_user_id: None,
                        owner_world_id: None,
                    };
                    (record, similarity)
                })
                .collect()
        })
    }

    proptest! {
        /// Invariant: ranking returns at most `limit` results, sorted
        /// descending by composite score
        #[test]
        fn rank_bounded_and_ordered(candidates in arb_candidates(), limit in 0usize..20) {
            let ranker = RetrievalRanker::new(RankerConfig::default()).unwrap();
            let ranked = ranker.rank(candidates, limit);

            prop_assert!(ranked.len() <= limit);
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }

        /// Invariant: composite score is monotone in stored importance
        /// when similarity and age are held fixed
        #[test]
        fn composite_monotone_in_importance(
            similarity in -1.0f32..=1.0,
            age_secs in 0i64..10_000_000,
            lo in 0.0f32..=1.0,
            delta in 0.0f32..=1.0,
        ) {
            let hi = (lo + delta).min(1.0);
            let ranker = RetrievalRanker::new(RankerConfig::default()).unwrap();
            let now = Utc::now();

            let base = MemoryRecord {
                id: new_record_id(),
                kind: MemoryKind::WorldEvent,
                content: "event".to_string(),
                attributes: HashMap::new(),
                importance: lo,
                created_at: now - Duration::seconds(age_secs),
                has_embedding: true,
                owner_user_id: None,
                owner_world_id: None,
            };
            let mut bumped = base.clone();
            bumped.importance = hi;

            prop_assert!(
                ranker.composite(similarity, &bumped, now)
                    >= ranker.composite(similarity, &base, now)
            );
        }

        /// Invariant: every ranked result keeps a score built from
        /// weights summing to 1, so it stays within [-w_s, 1]
        #[test]
        fn composite_score_bounded(candidates in arb_candidates()) {
            let ranker = RetrievalRanker::new(RankerConfig::default()).unwrap();
            for result in ranker.rank(candidates, 40) {
                prop_assert!(result.score <= 1.0 + 1e-5, "score was {}", result.score);
                prop_assert!(result.score >= -0.5 - 1e-5, "score was {}", result.score);
            }
        }
    }
}
