//! Human feedback application and aggregation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::with_metadata;
use crate::validation::canonical_json;

/// One piece of reviewer feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Feedback {
    /// Replace fields that already exist
    Correction {
        corrections: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    /// Insert new fields
    Addition {
        additions: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    /// Confirm the data as-is
    Verification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Correction,
    Addition,
    Verification,
}

impl Feedback {
    pub fn kind(&self) -> FeedbackKind {
        match self {
            Feedback::Correction { .. } => FeedbackKind::Correction,
            Feedback::Addition { .. } => FeedbackKind::Addition,
            Feedback::Verification { .. } => FeedbackKind::Verification,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Feedback::Correction { notes, .. }
            | Feedback::Addition { notes, .. }
            | Feedback::Verification { notes } => notes.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusLevel {
    High,
    Medium,
    Low,
    None,
}

impl ConsensusLevel {
    fn from_agreement(agreement: f64) -> Self {
        if agreement > 0.8 {
            ConsensusLevel::High
        } else if agreement > 0.5 {
            ConsensusLevel::Medium
        } else {
            ConsensusLevel::Low
        }
    }
}

/// Consensus over several pieces of feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFeedback {
    /// Most common feedback kind; `None` for empty input
    pub kind: Option<FeedbackKind>,
    /// Most common corrected value per field
    pub corrections: Map<String, Value>,
    pub consensus: ConsensusLevel,
    pub notes: Option<String>,
    pub aggregated_at: DateTime<Utc>,
}

/// Applies and aggregates reviewer feedback
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackProcessor;

impl FeedbackProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Apply feedback to a copy of `original`
    ///
    /// Non-object payloads are wrapped as `{"value": original}` so the
    /// feedback metadata has somewhere to live.
    pub fn apply(&self, feedback: &Feedback, original: &Value) -> Value {
        let mut updated = match original {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        let now = Utc::now().to_rfc3339();

        match feedback {
            Feedback::Correction { corrections, .. } => {
                for (field, value) in corrections {
                    if let Some(slot) = updated.get_mut(field) {
                        tracing::debug!("Applying correction to field {}", field);
                        *slot = value.clone();
                    }
                }
            }
            Feedback::Addition { additions, .. } => {
                for (field, value) in additions {
                    tracing::debug!("Adding field {}", field);
                    updated.insert(field.clone(), value.clone());
                }
            }
            Feedback::Verification { notes } => with_metadata(&mut updated, |metadata| {
                metadata.insert("verified".to_string(), Value::Bool(true));
                metadata.insert("verification_timestamp".to_string(), Value::from(now.clone()));
                if let Some(notes) = notes {
                    metadata.insert("verification_notes".to_string(), Value::from(notes.clone()));
                }
            }),
        }

        with_metadata(&mut updated, |metadata| {
            metadata.insert("feedback_processed".to_string(), Value::Bool(true));
            metadata.insert("feedback_timestamp".to_string(), Value::from(now));
        });

        Value::Object(updated)
    }

    /// Combine several pieces of feedback into one consensus view
    ///
    /// Agreement is the mean of kind agreement (share of the most common
    /// kind) and correction agreement (per corrected field, share of the most
    /// common value, averaged over fields).
    pub fn aggregate(&self, feedbacks: &[Feedback]) -> AggregatedFeedback {
        let aggregated_at = Utc::now();
        if feedbacks.is_empty() {
            return AggregatedFeedback {
                kind: None,
                corrections: Map::new(),
                consensus: ConsensusLevel::None,
                notes: None,
                aggregated_at,
            };
        }

        let kinds = tally(feedbacks.iter().map(Feedback::kind));
        let (top_kind, top_kind_count) = kinds[0];

        // field -> [(value, count)] in first-seen order
        let mut by_field: Vec<(String, Vec<(Value, usize)>)> = Vec::new();
        for feedback in feedbacks {
            if let Feedback::Correction { corrections, .. } = feedback {
                for (field, value) in corrections {
                    let index = match by_field.iter().position(|(f, _)| f == field) {
                        Some(index) => index,
                        None => {
                            by_field.push((field.clone(), Vec::new()));
                            by_field.len() - 1
                        }
                    };
                    let counts = &mut by_field[index].1;
                    let key = canonical_json(value);
                    match counts.iter_mut().find(|(v, _)| canonical_json(v) == key) {
                        Some((_, count)) => *count += 1,
                        None => counts.push((value.clone(), 1)),
                    }
                }
            }
        }

        let mut corrections = Map::new();
        let mut field_agreement = Vec::with_capacity(by_field.len());
        for (field, counts) in by_field {
            let total: usize = counts.iter().map(|(_, c)| c).sum();
            let mut best: Option<&(Value, usize)> = None;
            for candidate in &counts {
                if best.map_or(true, |(_, c)| candidate.1 > *c) {
                    best = Some(candidate);
                }
            }
            if let Some((value, count)) = best {
                field_agreement.push(*count as f64 / total as f64);
                corrections.insert(field, value.clone());
            }
        }

        let kind_agreement = top_kind_count as f64 / feedbacks.len() as f64;
        let correction_agreement = if field_agreement.is_empty() {
            1.0
        } else {
            field_agreement.iter().sum::<f64>() / field_agreement.len() as f64
        };
        let consensus = ConsensusLevel::from_agreement((kind_agreement + correction_agreement) / 2.0);

        let notes: Vec<&str> = feedbacks.iter().filter_map(Feedback::notes).collect();

        tracing::info!(
            "Aggregated {} feedback items with {:?} consensus",
            feedbacks.len(),
            consensus
        );

        AggregatedFeedback {
            kind: Some(top_kind),
            corrections,
            consensus,
            notes: (!notes.is_empty()).then(|| notes.join("\n")),
            aggregated_at,
        }
    }
}

/// Count occurrences, most common first; ties keep first-seen order
fn tally<T: PartialEq + Copy>(items: impl Iterator<Item = T>) -> Vec<(T, usize)> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_correction_only_replaces_existing_fields() {
        let feedback = Feedback::Correction {
            corrections: map(json!({"rating": 4, "unknown": true})),
            notes: None,
        };
        let updated = FeedbackProcessor::new().apply(&feedback, &json!({"rating": 1}));

        assert_eq!(updated["rating"], 4);
        assert!(updated.get("unknown").is_none());
        assert_eq!(updated["metadata"]["feedback_processed"], true);
        assert!(updated["metadata"]["feedback_timestamp"].is_string());
    }

    #[test]
    fn test_addition_inserts_fields() {
        let feedback = Feedback::Addition {
            additions: map(json!({"region": "East"})),
            notes: Some("added".to_string()),
        };
        let updated = FeedbackProcessor::new().apply(&feedback, &json!({"a": 1}));
        assert_eq!(updated["region"], "East");
        assert_eq!(updated["a"], 1);
    }

    #[test]
    fn test_verification_sets_metadata() {
        let feedback = Feedback::Verification {
            notes: Some("looks right".to_string()),
        };
        let updated = FeedbackProcessor::new().apply(
            &feedback,
            &json!({"metadata": {"source": "sales"}}),
        );
        let metadata = &updated["metadata"];
        assert_eq!(metadata["verified"], true);
        assert_eq!(metadata["verification_notes"], "looks right");
        assert_eq!(metadata["source"], "sales");
        assert!(metadata["verification_timestamp"].is_string());
    }

    #[test]
    fn test_feedback_wire_format() {
        let feedback: Feedback =
            serde_json::from_value(json!({"type": "correction", "corrections": {"x": 1}}))
                .unwrap();
        assert_eq!(feedback.kind(), FeedbackKind::Correction);
    }

    #[test]
    fn test_aggregate_empty() {
        let aggregated = FeedbackProcessor::new().aggregate(&[]);
        assert_eq!(aggregated.kind, None);
        assert_eq!(aggregated.consensus, ConsensusLevel::None);
    }

    #[test]
    fn test_aggregate_unanimous_corrections() {
        let feedback = Feedback::Correction {
            corrections: map(json!({"rating": 2})),
            notes: Some("low rating was a typo".to_string()),
        };
        let aggregated = FeedbackProcessor::new().aggregate(&[feedback.clone(), feedback]);

        assert_eq!(aggregated.kind, Some(FeedbackKind::Correction));
        assert_eq!(aggregated.corrections["rating"], 2);
        assert_eq!(aggregated.consensus, ConsensusLevel::High);
        assert_eq!(
            aggregated.notes.as_deref(),
            Some("low rating was a typo\nlow rating was a typo")
        );
    }

    #[test]
    fn test_aggregate_split_opinions() {
        let feedbacks = [
            Feedback::Correction {
                corrections: map(json!({"rating": 2})),
                notes: None,
            },
            Feedback::Correction {
                corrections: map(json!({"rating": 3})),
                notes: None,
            },
            Feedback::Verification { notes: None },
            Feedback::Addition {
                additions: map(json!({"x": 1})),
                notes: None,
            },
        ];
        let aggregated = FeedbackProcessor::new().aggregate(&feedbacks);

        assert_eq!(aggregated.kind, Some(FeedbackKind::Correction));
        // First-seen value wins the tie
        assert_eq!(aggregated.corrections["rating"], 2);
        // kind 0.5, corrections 0.5
        assert_eq!(aggregated.consensus, ConsensusLevel::Low);
        assert_eq!(aggregated.notes, None);
    }
}
