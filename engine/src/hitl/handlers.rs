//! Per-agent review handlers
//!
//! A handler receives the low-confidence output, consults the human reviewer
//! and returns the revised output. The manager applies the HITL metadata
//! stamp afterwards, so handlers only deal with content.

use async_trait::async_trait;
use sdk::capability::HumanReviewer;
use sdk::errors::EngineError;
use sdk::types::{AgentKind, HumanResponse, ReviewPrompt};
use serde_json::{json, Value};

use super::feedback::{Feedback, FeedbackProcessor};
use super::with_metadata;

/// Number of leading records a reviewer signs off on
const VERIFIED_RECORD_LIMIT: usize = 3;

/// Adjustment moved from neutral to positive sentiment
const SENTIMENT_ADJUSTMENT: f64 = 0.05;

/// Everything a handler may look at besides the output itself
pub struct ReviewContext<'a> {
    pub agent: &'a AgentKind,
    pub task: &'a str,
    pub input: &'a Value,
    pub confidence: f64,
    pub reviewer: &'a dyn HumanReviewer,
}

#[async_trait]
pub trait HitlHandler: Send + Sync {
    async fn handle(&self, ctx: &ReviewContext<'_>, output: Value) -> Result<Value, EngineError>;
}

fn object_mut<'v>(
    output: &'v mut Value,
    ctx: &ReviewContext<'_>,
) -> Result<&'v mut serde_json::Map<String, Value>, EngineError> {
    output.as_object_mut().ok_or_else(|| {
        EngineError::HitlHandler(format!(
            "{}.{} output is not a JSON object",
            ctx.agent, ctx.task
        ))
    })
}

/// Ask for a verification and fold a positive answer into the output
async fn verify(
    ctx: &ReviewContext<'_>,
    statement: String,
    data: Value,
    output: Value,
) -> Result<Value, EngineError> {
    let response = ctx
        .reviewer
        .ask(ReviewPrompt::Verification { statement, data })
        .await?;

    match response {
        HumanResponse::Verified {
            is_verified: true,
            notes,
        } => Ok(FeedbackProcessor::new().apply(&Feedback::Verification { notes }, &output)),
        HumanResponse::Verified {
            is_verified: false,
            notes,
        } => {
            tracing::warn!(
                "Reviewer rejected {}.{}: {}",
                ctx.agent,
                ctx.task,
                notes.as_deref().unwrap_or("no notes")
            );
            Ok(output)
        }
        other => {
            tracing::debug!("Unexpected verification answer: {:?}", other);
            Ok(output)
        }
    }
}

/// Fallback for agents without a dedicated handler
///
/// Leaves content alone and marks the output `hitl_verified`.
#[derive(Debug, Default)]
pub struct DefaultHandler;

#[async_trait]
impl HitlHandler for DefaultHandler {
    async fn handle(&self, ctx: &ReviewContext<'_>, mut output: Value) -> Result<Value, EngineError> {
        tracing::info!(
            "Using default HITL handler for {}.{} (confidence {:.1})",
            ctx.agent,
            ctx.task,
            ctx.confidence
        );

        let response = ctx
            .reviewer
            .ask(ReviewPrompt::Verification {
                statement: format!(
                    "Output of {} for task {} is correct",
                    ctx.agent.display_name(),
                    ctx.task
                ),
                data: output.clone(),
            })
            .await?;

        let verified = !matches!(
            response,
            HumanResponse::Verified {
                is_verified: false,
                ..
            }
        );
        object_mut(&mut output, ctx)?.insert("hitl_verified".to_string(), Value::Bool(verified));
        Ok(output)
    }
}

/// Record review for extracted data
#[derive(Debug, Default)]
pub struct ExtractionHandler;

#[async_trait]
impl HitlHandler for ExtractionHandler {
    async fn handle(&self, ctx: &ReviewContext<'_>, mut output: Value) -> Result<Value, EngineError> {
        tracing::info!("Handling data extraction review for task {}", ctx.task);

        let records = output.get("data").cloned().unwrap_or(Value::Null);
        let response = ctx
            .reviewer
            .ask(ReviewPrompt::Review {
                instructions: "Review the extracted records and correct any errors".to_string(),
                data: records,
            })
            .await?;

        let fields = object_mut(&mut output, ctx)?;
        if let HumanResponse::Edited { data, notes } = response {
            if data.is_array() {
                fields.insert("data".to_string(), data);
            }
            if let Some(notes) = notes {
                with_metadata(fields, |metadata| {
                    metadata.insert("hitl_review_notes".to_string(), Value::from(notes));
                });
            }
        }

        if let Some(Value::Array(records)) = fields.get_mut("data") {
            for record in records.iter_mut().take(VERIFIED_RECORD_LIMIT) {
                let Some(record) = record.as_object_mut() else {
                    continue;
                };
                record.insert("human_verified".to_string(), Value::Bool(true));

                if record.get("rating").and_then(Value::as_i64) == Some(1) {
                    record.insert("rating".to_string(), json!(2));
                    let feedback = record
                        .get("feedback")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let corrected = format!("{} [Rating corrected by human]", feedback);
                    record.insert("feedback".to_string(), Value::from(corrected));
                }
            }
        }

        Ok(output)
    }
}

/// Expert check of analysis results
#[derive(Debug, Default)]
pub struct AnalysisHandler;

#[async_trait]
impl HitlHandler for AnalysisHandler {
    async fn handle(&self, ctx: &ReviewContext<'_>, output: Value) -> Result<Value, EngineError> {
        tracing::info!("Handling statistical analysis review for task {}", ctx.task);

        let results = output
            .get("analysis_results")
            .cloned()
            .unwrap_or(Value::Null);
        let mut output = verify(
            ctx,
            format!("The {} results are accurate", ctx.task),
            results,
            output,
        )
        .await?;

        let fields = object_mut(&mut output, ctx)?;
        if let Some(Value::Object(results)) = fields.get_mut("analysis_results") {
            if let Some(Value::Object(distribution)) = results.get_mut("sentiment_distribution") {
                let positive = distribution
                    .get("positive")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let neutral = distribution
                    .get("neutral")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                distribution.insert(
                    "positive".to_string(),
                    json!((positive + SENTIMENT_ADJUSTMENT).min(1.0)),
                );
                distribution.insert(
                    "neutral".to_string(),
                    json!((neutral - SENTIMENT_ADJUSTMENT).max(0.0)),
                );
                results.insert(
                    "human_notes".to_string(),
                    json!("Adjusted sentiment distribution based on contextual understanding of customer language."),
                );
            } else if results.contains_key("sales_by_region") {
                results.insert(
                    "human_notes".to_string(),
                    json!("Verified regional sales data. Note that the East region had a promotional event during this period."),
                );
                let insights = results
                    .entry("sales_insights")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(insights) = insights {
                    insights.push(json!({
                        "type": "human_insight",
                        "description": "The sales spike in the East region correlates with the Q2 promotional campaign."
                    }));
                }
            }
        }

        with_metadata(fields, |metadata| {
            metadata.insert(
                "hitl_notes".to_string(),
                json!("Human expert reviewed and adjusted analysis."),
            );
        });
        Ok(output)
    }
}

/// Reviewer polish for rendered visualizations
#[derive(Debug, Default)]
pub struct VisualizationHandler;

#[async_trait]
impl HitlHandler for VisualizationHandler {
    async fn handle(&self, ctx: &ReviewContext<'_>, output: Value) -> Result<Value, EngineError> {
        tracing::info!("Handling visualization review for task {}", ctx.task);

        let visualizations = output
            .get("visualizations")
            .cloned()
            .unwrap_or(Value::Null);
        let mut output = verify(
            ctx,
            "The visualizations represent the analysis faithfully".to_string(),
            visualizations,
            output,
        )
        .await?;

        let fields = object_mut(&mut output, ctx)?;
        if let Some(Value::Array(visualizations)) = fields.get_mut("visualizations") {
            for viz in visualizations.iter_mut().filter_map(Value::as_object_mut) {
                if let Some(title) = viz.get("title").and_then(Value::as_str) {
                    let enhanced = format!("{} - Human Enhanced", title);
                    viz.insert("title".to_string(), Value::from(enhanced));
                }

                let annotations = viz
                    .entry("annotations")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(annotations) = annotations {
                    annotations.push(json!({
                        "type": "human_annotation",
                        "text": "Key insight highlighted by human reviewer",
                        "position": {"x": 0.5, "y": 0.5}
                    }));
                }

                if let Some(description) = viz.get("description").and_then(Value::as_str) {
                    let extended = format!(
                        "{} This visualization has been reviewed and enhanced by a human expert.",
                        description
                    );
                    viz.insert("description".to_string(), Value::from(extended));
                }
            }
        }

        with_metadata(fields, |metadata| {
            metadata.insert(
                "hitl_improvements".to_string(),
                json!([
                    "Enhanced visualization titles",
                    "Added expert annotations",
                    "Improved descriptions"
                ]),
            );
        });
        Ok(output)
    }
}
