//! Human-in-the-loop escalation
//!
//! When a stage's confidence falls below the threshold the orchestrator hands
//! its output to the [`HitlManager`]. The manager:
//!
//! 1. records a `hitl_request` history entry and a pending review in the
//!    context store (`hitl:pending:{request_id}`)
//! 2. dispatches to the handler registered for the agent, or the default
//!    handler, bounded by the configured timeout
//! 3. stamps `hitl_applied`, `hitl_timestamp` and `hitl_confidence_before`
//!    into the output's metadata
//! 4. records a `hitl_response` history entry and clears the pending review
//!
//! Handlers reach the human only through [`HumanReviewer`].

use chrono::Utc;
use sdk::capability::HumanReviewer;
use sdk::errors::EngineError;
use sdk::types::{AgentKind, NotificationLevel};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod feedback;
pub mod handlers;
pub mod reviewer;

pub use feedback::{AggregatedFeedback, ConsensusLevel, Feedback, FeedbackKind, FeedbackProcessor};
pub use handlers::{
    AnalysisHandler, DefaultHandler, ExtractionHandler, HitlHandler, ReviewContext,
    VisualizationHandler,
};
pub use reviewer::SimulatedReviewer;

use crate::config::{HitlConfig, HitlTimeoutPolicy};
use crate::state::{ContextStore, HistoryEntry, HistoryKind, HistoryLog};

/// Context store prefix for reviews in flight
pub const PENDING_PREFIX: &str = "hitl:pending:";

/// Run `apply` against the `metadata` object of `fields`, creating it (or
/// replacing a non-object value) first
pub(crate) fn with_metadata<F>(fields: &mut Map<String, Value>, apply: F)
where
    F: FnOnce(&mut Map<String, Value>),
{
    let mut metadata = match fields.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => Map::new(),
    };
    apply(&mut metadata);
    fields.insert("metadata".to_string(), Value::Object(metadata));
}

/// Result of one escalation
#[derive(Debug, Clone, PartialEq)]
pub enum HitlOutcome {
    /// The handler finished; the output carries the HITL stamp
    Reviewed(Value),
    /// The reviewer did not answer in time and the policy keeps the original
    TimedOut(Value),
}

impl HitlOutcome {
    pub fn into_output(self) -> Value {
        match self {
            HitlOutcome::Reviewed(output) | HitlOutcome::TimedOut(output) => output,
        }
    }

    pub fn is_reviewed(&self) -> bool {
        matches!(self, HitlOutcome::Reviewed(_))
    }
}

/// One escalation, as passed to [`HitlManager::process`]
pub struct HitlRequest<'a> {
    pub workflow_id: Option<&'a str>,
    pub agent: &'a AgentKind,
    pub task: &'a str,
    pub input: &'a Value,
    pub output: Value,
    pub confidence: f64,
}

pub struct HitlManager {
    handlers: HashMap<AgentKind, Arc<dyn HitlHandler>>,
    default_handler: Arc<dyn HitlHandler>,
    reviewer: Arc<dyn HumanReviewer>,
    context: Arc<ContextStore>,
    history: Arc<HistoryLog>,
    /// None waits indefinitely
    timeout: Option<Duration>,
    on_timeout: HitlTimeoutPolicy,
}

impl HitlManager {
    /// Manager with no agent-specific handlers
    pub fn new(
        reviewer: Arc<dyn HumanReviewer>,
        context: Arc<ContextStore>,
        history: Arc<HistoryLog>,
        config: &HitlConfig,
    ) -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler: Arc::new(DefaultHandler),
            reviewer,
            context,
            history,
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
            on_timeout: config.on_timeout,
        }
    }

    /// Manager with the extraction, analysis and visualization handlers
    pub fn with_default_handlers(
        reviewer: Arc<dyn HumanReviewer>,
        context: Arc<ContextStore>,
        history: Arc<HistoryLog>,
        config: &HitlConfig,
    ) -> Self {
        let mut manager = Self::new(reviewer, context, history, config);
        manager.register_handler(AgentKind::DataExtraction, Arc::new(ExtractionHandler));
        manager.register_handler(AgentKind::StatisticalAnalysis, Arc::new(AnalysisHandler));
        manager.register_handler(AgentKind::Visualization, Arc::new(VisualizationHandler));
        manager
    }

    pub fn register_handler(&mut self, agent: AgentKind, handler: Arc<dyn HitlHandler>) {
        tracing::debug!("Registered HITL handler for {}", agent);
        self.handlers.insert(agent, handler);
    }

    pub fn has_handler(&self, agent: &AgentKind) -> bool {
        self.handlers.contains_key(agent)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Ids of reviews currently waiting on a human
    pub fn pending_reviews(&self) -> Vec<String> {
        self.context
            .keys_with_prefix(PENDING_PREFIX)
            .into_iter()
            .map(|key| key[PENDING_PREFIX.len()..].to_string())
            .collect()
    }

    pub async fn process(&self, request: HitlRequest<'_>) -> Result<HitlOutcome, EngineError> {
        let HitlRequest {
            workflow_id,
            agent,
            task,
            input,
            output,
            confidence,
        } = request;
        let request_id = uuid::Uuid::new_v4().to_string();
        let pending_key = format!("{}{}", PENDING_PREFIX, request_id);

        tracing::info!(
            "Escalating {}.{} to human review (confidence {:.1})",
            agent,
            task,
            confidence
        );

        self.history.append(
            HistoryEntry::new(HistoryKind::HitlRequest, agent.clone(), task)
                .with_workflow(workflow_id)
                .with_confidence(confidence)
                .with_field("request_id", request_id.clone()),
        );
        self.context.set(
            pending_key.clone(),
            json!({
                "agent": agent,
                "task": task,
                "workflow_id": workflow_id,
                "confidence": confidence,
                "requested_at": Utc::now().to_rfc3339(),
            }),
        );

        if let Err(e) = self
            .reviewer
            .notify(
                &format!(
                    "Review requested for {} task {} (confidence {:.1})",
                    agent.display_name(),
                    task,
                    confidence
                ),
                NotificationLevel::Info,
            )
            .await
        {
            tracing::warn!("Reviewer notification failed: {}", e);
        }

        let handler = match self.handlers.get(agent) {
            Some(handler) => Arc::clone(handler),
            None => {
                tracing::warn!("No HITL handler for {}, using default handler", agent);
                Arc::clone(&self.default_handler)
            }
        };

        let ctx = ReviewContext {
            agent,
            task,
            input,
            confidence,
            reviewer: self.reviewer.as_ref(),
        };
        let handled = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, handler.handle(&ctx, output.clone()))
                .await
                .ok(),
            None => Some(handler.handle(&ctx, output.clone()).await),
        };

        self.context.delete(&pending_key);

        let response = |status: &str| {
            HistoryEntry::new(HistoryKind::HitlResponse, agent.clone(), task)
                .with_workflow(workflow_id)
                .with_field("request_id", request_id.clone())
                .with_field("status", status)
        };

        match handled {
            Some(Ok(mut updated)) => {
                let Some(fields) = updated.as_object_mut() else {
                    let e = EngineError::HitlHandler(format!(
                        "{}.{} handler returned a non-object output",
                        agent, task
                    ));
                    self.history
                        .append(response("failed").with_field("error", e.to_string()));
                    return Err(e);
                };
                with_metadata(fields, |metadata| {
                    metadata.insert("hitl_applied".to_string(), Value::Bool(true));
                    metadata.insert(
                        "hitl_timestamp".to_string(),
                        Value::from(Utc::now().to_rfc3339()),
                    );
                    metadata.insert("hitl_confidence_before".to_string(), json!(confidence));
                });

                self.history.append(response("completed"));
                tracing::info!("HITL processing completed for {}.{}", agent, task);
                Ok(HitlOutcome::Reviewed(updated))
            }
            Some(Err(e)) => {
                self.history
                    .append(response("failed").with_field("error", e.to_string()));
                Err(e)
            }
            None => {
                let timeout_secs = self.timeout.map_or(0, |limit| limit.as_secs());
                self.history.append(response("timed_out"));
                tracing::warn!(
                    "Human review of {}.{} timed out after {}s",
                    agent,
                    task,
                    timeout_secs
                );

                if let Err(e) = self
                    .reviewer
                    .notify(
                        &format!("Review of {} task {} timed out", agent.display_name(), task),
                        NotificationLevel::Warning,
                    )
                    .await
                {
                    tracing::warn!("Reviewer notification failed: {}", e);
                }

                match self.on_timeout {
                    HitlTimeoutPolicy::Fail => Err(EngineError::HitlTimeout {
                        agent: agent.to_string(),
                        task: task.to_string(),
                        timeout_secs,
                    }),
                    HitlTimeoutPolicy::KeepOriginal => Ok(HitlOutcome::TimedOut(output)),
                }
            }
        }
    }
}
