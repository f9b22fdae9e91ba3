//! Pipeline orchestrator
//!
//! Runs each request through the configured stages in order. Every stage's
//! output is scored by the [`ConfidenceEvaluator`]; outputs below the
//! threshold go to the [`HitlManager`] once and are then re-scored as human
//! verified. Each stage's output becomes the next stage's input.
//!
//! Stage errors fail the workflow and are returned as-is: there is no partial
//! result.
//!
//! # Examples
//!
//! ```no_run
//! use assay_engine::config::Config;
//! use assay_engine::orchestrator::Orchestrator;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::builder(Config::default()).build()?;
//! let result = orchestrator
//!     .process_request(json!({"id": "R-1", "data_source": "customer feedback"}))
//!     .await?;
//! assert_eq!(result["status"], "completed");
//! # Ok(())
//! # }
//! ```

use sdk::capability::{Embedder, HumanReviewer, Judge};
use sdk::errors::EngineError;
use sdk::types::AgentKind;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::agents::PerformerRegistry;
use crate::auth::{AuthManager, Permission};
use crate::config::{Config, EmbeddingProvider, JudgeProvider, StageConfig};
use crate::hitl::{HitlHandler, HitlManager, HitlOutcome, HitlRequest, SimulatedReviewer};
use crate::llm::{HeuristicJudge, OllamaClient, OllamaEmbedder, OllamaJudge};
use crate::message_bus::{Event, MessageBus};
use crate::state::{ContextStore, HistoryEntry, HistoryKind, HistoryLog, WorkflowManager};
use crate::validation::{
    ConfidenceBreakdown, ConfidenceEvaluator, EmbeddingValidator, EvaluatorSettings,
    HashingEmbedder, LlmValidator, ReferenceLibrary, RuleValidator, ValidationCache, Validator,
};

/// Context store key holding a workflow's original request
pub fn request_key(workflow_id: &str) -> String {
    format!("workflow:{}:request", workflow_id)
}

/// Assembles an [`Orchestrator`] from configuration plus optional overrides
///
/// Anything not injected is built from the configuration: the default
/// performers, rule and embedding validators, the configured judge and
/// embedder, and a simulated reviewer.
pub struct OrchestratorBuilder {
    config: Config,
    performers: Option<PerformerRegistry>,
    rule_validator: Option<Arc<dyn Validator>>,
    embedding_validator: Option<Arc<dyn Validator>>,
    llm_validator: Option<Arc<dyn Validator>>,
    judge: Option<Arc<dyn Judge>>,
    embedder: Option<Arc<dyn Embedder>>,
    reviewer: Option<Arc<dyn HumanReviewer>>,
    hitl_handlers: Vec<(AgentKind, Arc<dyn HitlHandler>)>,
    bus: Option<Arc<MessageBus>>,
    auth: Option<Arc<AuthManager>>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            performers: None,
            rule_validator: None,
            embedding_validator: None,
            llm_validator: None,
            judge: None,
            embedder: None,
            reviewer: None,
            hitl_handlers: Vec::new(),
            bus: None,
            auth: None,
        }
    }

    pub fn performers(mut self, performers: PerformerRegistry) -> Self {
        self.performers = Some(performers);
        self
    }

    pub fn rule_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.rule_validator = Some(validator);
        self
    }

    pub fn embedding_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.embedding_validator = Some(validator);
        self
    }

    /// Replace the whole LLM tier; takes precedence over [`Self::judge`]
    pub fn llm_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.llm_validator = Some(validator);
        self
    }

    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn reviewer(mut self, reviewer: Arc<dyn HumanReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Override the HITL handler for one agent
    pub fn hitl_handler(mut self, agent: AgentKind, handler: Arc<dyn HitlHandler>) -> Self {
        self.hitl_handlers.push((agent, handler));
        self
    }

    pub fn message_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn auth(mut self, auth: Arc<AuthManager>) -> Self {
        self.auth = Some(auth);
        self
    }

    fn configured_judge(&self) -> Result<Arc<dyn Judge>, EngineError> {
        match self.config.judge.provider {
            JudgeProvider::Heuristic => Ok(Arc::new(HeuristicJudge::new())),
            JudgeProvider::Ollama => {
                let client = OllamaClient::from_config(&self.config.judge.ollama)
                    .map_err(|e| EngineError::Config(format!("Ollama judge: {}", e)))?;
                tracing::info!("Using Ollama judge model {}", client.model());
                Ok(Arc::new(OllamaJudge::new(client)))
            }
        }
    }

    fn configured_embedder(&self) -> Result<Arc<dyn Embedder>, EngineError> {
        let embedding = &self.config.embedding;
        match embedding.provider {
            EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(embedding.dimensions))),
            EmbeddingProvider::Ollama => {
                let client = OllamaClient::from_config(&embedding.ollama)
                    .map_err(|e| EngineError::Config(format!("Ollama embedder: {}", e)))?;
                tracing::info!("Using Ollama embedding model {}", client.model());
                Ok(Arc::new(OllamaEmbedder::new(client)))
            }
        }
    }

    pub fn build(self) -> Result<Orchestrator, EngineError> {
        self.config.validate()?;

        let stores = &self.config.stores;
        let context = Arc::new(ContextStore::new(stores.max_context_entries));
        let history = Arc::new(HistoryLog::new(stores.max_history_entries));
        let cache = Arc::new(ValidationCache::new(stores.max_cache_entries));

        let rule = match &self.rule_validator {
            Some(validator) => Arc::clone(validator),
            None => Arc::new(RuleValidator::with_default_rules()) as Arc<dyn Validator>,
        };

        let embedding = match &self.embedding_validator {
            Some(validator) => Arc::clone(validator),
            None => {
                let embedder = match &self.embedder {
                    Some(embedder) => Arc::clone(embedder),
                    None => self.configured_embedder()?,
                };
                Arc::new(EmbeddingValidator::new(
                    embedder,
                    ReferenceLibrary::with_defaults(),
                    stores.max_embedding_cache_entries,
                )) as Arc<dyn Validator>
            }
        };

        let evaluator_config = &self.config.evaluator;
        let llm = match &self.llm_validator {
            Some(validator) => Arc::clone(validator),
            None => {
                let judge = match &self.judge {
                    Some(judge) => Arc::clone(judge),
                    None => self.configured_judge()?,
                };
                Arc::new(LlmValidator::new(
                    judge,
                    Duration::from_secs(evaluator_config.llm_timeout_secs),
                    evaluator_config.llm_max_attempts,
                )) as Arc<dyn Validator>
            }
        };

        let evaluator = ConfidenceEvaluator::new(
            rule,
            embedding,
            llm,
            Arc::clone(&cache),
            EvaluatorSettings::from(evaluator_config),
        );

        let reviewer = match self.reviewer {
            Some(reviewer) => reviewer,
            None => Arc::new(SimulatedReviewer::new(Duration::from_millis(
                self.config.hitl.reviewer_delay_ms,
            ))),
        };
        let mut hitl = HitlManager::with_default_handlers(
            reviewer,
            Arc::clone(&context),
            Arc::clone(&history),
            &self.config.hitl,
        );
        for (agent, handler) in self.hitl_handlers {
            hitl.register_handler(agent, handler);
        }

        let performers = self.performers.unwrap_or_else(PerformerRegistry::with_defaults);
        let stages = self.config.pipeline.stages;
        for stage in &stages {
            let performer = performers.get(&stage.agent).map_err(|_| {
                EngineError::Config(format!(
                    "Stage '{}' uses agent {} which has no performer",
                    stage.name, stage.agent
                ))
            })?;
            if !performer.supports(&stage.task) {
                return Err(EngineError::Config(format!(
                    "Stage '{}' asks {} for unsupported task '{}'",
                    stage.name, stage.agent, stage.task
                )));
            }
        }

        tracing::info!(
            "Orchestrator ready with {} stages (threshold {})",
            stages.len(),
            evaluator.threshold()
        );

        Ok(Orchestrator {
            workflows: WorkflowManager::new(Arc::clone(&context)),
            context,
            history,
            cache,
            evaluator,
            hitl,
            performers,
            stages,
            bus: self.bus,
            auth: self.auth,
        })
    }
}

/// Drives requests through the pipeline
///
/// Shared behind `Arc` for concurrent workflows; every method takes `&self`.
pub struct Orchestrator {
    workflows: WorkflowManager,
    context: Arc<ContextStore>,
    history: Arc<HistoryLog>,
    cache: Arc<ValidationCache>,
    evaluator: ConfidenceEvaluator,
    hitl: HitlManager,
    performers: PerformerRegistry,
    stages: Vec<StageConfig>,
    bus: Option<Arc<MessageBus>>,
    auth: Option<Arc<AuthManager>>,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Orchestrator with every collaborator built from `config`
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        Self::builder(config).build()
    }

    pub fn workflows(&self) -> &WorkflowManager {
        &self.workflows
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    pub fn evaluator(&self) -> &ConfidenceEvaluator {
        &self.evaluator
    }

    pub fn hitl(&self) -> &HitlManager {
        &self.hitl
    }

    pub fn performers(&self) -> &PerformerRegistry {
        &self.performers
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    pub fn message_bus(&self) -> Option<&Arc<MessageBus>> {
        self.bus.as_ref()
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }

    /// Run a request through every stage
    ///
    /// Returns `{request_id, workflow_id, status: "completed", <stage>_result...}`.
    /// On a stage error the workflow is marked failed and the error returned.
    pub async fn process_request(&self, request: Value) -> Result<Value, EngineError> {
        let workflow_id = self.workflows.create(request.clone())?;
        self.context.set(request_key(&workflow_id), request.clone());

        let request_id = match request.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => workflow_id.clone(),
        };
        tracing::info!("Processing request {} as workflow {}", request_id, workflow_id);

        match self.run_stages(&workflow_id, &request_id, request).await {
            Ok(result) => {
                self.workflows.complete(&workflow_id, result.clone())?;
                self.publish(Event::WorkflowCompleted {
                    workflow_id: workflow_id.clone(),
                    request_id,
                })
                .await;
                Ok(result)
            }
            Err(e) => {
                if let Err(fail_err) = self.workflows.fail(&workflow_id, e.to_string()) {
                    tracing::error!("Could not mark workflow {} failed: {}", workflow_id, fail_err);
                }
                self.publish(Event::WorkflowFailed {
                    workflow_id,
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    /// [`Self::process_request`] on behalf of a session holding `execute`
    ///
    /// No workflow is created when the check fails.
    pub async fn process_request_as(&self, token: &str, request: Value) -> Result<Value, EngineError> {
        let auth = self.auth.as_ref().ok_or_else(|| {
            EngineError::Config("No auth manager attached to the orchestrator".to_string())
        })?;
        auth.check_permission(token, Permission::Execute)?;
        self.process_request(request).await
    }

    async fn run_stages(
        &self,
        workflow_id: &str,
        request_id: &str,
        request: Value,
    ) -> Result<Value, EngineError> {
        let mut result = Map::new();
        result.insert("request_id".to_string(), json!(request_id));
        result.insert("workflow_id".to_string(), json!(workflow_id));

        let mut input = request;
        for stage in &self.stages {
            let output = self.run_stage(workflow_id, stage, &input).await?;
            result.insert(format!("{}_result", stage.name), output.clone());
            input = output;
        }

        result.insert("status".to_string(), json!("completed"));
        Ok(Value::Object(result))
    }

    async fn run_stage(
        &self,
        workflow_id: &str,
        stage: &StageConfig,
        input: &Value,
    ) -> Result<Value, EngineError> {
        let agent = &stage.agent;
        let task = stage.task.as_str();
        self.publish(Event::StageStarted {
            workflow_id: workflow_id.to_string(),
            stage: stage.name.clone(),
            agent: agent.to_string(),
            task: task.to_string(),
        })
        .await;

        let output = as_object(self.performers.execute(agent, task, input).await?);
        let mut breakdown = self
            .evaluator
            .evaluate_detailed(agent, task, input, &output, false)
            .await;
        let initial_confidence = breakdown.score;
        tracing::info!(
            "Stage {} scored {:.1} (threshold {})",
            stage.name,
            initial_confidence,
            self.evaluator.threshold()
        );

        let hitl_triggered = initial_confidence < self.evaluator.threshold();
        let output = if hitl_triggered {
            self.publish(Event::HitlRequested {
                workflow_id: workflow_id.to_string(),
                stage: stage.name.clone(),
                confidence: initial_confidence,
            })
            .await;

            let outcome = self
                .hitl
                .process(HitlRequest {
                    workflow_id: Some(workflow_id),
                    agent,
                    task,
                    input,
                    output,
                    confidence: initial_confidence,
                })
                .await?;

            match outcome {
                HitlOutcome::Reviewed(reviewed) => {
                    breakdown = self
                        .evaluator
                        .evaluate_detailed(agent, task, input, &reviewed, true)
                        .await;
                    reviewed
                }
                HitlOutcome::TimedOut(original) => {
                    tracing::warn!(
                        "Stage {} continues unverified with confidence {:.1}",
                        stage.name,
                        initial_confidence
                    );
                    original
                }
            }
        } else {
            output
        };

        let confidence = breakdown.score;
        let output = with_confidence(output, confidence);

        self.history.append(
            HistoryEntry::new(HistoryKind::StageCompleted, agent.clone(), task)
                .with_workflow(Some(workflow_id))
                .with_confidence(confidence)
                .with_field("stage", stage.name.as_str())
                .with_field("hitl_triggered", hitl_triggered)
                .with_field("initial_confidence", initial_confidence),
        );
        self.workflows.add_step(
            workflow_id,
            "stage_completed",
            stage_step(stage, &breakdown, initial_confidence, hitl_triggered)?,
        )?;

        self.publish(Event::StageCompleted {
            workflow_id: workflow_id.to_string(),
            stage: stage.name.clone(),
            confidence,
            hitl_triggered,
        })
        .await;

        Ok(output)
    }
}

/// Wrap a non-object output as `{"value": ..}`
fn as_object(output: Value) -> Value {
    match output {
        Value::Object(_) => output,
        other => {
            let mut fields = Map::new();
            fields.insert("value".to_string(), other);
            Value::Object(fields)
        }
    }
}

/// Attach `confidence_score` to an output, wrapping it first if needed
fn with_confidence(output: Value, confidence: f64) -> Value {
    let mut fields = match as_object(output) {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.insert("confidence_score".to_string(), json!(confidence));
    Value::Object(fields)
}

fn stage_step(
    stage: &StageConfig,
    breakdown: &ConfidenceBreakdown,
    initial_confidence: f64,
    hitl_triggered: bool,
) -> Result<Value, EngineError> {
    Ok(json!({
        "stage": stage.name,
        "agent": stage.agent,
        "task": stage.task,
        "confidence": breakdown.score,
        "initial_confidence": initial_confidence,
        "hitl_triggered": hitl_triggered,
        "breakdown": serde_json::to_value(breakdown)?,
    }))
}
