//! Workflow lifecycle records
//!
//! One workflow per pipeline request. Status only moves forward:
//!
//! ```text
//! created ──add_step──▶ running ──complete──▶ completed
//!    │                     │
//!    └───────fail──────────┴──────fail──────▶ failed
//! ```
//!
//! Terminal workflows reject every further mutation with
//! `EngineError::WorkflowTerminal`. Each mutation also writes the full record to
//! the context store under `workflow:{id}`, inside the same critical section.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::context_store::ContextStore;

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(WorkflowStatus::Created),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            other => Err(EngineError::Validation(format!(
                "Unknown workflow status '{}'",
                other
            ))),
        }
    }
}

/// A single recorded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(rename = "type")]
    pub step_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle record for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub status: WorkflowStatus,
    pub request: Value,
    pub steps: Vec<WorkflowStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Free-form fields written through `update`
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub annotations: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::WorkflowTerminal {
                id: self.id.clone(),
                status: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// Owns every workflow record
pub struct WorkflowManager {
    workflows: Mutex<HashMap<String, Workflow>>,
    context: Arc<ContextStore>,
}

impl WorkflowManager {
    pub fn new(context: Arc<ContextStore>) -> Self {
        Self {
            workflows: Mutex::new(HashMap::new()),
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Workflow>> {
        self.workflows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Context store key mirroring a workflow
    pub fn context_key(id: &str) -> String {
        format!("workflow:{}", id)
    }

    fn mirror(&self, workflow: &Workflow) -> Result<(), EngineError> {
        self.context
            .set(Self::context_key(&workflow.id), serde_json::to_value(workflow)?);
        Ok(())
    }

    /// Create a workflow in `created` state and return its id
    pub fn create(&self, request: Value) -> Result<String, EngineError> {
        let now = Utc::now();
        let workflow = Workflow {
            id: uuid::Uuid::new_v4().to_string(),
            status: WorkflowStatus::Created,
            request,
            steps: Vec::new(),
            result: None,
            error: None,
            annotations: Map::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        };
        let id = workflow.id.clone();

        let mut workflows = self.lock();
        self.mirror(&workflow)?;
        workflows.insert(id.clone(), workflow);

        tracing::info!("Created workflow {}", id);
        Ok(id)
    }

    fn mutate<F>(&self, id: &str, apply: F) -> Result<Workflow, EngineError>
    where
        F: FnOnce(&mut Workflow) -> Result<(), EngineError>,
    {
        let mut workflows = self.lock();
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;

        workflow.ensure_open()?;
        apply(workflow)?;
        workflow.updated_at = Utc::now();

        self.mirror(workflow)?;
        Ok(workflow.clone())
    }

    /// Merge `fields` into the workflow's annotations
    ///
    /// The id is not part of the annotations and cannot be changed; an `id`
    /// key in `fields` is ignored.
    pub fn update(&self, id: &str, fields: Map<String, Value>) -> Result<Workflow, EngineError> {
        self.mutate(id, |workflow| {
            for (key, value) in fields {
                if key == "id" {
                    tracing::warn!("Ignoring attempt to change id of workflow {}", workflow.id);
                    continue;
                }
                workflow.annotations.insert(key, value);
            }
            Ok(())
        })
    }

    /// Append a step; the first step moves the workflow to `running`
    pub fn add_step(
        &self,
        id: &str,
        step_type: impl Into<String>,
        data: Value,
    ) -> Result<Workflow, EngineError> {
        let step_type = step_type.into();
        self.mutate(id, |workflow| {
            if workflow.status == WorkflowStatus::Created {
                workflow.status = WorkflowStatus::Running;
            }
            workflow.steps.push(WorkflowStep {
                step_type,
                data,
                timestamp: Utc::now(),
            });
            Ok(())
        })
    }

    pub fn complete(&self, id: &str, result: Value) -> Result<Workflow, EngineError> {
        let workflow = self.mutate(id, |workflow| {
            workflow.status = WorkflowStatus::Completed;
            workflow.result = Some(result);
            workflow.completed_at = Some(Utc::now());
            Ok(())
        })?;
        tracing::info!("Workflow {} completed", id);
        Ok(workflow)
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) -> Result<Workflow, EngineError> {
        let error = error.into();
        let workflow = self.mutate(id, |workflow| {
            workflow.status = WorkflowStatus::Failed;
            workflow.error = Some(error);
            workflow.failed_at = Some(Utc::now());
            Ok(())
        })?;
        tracing::warn!(
            "Workflow {} failed: {}",
            id,
            workflow.error.as_deref().unwrap_or_default()
        );
        Ok(workflow)
    }

    pub fn get(&self, id: &str) -> Result<Workflow, EngineError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))
    }

    /// Workflows ordered by creation time, optionally filtered by status
    pub fn list(&self, status: Option<WorkflowStatus>) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self
            .lock()
            .values()
            .filter(|workflow| status.map_or(true, |s| workflow.status == s))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        workflows
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
