//! Reference task performers
//!
//! Three performers cover the default pipeline:
//!
//! - [`DataExtractionPerformer`]: sample records for a data source
//! - [`StatisticalAnalysisPerformer`]: descriptive statistics, anomalies,
//!   insights and topic clustering
//! - [`VisualizationPerformer`]: chart descriptors, dashboards and reports
//!
//! The [`PerformerRegistry`] maps each [`AgentKind`] to its performer.

use sdk::errors::EngineError;
use sdk::performer::TaskPerformer;
use sdk::types::AgentKind;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod analysis;
pub mod extraction;
pub mod visualization;

pub use analysis::StatisticalAnalysisPerformer;
pub use extraction::DataExtractionPerformer;
pub use visualization::VisualizationPerformer;

/// Performers keyed by agent kind
#[derive(Default, Clone)]
pub struct PerformerRegistry {
    performers: HashMap<AgentKind, Arc<dyn TaskPerformer>>,
}

impl PerformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three reference performers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DataExtractionPerformer::new()));
        registry.register(Arc::new(StatisticalAnalysisPerformer::new()));
        registry.register(Arc::new(VisualizationPerformer::new()));
        registry
    }

    /// Register a performer under its own kind, replacing any previous one
    pub fn register(&mut self, performer: Arc<dyn TaskPerformer>) {
        let kind = performer.kind();
        tracing::debug!(
            "Registered performer {} with {} tasks",
            kind,
            performer.supported_tasks().len()
        );
        self.performers.insert(kind, performer);
    }

    pub fn get(&self, agent: &AgentKind) -> Result<Arc<dyn TaskPerformer>, EngineError> {
        self.performers
            .get(agent)
            .map(Arc::clone)
            .ok_or_else(|| EngineError::AgentNotFound(agent.to_string()))
    }

    pub fn contains(&self, agent: &AgentKind) -> bool {
        self.performers.contains_key(agent)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.performers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Look up the performer and run `task`
    pub async fn execute(
        &self,
        agent: &AgentKind,
        task: &str,
        input: &Value,
    ) -> Result<Value, EngineError> {
        let performer = self.get(agent)?;
        if !performer.supports(task) {
            return Err(sdk::performer::unsupported(agent, task));
        }
        tracing::info!("Agent {} executing task {}", agent, task);
        let output = performer.execute(task, input).await?;
        tracing::debug!("Agent {} completed task {}", agent, task);
        Ok(output)
    }
}

/// Current UTC time as RFC 3339
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The `data` records of a payload, or an empty slice
pub(crate) fn records(input: &Value) -> &[Value] {
    input
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Numeric field of a record, 0 when absent
pub(crate) fn number(record: &Value, field: &str) -> f64 {
    record.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_kinds() {
        let registry = PerformerRegistry::with_defaults();
        assert_eq!(
            registry.kinds(),
            vec![
                AgentKind::DataExtraction,
                AgentKind::StatisticalAnalysis,
                AgentKind::Visualization
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let registry = PerformerRegistry::with_defaults();
        let err = registry
            .execute(&AgentKind::Custom("missing".to_string()), "x", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AgentNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_unsupported_task() {
        let registry = PerformerRegistry::with_defaults();
        let err = registry
            .execute(&AgentKind::DataExtraction, "analyze_data", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnsupportedTask { agent, task }
                if agent == "data_extraction" && task == "analyze_data"
        ));
    }

    #[test]
    fn test_record_helpers() {
        let input = json!({"data": [{"value": 3}, {"value": "x"}]});
        assert_eq!(records(&input).len(), 2);
        assert_eq!(number(&records(&input)[0], "value"), 3.0);
        assert_eq!(number(&records(&input)[1], "value"), 0.0);
        assert!(records(&json!({})).is_empty());
    }
}
