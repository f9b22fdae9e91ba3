//! Task performer trait
//!
//! Every pipeline stage is executed by a `TaskPerformer`. The engine knows
//! nothing about how a performer extracts, analyzes or renders data; it only
//! calls `execute` with the previous stage's output.

use crate::errors::EngineError;
use crate::types::AgentKind;
use async_trait::async_trait;
use serde_json::Value;

/// Trait that all task performers must implement
#[async_trait]
pub trait TaskPerformer: Send + Sync {
    /// Which agent this performer acts as
    fn kind(&self) -> AgentKind;

    /// Task names accepted by `execute`
    fn supported_tasks(&self) -> &[&'static str];

    /// Whether `task` is one of `supported_tasks`
    fn supports(&self, task: &str) -> bool {
        self.supported_tasks().contains(&task)
    }

    /// Run `task` against `input`
    ///
    /// Implementations return `EngineError::UnsupportedTask` for task names
    /// outside `supported_tasks`.
    async fn execute(&self, task: &str, input: &Value) -> Result<Value, EngineError>;
}

/// Build the standard error for a task a performer does not handle
pub fn unsupported(kind: &AgentKind, task: &str) -> EngineError {
    EngineError::UnsupportedTask {
        agent: kind.to_string(),
        task: task.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl TaskPerformer for Echo {
        fn kind(&self) -> AgentKind {
            AgentKind::Custom("echo".to_string())
        }

        fn supported_tasks(&self) -> &[&'static str] {
            &["echo"]
        }

        async fn execute(&self, task: &str, input: &Value) -> Result<Value, EngineError> {
            if !self.supports(task) {
                return Err(unsupported(&self.kind(), task));
            }
            Ok(input.clone())
        }
    }

    #[tokio::test]
    async fn test_supported_task_runs() {
        let out = Echo.execute("echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unsupported_task_is_rejected() {
        let err = Echo.execute("shout", &json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedTask { ref task, .. } if task == "shout"));
    }
}
