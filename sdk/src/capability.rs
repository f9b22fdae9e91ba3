//! Capabilities the engine consumes
//!
//! Embedding providers, LLM judges and human reviewers are external
//! collaborators. The engine only talks to them through these traits so that
//! tests and embedders can substitute deterministic implementations.

use crate::errors::EngineError;
use crate::types::{HumanResponse, JudgeVerdict, NotificationLevel, ReviewPrompt, ReviewRequest};
use async_trait::async_trait;
use serde_json::Value;

/// Turns a JSON payload into a vector
///
/// Implementations must be deterministic for a given payload: the engine
/// caches embeddings by content hash.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, data: &Value) -> Result<Vec<f32>, EngineError>;
}

/// Reviews a task output and returns a structured verdict
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, request: &ReviewRequest) -> Result<JudgeVerdict, EngineError>;
}

/// The human side of the HITL protocol
#[async_trait]
pub trait HumanReviewer: Send + Sync {
    /// Present a prompt and wait for the answer
    async fn ask(&self, prompt: ReviewPrompt) -> Result<HumanResponse, EngineError>;

    /// Fire-and-forget notification
    async fn notify(&self, message: &str, level: NotificationLevel) -> Result<(), EngineError>;
}
