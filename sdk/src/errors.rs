//! Error types and handling
//!
//! This module provides the error types used throughout the Assay engine.
//! All errors implement the `AssayErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Payloads flowing through the pipeline may contain customer data, so error
//! messages carry identifiers (agent, task, workflow id) and never payload
//! contents.

use thiserror::Error;

/// Trait for Assay error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait AssayErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around (a judge that timed
    /// out, a reviewer that did not answer in time). Non-recoverable errors need
    /// a change in configuration or in the request itself.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Pipeline**: Unsupported tasks, unknown agents
/// - **Workflow**: Unknown workflows, illegal lifecycle transitions
/// - **Validation**: Validator, judge and embedder failures
/// - **HITL**: Reviewer timeouts and handler failures
/// - **Access**: Authentication and authorization failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{AssayErrorExt, EngineError};
///
/// let error = EngineError::Judge("connection refused".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::WorkflowNotFound("wf-1".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Pipeline errors
    #[error("Task '{task}' is not supported by {agent}")]
    UnsupportedTask { agent: String, task: String },

    #[error("No task performer registered for agent: {0}")]
    AgentNotFound(String),

    // Workflow errors
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow {id} is already {status}")]
    WorkflowTerminal { id: String, status: String },

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Judge error: {0}")]
    Judge(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    // Human-in-the-loop errors
    #[error("Human review for {agent}.{task} timed out after {timeout_secs}s")]
    HitlTimeout {
        agent: String,
        task: String,
        timeout_secs: u64,
    },

    #[error("HITL handler error: {0}")]
    HitlHandler(String),

    // Access errors
    #[error("Invalid or expired session")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssayErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",

            // Pipeline errors
            Self::UnsupportedTask { .. } => "The configured stage asks an agent for a task it does not perform",
            Self::AgentNotFound(_) => "Register a task performer for every agent named in the pipeline",

            // Workflow errors
            Self::WorkflowNotFound(_) => "Unknown workflow id. List workflows to see valid ids",
            Self::WorkflowTerminal { .. } => "Finished workflows cannot be modified",

            // Validation errors
            Self::Validation(_) => "Output validation failed",
            Self::Judge(_) => "The review model is unavailable. Check the judge provider settings",
            Self::Embedding(_) => "The embedding provider is unavailable. Check its settings",

            // Human-in-the-loop errors
            Self::HitlTimeout { .. } => {
                "No human response in time. Retry or raise hitl.timeout_secs"
            }
            Self::HitlHandler(_) => "Human review could not be applied",

            // Access errors
            Self::Unauthorized => "Log in again to obtain a fresh session",
            Self::PermissionDenied(_) => "Your role does not allow this operation",

            // Serialization errors
            Self::Serialization(_) => "Payload could not be encoded or decoded as JSON",

            // Network errors
            Self::Network(_) => "Network operation failed. Check your connection",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::UnsupportedTask { .. }
            | Self::AgentNotFound(_)
            | Self::WorkflowNotFound(_)
            | Self::WorkflowTerminal { .. }
            | Self::PermissionDenied(_)
            | Self::Serialization(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
