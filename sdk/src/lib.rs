//! Assay SDK
//!
//! Shared library providing traits and types for Assay components.
//! This crate is used by the engine and by anything that plugs a task
//! performer, embedder, judge or human reviewer into it.

/// Capability traits consumed by the engine
pub mod capability;

/// Error types and handling
pub mod errors;

/// Task performer trait
pub mod performer;

/// Shared pipeline types
pub mod types;

// Re-export commonly used types
pub use capability::{Embedder, HumanReviewer, Judge};
pub use errors::{AssayErrorExt, EngineError};
pub use performer::{unsupported, TaskPerformer};
pub use types::{
    AgentKind, Assessment, HumanResponse, JudgeVerdict, NotificationLevel, ReviewPrompt,
    ReviewRequest,
};
