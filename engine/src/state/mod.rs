//! In-memory pipeline state
//!
//! - `context_store`: bounded key/value context shared across components
//! - `history`: append-only audit log of scoring and escalation events
//! - `workflow`: per-request lifecycle records
//! - `lru`: the bounded map behind the context store and the caches

pub mod context_store;
pub mod history;
pub mod lru;
pub mod workflow;

pub use context_store::ContextStore;
pub use history::{HistoryEntry, HistoryKind, HistoryLog};
pub use lru::BoundedLru;
pub use workflow::{Workflow, WorkflowManager, WorkflowStatus, WorkflowStep};
