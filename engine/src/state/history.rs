//! Append-only audit log of scoring and escalation events
//!
//! Every stage completion and every human review request/response lands here.
//! The log keeps at most `max_entries` entries; once exceeded, the oldest are
//! dropped first. Entries are never modified after being appended.

use chrono::{DateTime, Utc};
use sdk::types::AgentKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Kind of event recorded in the history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    StageCompleted,
    HitlRequest,
    HitlResponse,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::StageCompleted => "stage_completed",
            HistoryKind::HitlRequest => "hitl_request",
            HistoryKind::HitlResponse => "hitl_response",
        }
    }
}

/// One history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: HistoryKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    pub agent: AgentKind,
    pub task: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    pub timestamp: DateTime<Utc>,

    /// Event-specific extras (`hitl_triggered`, `status`, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl HistoryEntry {
    pub fn new(kind: HistoryKind, agent: AgentKind, task: impl Into<String>) -> Self {
        Self {
            kind,
            workflow_id: None,
            agent,
            task: task.into(),
            confidence: None,
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    pub fn with_workflow(mut self, workflow_id: Option<&str>) -> Self {
        self.workflow_id = workflow_id.map(str::to_string);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Bounded append-only history
#[derive(Debug)]
pub struct HistoryLog {
    entries: Mutex<VecDeque<HistoryEntry>>,
    max_entries: usize,
}

impl HistoryLog {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, entry: HistoryEntry) {
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Query entries
    ///
    /// `kind` filters by event type, `limit` caps the number returned (taken
    /// from the newest end), and `newest_first` flips the result order.
    pub fn entries(
        &self,
        kind: Option<HistoryKind>,
        limit: Option<usize>,
        newest_first: bool,
    ) -> Vec<HistoryEntry> {
        let entries = self.lock();
        let matching: Vec<&HistoryEntry> = entries
            .iter()
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .collect();

        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        let mut selected: Vec<HistoryEntry> =
            matching.into_iter().skip(skip).cloned().collect();

        if newest_first {
            selected.reverse();
        }
        selected
    }

    /// All entries for one workflow, oldest first
    pub fn for_workflow(&self, workflow_id: &str) -> Vec<HistoryEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.workflow_id.as_deref() == Some(workflow_id))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(1000)
    }
}
