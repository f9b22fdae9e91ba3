//! Shared pipeline types
//!
//! Types exchanged between the engine and the pluggable collaborators it
//! drives: agent identities, judge verdicts and human review prompts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a task-performing agent
///
/// Registries for performers, validation rules and HITL handlers are keyed by
/// this enum. `Custom` covers performers supplied by embedders of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentKind {
    DataExtraction,
    StatisticalAnalysis,
    Visualization,
    Custom(String),
}

impl AgentKind {
    /// Stable snake_case key used in configuration and history entries
    pub fn as_str(&self) -> &str {
        match self {
            AgentKind::DataExtraction => "data_extraction",
            AgentKind::StatisticalAnalysis => "statistical_analysis",
            AgentKind::Visualization => "visualization",
            AgentKind::Custom(name) => name,
        }
    }

    /// Human-facing name used in review prompts
    pub fn display_name(&self) -> String {
        match self {
            AgentKind::DataExtraction => "DataExtractionAgent".to_string(),
            AgentKind::StatisticalAnalysis => "StatisticalAnalysisAgent".to_string(),
            AgentKind::Visualization => "VisualizationAgent".to_string(),
            AgentKind::Custom(name) => name.clone(),
        }
    }
}

impl From<String> for AgentKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "data_extraction" => AgentKind::DataExtraction,
            "statistical_analysis" => AgentKind::StatisticalAnalysis,
            "visualization" => AgentKind::Visualization,
            _ => AgentKind::Custom(value),
        }
    }
}

impl From<&str> for AgentKind {
    fn from(value: &str) -> Self {
        AgentKind::from(value.to_string())
    }
}

impl From<AgentKind> for String {
    fn from(kind: AgentKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall judgement returned by an LLM judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Valid,
    PartiallyValid,
    Invalid,
}

impl Assessment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Assessment::Valid => "valid",
            Assessment::PartiallyValid => "partially_valid",
            Assessment::Invalid => "invalid",
        }
    }
}

/// Structured verdict produced by a judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub assessment: Assessment,

    /// Confidence in the assessment, 0-100
    pub confidence: f64,

    #[serde(default)]
    pub issues: Vec<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// What a judge is asked to review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub agent: AgentKind,
    pub task: String,
    pub input: Value,
    pub output: Value,
}

/// A prompt put in front of a human reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewPrompt {
    /// Open question; with options it becomes a selection
    Question {
        text: String,
        #[serde(default)]
        options: Vec<String>,
    },
    /// Ask the human to confirm a statement about some data
    Verification { statement: String, data: Value },
    /// Hand the human data to edit
    Review { instructions: String, data: Value },
}

/// A human reviewer's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HumanResponse {
    FreeText {
        text: String,
    },
    OptionSelected {
        option: String,
    },
    Verified {
        is_verified: bool,
        #[serde(default)]
        notes: Option<String>,
    },
    Edited {
        data: Value,
        #[serde(default)]
        notes: Option<String>,
    },
}

/// Severity of a reviewer notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}
