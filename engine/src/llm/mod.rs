//! LLM judge layer
//!
//! Everything needed to ask a language model whether a task output is
//! trustworthy: the review prompt, tolerant parsing of the verdict JSON, a
//! deterministic heuristic judge, and the Ollama adapters (chat judge and
//! embeddings).

use sdk::types::{Assessment, JudgeVerdict, ReviewRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod heuristic;
pub mod ollama;

pub use heuristic::HeuristicJudge;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaJudge};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a chat exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// System prompt sent ahead of every review
pub const REVIEWER_SYSTEM_PROMPT: &str = "You are a validation expert for AI systems. \
You answer with a single JSON object and nothing else.";

/// Build the review prompt for one task output
pub fn build_review_prompt(request: &ReviewRequest) -> String {
    let input_json =
        serde_json::to_string_pretty(&request.input).unwrap_or_else(|_| request.input.to_string());
    let output_json = serde_json::to_string_pretty(&request.output)
        .unwrap_or_else(|_| request.output.to_string());

    format!(
        "Please evaluate the output of an AI agent based on the input it received.\n\
         \n\
         Agent: {agent}\n\
         Task: {task}\n\
         \n\
         Input:\n\
         ```json\n{input}\n```\n\
         \n\
         Output:\n\
         ```json\n{output}\n```\n\
         \n\
         Evaluate the output against these criteria:\n\
         1. Correctness: Is the output factually correct and logically sound?\n\
         2. Completeness: Does the output address all aspects of the input?\n\
         3. Consistency: Is the output internally consistent?\n\
         4. Format: Is the output in the expected format?\n\
         \n\
         Reply with a JSON object with these fields:\n\
         - assessment: one of \"valid\", \"partially_valid\", \"invalid\"\n\
         - confidence: your confidence in this assessment (0-100)\n\
         - issues: a list of issues found\n\
         - suggestions: a list of suggestions for improvement\n",
        agent = request.agent.display_name(),
        task = request.task,
        input = input_json,
        output = output_json,
    )
}

/// Parse a judge reply into a verdict.
///
/// Handles multiple LLM output formats:
/// 1. Raw JSON object
/// 2. Fenced JSON (with or without trailing text)
/// 3. A JSON object embedded in prose
///
/// Assessment labels are matched loosely ("Partially Valid" is accepted) and
/// the confidence is clamped to 0-100.
pub fn parse_verdict(content: &str) -> Result<JudgeVerdict> {
    let trimmed = content.trim();

    let candidates = [
        Some(trimmed),
        extract_fenced_json(trimmed).map(str::trim),
        trimmed
            .find('{')
            .and_then(|pos| extract_balanced_json(&trimmed[pos..])),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(verdict) = verdict_from_value(&value) {
                return Ok(verdict);
            }
        }
    }

    Err(LLMError::ParseError(
        "Judge reply did not contain a verdict object".to_string(),
    ))
}

fn verdict_from_value(value: &Value) -> Option<JudgeVerdict> {
    let label = value
        .get("assessment")?
        .as_str()?
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_");
    let assessment = match label.as_str() {
        "valid" => Assessment::Valid,
        "partially_valid" => Assessment::PartiallyValid,
        "invalid" => Assessment::Invalid,
        _ => return None,
    };

    let confidence = match value.get("confidence")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok()?,
        _ => return None,
    };

    let strings = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    Some(JudgeVerdict {
        assessment,
        confidence: if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        },
        issues: strings("issues"),
        suggestions: strings("suggestions"),
    })
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::AgentKind;
    use serde_json::json;

    fn request() -> ReviewRequest {
        ReviewRequest {
            agent: AgentKind::StatisticalAnalysis,
            task: "analyze_data".to_string(),
            input: json!({"data": [1, 2]}),
            output: json!({"analysis_results": {"average_value": 1.5}}),
        }
    }

    #[test]
    fn test_prompt_mentions_agent_task_and_payloads() {
        let prompt = build_review_prompt(&request());
        assert!(prompt.contains("Agent: StatisticalAnalysisAgent"));
        assert!(prompt.contains("Task: analyze_data"));
        assert!(prompt.contains("\"average_value\": 1.5"));
        assert!(prompt.contains("partially_valid"));
    }

    #[test]
    fn test_parse_raw_json() {
        let verdict = parse_verdict(
            r#"{"assessment": "valid", "confidence": 92, "issues": [], "suggestions": ["none"]}"#,
        )
        .unwrap();
        assert_eq!(verdict.assessment, Assessment::Valid);
        assert_eq!(verdict.confidence, 92.0);
        assert_eq!(verdict.suggestions, vec!["none"]);
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let content = "Here is my review:\n```json\n{\"assessment\": \"Partially Valid\", \"confidence\": \"70%\", \"issues\": [\"missing trend\"]}\n```\nThanks!";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.assessment, Assessment::PartiallyValid);
        assert_eq!(verdict.confidence, 70.0);
        assert_eq!(verdict.issues, vec!["missing trend"]);
    }

    #[test]
    fn test_parse_embedded_object() {
        let content = r#"Verdict: {"assessment": "invalid", "confidence": 140, "issues": [{"field": "data"}]} end"#;
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.assessment, Assessment::Invalid);
        assert_eq!(verdict.confidence, 100.0);
        assert_eq!(verdict.issues, vec![r#"{"field":"data"}"#]);
    }

    #[test]
    fn test_parse_rejects_unknown_assessment() {
        assert!(matches!(
            parse_verdict(r#"{"assessment": "great", "confidence": 90}"#),
            Err(LLMError::ParseError(_))
        ));
        assert!(parse_verdict("no json here").is_err());
    }

    #[test]
    fn test_balanced_json_respects_strings() {
        let s = r#"{"a": "}{", "b": {"c": 1}} trailing"#;
        assert_eq!(extract_balanced_json(s), Some(r#"{"a": "}{", "b": {"c": 1}}"#));
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"test"}"#);
        assert_eq!(Message::system("s").role.to_string(), "system");
    }
}
