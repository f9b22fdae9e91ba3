//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Run one request through the pipeline
//! - batch: Run several requests concurrently
//! - config: Show or validate the configuration

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::state::{HistoryKind, Workflow};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build a request from CLI flags
pub fn build_request(data_source: &str, request_id: Option<&str>) -> Value {
    let mut request = json!({ "data_source": data_source });
    if let Some(id) = request_id {
        request["id"] = json!(id);
    }
    request
}

/// Read a request from a JSON file; it must be an object
pub fn load_request(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let request: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Request file {} is not valid JSON", path.display()))?;
    if !request.is_object() {
        anyhow::bail!("Request file {} must contain a JSON object", path.display());
    }
    Ok(request)
}

/// One line per completed stage of a workflow
fn stage_lines(orchestrator: &Orchestrator, workflow_id: &str) -> Vec<String> {
    orchestrator
        .history()
        .for_workflow(workflow_id)
        .into_iter()
        .filter(|entry| entry.kind == HistoryKind::StageCompleted)
        .map(|entry| {
            let hitl = entry
                .fields
                .get("hitl_triggered")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            format!(
                "  {:<22} {:>6.1}{}",
                format!("{}.{}", entry.agent, entry.task),
                entry.confidence.unwrap_or_default(),
                if hitl { "  (human reviewed)" } else { "" }
            )
        })
        .collect()
}

fn failure_json(workflow: Option<&Workflow>, error: &str) -> Value {
    json!({
        "status": "failed",
        "workflow_id": workflow.map(|w| w.id.clone()),
        "error": error,
    })
}

/// Run one request through the pipeline
pub async fn handle_run(request: Value, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator =
        Orchestrator::from_config(config.clone()).context("Failed to build orchestrator")?;

    if let OutputFormat::Text = format {
        println!(
            "Running request through {} stages",
            orchestrator.stages().len()
        );
        println!();
    }

    match orchestrator.process_request(request).await {
        Ok(result) => {
            match format {
                OutputFormat::Text => {
                    let workflow_id = result["workflow_id"].as_str().unwrap_or_default();
                    println!("✓ Workflow {} completed", workflow_id);
                    println!("  Request: {}", result["request_id"].as_str().unwrap_or_default());
                    println!();
                    println!("Stage confidence:");
                    for line in stage_lines(&orchestrator, workflow_id) {
                        println!("{}", line);
                    }
                    let stats = orchestrator.cache().stats();
                    println!();
                    println!("  Cache: {} hits, {} misses", stats.hits, stats.misses);
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
            }
            Ok(())
        }
        Err(e) => {
            let failed = orchestrator
                .workflows()
                .list(Some(crate::state::WorkflowStatus::Failed));
            match format {
                OutputFormat::Text => {
                    println!("✗ Workflow failed: {}", e);
                }
                OutputFormat::Json => {
                    let output = failure_json(failed.first(), &e.to_string());
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Err(e.into())
        }
    }
}

/// Run one workflow per data source, concurrently
///
/// All workflows share one orchestrator; the command fails if any workflow
/// failed, after reporting every outcome.
pub async fn handle_batch(sources: Vec<String>, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = Arc::new(
        Orchestrator::from_config(config.clone()).context("Failed to build orchestrator")?,
    );

    let runs = sources.iter().enumerate().map(|(i, source)| {
        let orchestrator = Arc::clone(&orchestrator);
        let request = build_request(source, Some(&format!("batch-{}", i + 1)));
        async move { orchestrator.process_request(request).await }
    });
    let outcomes = futures::future::join_all(runs).await;

    let mut failures = 0;
    let mut reports = Vec::new();
    for (source, outcome) in sources.iter().zip(outcomes) {
        match outcome {
            Ok(result) => reports.push(json!({
                "data_source": source,
                "status": "completed",
                "request_id": result["request_id"],
                "workflow_id": result["workflow_id"],
            })),
            Err(e) => {
                failures += 1;
                reports.push(json!({
                    "data_source": source,
                    "status": "failed",
                    "error": e.to_string(),
                }));
            }
        }
    }

    match format {
        OutputFormat::Text => {
            for report in &reports {
                let mark = if report["status"] == "completed" { "✓" } else { "✗" };
                println!(
                    "{} {:<24} {}",
                    mark,
                    report["data_source"].as_str().unwrap_or_default(),
                    report["workflow_id"]
                        .as_str()
                        .or_else(|| report["error"].as_str())
                        .unwrap_or_default()
                );
            }
            println!();
            println!(
                "{} of {} workflows completed",
                reports.len() - failures,
                reports.len()
            );
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "workflows": reports,
                    "failed": failures,
                }))?
            );
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} workflows failed", failures, sources.len());
    }
    Ok(())
}

/// Show or validate the configuration
///
/// The configuration was already validated while loading; this re-checks it
/// and confirms the orchestrator can be assembled from it.
pub fn handle_config(validate: bool, config: &Config, format: OutputFormat) -> Result<()> {
    config.validate().context("Configuration is invalid")?;
    let orchestrator =
        Orchestrator::from_config(config.clone()).context("Pipeline cannot be assembled")?;

    match (validate, format) {
        (true, OutputFormat::Text) => {
            println!(
                "✓ Configuration is valid ({} stages)",
                orchestrator.stages().len()
            );
        }
        (true, OutputFormat::Json) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "valid": true,
                    "stages": orchestrator.stages().len(),
                }))?
            );
        }
        (false, OutputFormat::Text) => {
            print!("{}", config.to_toml_string()?);
        }
        (false, OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}
