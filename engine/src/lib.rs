//! Assay Engine Library
//!
//! This library provides the core functionality of the Assay pipeline engine.
//! It is used by both the main binary and integration tests.

/// Reference task performers and their registry
pub mod agents;

/// Session authentication and role permissions
pub mod auth;

/// CLI interface module
pub mod cli;

/// Configuration management module
pub mod config;

/// Command handlers module
pub mod handlers;

/// Human-in-the-loop escalation
pub mod hitl;

/// LLM judge and embedding providers
pub mod llm;

/// Message bus for pipeline progress events
pub mod message_bus;

/// Stage sequencing, scoring and escalation
pub mod orchestrator;

/// Context store, history log and workflow records
pub mod state;

/// Telemetry and Observability
pub mod telemetry;

/// Tiered output validation and confidence scoring
pub mod validation;
