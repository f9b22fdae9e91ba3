//! CLI interface for Assay
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running the pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Assay confidence-gated pipeline runner
///
/// Runs requests through extraction, analysis and visualization stages,
/// scoring each stage's output and escalating low-confidence results to a
/// human reviewer.
#[derive(Parser, Debug)]
#[command(name = "assay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one request through the pipeline
    Run {
        /// Data source handed to the extraction stage
        #[arg(short, long, default_value = "customer feedback")]
        data_source: String,

        /// Request id (defaults to the workflow id)
        #[arg(long, value_name = "ID")]
        request_id: Option<String>,

        /// Read the whole request from a JSON file instead
        #[arg(short, long, value_name = "FILE", conflicts_with_all = ["data_source", "request_id"])]
        file: Option<PathBuf>,
    },

    /// Run one request per data source, concurrently
    Batch {
        /// Data sources, one workflow each
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Show or validate the configuration
    Config {
        /// Only validate, do not print
        #[arg(long)]
        validate: bool,
    },
}
