//! Configuration management
//!
//! This module handles loading, validation, and management of the Assay configuration.
//! Configuration is stored in TOML format at ~/.assay/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **evaluator**: Confidence threshold, tier weights, LLM tier timeouts
//! - **stores**: Bounds for the context store, history log and caches
//! - **hitl**: Human review timeout and timeout policy
//! - **judge**: LLM judge provider (heuristic or ollama)
//! - **embedding**: Embedding provider (hashing or ollama)
//! - **pipeline**: Ordered stage list
//!
//! Every section except `core` may be omitted; omitted sections take their
//! defaults.
//!
//! # Examples
//!
//! ```no_run
//! use assay_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Threshold: {}", config.evaluator.confidence_threshold);
//! println!("Stages: {}", config.pipeline.stages.len());
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::types::AgentKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Tolerance used when checking that tier weights sum to one
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Confidence evaluator settings
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Store bounds
    #[serde(default)]
    pub stores: StoresConfig,

    /// Human-in-the-loop settings
    #[serde(default)]
    pub hitl: HitlConfig,

    /// LLM judge settings
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Embedding settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Pipeline stage layout
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Tiered confidence evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Scores below this trigger human review (0-100)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Fixed score assigned to human-verified outputs (0-100)
    #[serde(default = "default_hitl_confidence")]
    pub hitl_confidence: f64,

    #[serde(default = "default_rule_weight")]
    pub rule_weight: f64,

    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f64,

    #[serde(default = "default_llm_weight")]
    pub llm_weight: f64,

    /// Per-attempt timeout for the judge call
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Attempts before the LLM tier gives up
    #[serde(default = "default_llm_max_attempts")]
    pub llm_max_attempts: u32,

    /// Score used when every judge attempt fails
    #[serde(default)]
    pub llm_fallback_score: f64,
}

/// Bounds for the in-memory stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    #[serde(default = "default_store_capacity")]
    pub max_context_entries: usize,

    #[serde(default = "default_store_capacity")]
    pub max_history_entries: usize,

    #[serde(default = "default_store_capacity")]
    pub max_cache_entries: usize,

    #[serde(default = "default_store_capacity")]
    pub max_embedding_cache_entries: usize,
}

/// What happens when a human does not answer in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HitlTimeoutPolicy {
    /// Fail the stage, and with it the workflow
    #[default]
    Fail,
    /// Continue with the unverified output and its original score
    KeepOriginal,
}

/// Human-in-the-loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlConfig {
    /// Upper bound on a single review, 0 disables the bound
    #[serde(default = "default_hitl_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub on_timeout: HitlTimeoutPolicy,

    /// Artificial latency of the simulated reviewer
    #[serde(default)]
    pub reviewer_delay_ms: u64,
}

/// LLM judge backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JudgeProvider {
    /// Deterministic structural heuristics, no network
    #[default]
    Heuristic,
    /// Ollama chat endpoint
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default)]
    pub provider: JudgeProvider,

    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic feature hashing over the JSON structure
    #[default]
    Hashing,
    /// Ollama embeddings endpoint
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Vector width of the hashing embedder
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embedding_ollama")]
    pub ollama: OllamaConfig,
}

/// Ollama endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// HTTP request timeout
    #[serde(default = "default_ollama_timeout_secs")]
    pub timeout_secs: u64,
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, also the `{name}_result` key in the final result
    pub name: String,
    pub agent: AgentKind,
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_confidence_threshold() -> f64 {
    85.0
}

fn default_hitl_confidence() -> f64 {
    95.0
}

fn default_rule_weight() -> f64 {
    0.3
}

fn default_embedding_weight() -> f64 {
    0.3
}

fn default_llm_weight() -> f64 {
    0.4
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_llm_max_attempts() -> u32 {
    2
}

fn default_store_capacity() -> usize {
    1000
}

fn default_hitl_timeout_secs() -> u64 {
    300
}

fn default_embedding_dimensions() -> usize {
    128
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_ollama_timeout_secs() -> u64 {
    120
}

fn default_embedding_ollama() -> OllamaConfig {
    OllamaConfig {
        model: "nomic-embed-text".to_string(),
        ..OllamaConfig::default()
    }
}

fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            name: "extraction".to_string(),
            agent: AgentKind::DataExtraction,
            task: "extract_data".to_string(),
        },
        StageConfig {
            name: "analysis".to_string(),
            agent: AgentKind::StatisticalAnalysis,
            task: "analyze_data".to_string(),
        },
        StageConfig {
            name: "visualization".to_string(),
            agent: AgentKind::Visualization,
            task: "create_visualizations".to_string(),
        },
    ]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            hitl_confidence: default_hitl_confidence(),
            rule_weight: default_rule_weight(),
            embedding_weight: default_embedding_weight(),
            llm_weight: default_llm_weight(),
            llm_timeout_secs: default_llm_timeout_secs(),
            llm_max_attempts: default_llm_max_attempts(),
            llm_fallback_score: 0.0,
        }
    }
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            max_context_entries: default_store_capacity(),
            max_history_entries: default_store_capacity(),
            max_cache_entries: default_store_capacity(),
            max_embedding_cache_entries: default_store_capacity(),
        }
    }
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_hitl_timeout_secs(),
            on_timeout: HitlTimeoutPolicy::default(),
            reviewer_delay_ms: 0,
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: JudgeProvider::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            dimensions: default_embedding_dimensions(),
            ollama: default_embedding_ollama(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location (~/.assay/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    /// Validates the configuration after loading and returns descriptive errors
    /// if validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Create default configuration and save to path
    ///
    /// Creates the configuration directory if it doesn't exist, generates
    /// a default configuration, and saves it to the specified path.
    pub fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();
        config.validate()?;

        fs::write(path, config.to_toml_string()?)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Wrote default configuration to {}", path.display());
        Ok(config)
    }

    /// Get the default configuration file path (~/.assay/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".assay").join("config.toml"))
    }

    fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            evaluator: EvaluatorConfig::default(),
            stores: StoresConfig::default(),
            hitl: HitlConfig::default(),
            judge: JudgeConfig::default(),
            embedding: EmbeddingConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let eval = &self.evaluator;
        for (name, value) in [
            ("confidence_threshold", eval.confidence_threshold),
            ("hitl_confidence", eval.hitl_confidence),
            ("llm_fallback_score", eval.llm_fallback_score),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be between 0 and 100",
                    name
                )));
            }
        }

        for (name, weight) in [
            ("rule_weight", eval.rule_weight),
            ("embedding_weight", eval.embedding_weight),
            ("llm_weight", eval.llm_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::Config(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }

        let sum = eval.rule_weight + eval.embedding_weight + eval.llm_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::Config(format!(
                "Evaluator weights must sum to 1.0 (got {:.3})",
                sum
            )));
        }
        if eval.rule_weight + eval.embedding_weight <= 0.0 {
            return Err(EngineError::Config(
                "rule_weight and embedding_weight cannot both be zero".to_string(),
            ));
        }
        if eval.llm_max_attempts == 0 {
            return Err(EngineError::Config(
                "llm_max_attempts must be at least 1".to_string(),
            ));
        }

        for (name, capacity) in [
            ("max_context_entries", self.stores.max_context_entries),
            ("max_history_entries", self.stores.max_history_entries),
            ("max_cache_entries", self.stores.max_cache_entries),
            (
                "max_embedding_cache_entries",
                self.stores.max_embedding_cache_entries,
            ),
        ] {
            if capacity == 0 {
                return Err(EngineError::Config(format!(
                    "stores.{} must be greater than 0",
                    name
                )));
            }
        }

        if self.embedding.dimensions == 0 {
            return Err(EngineError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }

        for (name, ollama) in [
            ("judge.ollama", &self.judge.ollama),
            ("embedding.ollama", &self.embedding.ollama),
        ] {
            if !ollama.base_url.starts_with("http://") && !ollama.base_url.starts_with("https://")
            {
                return Err(EngineError::Config(format!(
                    "{}.base_url must be an http(s) URL",
                    name
                )));
            }
        }

        if self.pipeline.stages.is_empty() {
            return Err(EngineError::Config(
                "pipeline.stages must contain at least one stage".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for stage in &self.pipeline.stages {
            if stage.name.trim().is_empty() || stage.task.trim().is_empty() {
                return Err(EngineError::Config(
                    "Every pipeline stage needs a name and a task".to_string(),
                ));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "Duplicate pipeline stage '{}'",
                    stage.name
                )));
            }
        }

        Ok(())
    }
}
