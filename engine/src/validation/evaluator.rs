//! Tiered confidence evaluator
//!
//! Scores a task output by blending the rule, embedding and LLM tiers:
//!
//! ```text
//! partial = (r*wr + e*we) / (wr + we)
//! partial >= threshold  -> score = partial        (LLM tier skipped)
//! otherwise             -> score = r*wr + e*we + l*wl
//! ```
//!
//! Human-verified outputs bypass every tier and receive the fixed
//! `hitl_confidence`. A failing tier never fails the evaluation: rule and
//! embedding failures score 0, LLM failures score `llm_fallback_score`.

use sdk::types::AgentKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{clamp_score, ValidationCache, ValidationSubject, Validator, ValidatorTier};
use crate::config::EvaluatorConfig;

/// Blend weights for the three tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    pub rule: f64,
    pub embedding: f64,
    pub llm: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            rule: 0.3,
            embedding: 0.3,
            llm: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorSettings {
    pub threshold: f64,
    pub hitl_confidence: f64,
    pub weights: TierWeights,
    pub llm_fallback_score: f64,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            threshold: 85.0,
            hitl_confidence: 95.0,
            weights: TierWeights::default(),
            llm_fallback_score: 0.0,
        }
    }
}

impl From<&EvaluatorConfig> for EvaluatorSettings {
    fn from(config: &EvaluatorConfig) -> Self {
        Self {
            threshold: config.confidence_threshold,
            hitl_confidence: config.hitl_confidence,
            weights: TierWeights {
                rule: config.rule_weight,
                embedding: config.embedding_weight,
                llm: config.llm_weight,
            },
            llm_fallback_score: config.llm_fallback_score,
        }
    }
}

/// How a score was reached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<f64>,
    /// Rule and embedding blend, renormalized over their weights
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<f64>,
    pub llm_skipped: bool,
    /// Tiers that failed and contributed their fallback score
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<ValidatorTier>,
    pub cache_hits: u32,
    pub hitl_verified: bool,
}

struct TierScore {
    score: f64,
    cached: bool,
    degraded: bool,
}

pub struct ConfidenceEvaluator {
    rule: Arc<dyn Validator>,
    embedding: Arc<dyn Validator>,
    llm: Arc<dyn Validator>,
    cache: Arc<ValidationCache>,
    settings: EvaluatorSettings,
}

impl ConfidenceEvaluator {
    pub fn new(
        rule: Arc<dyn Validator>,
        embedding: Arc<dyn Validator>,
        llm: Arc<dyn Validator>,
        cache: Arc<ValidationCache>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            rule,
            embedding,
            llm,
            cache,
            settings,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.settings.threshold
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    /// Confidence score in [0, 100]
    pub async fn evaluate(
        &self,
        agent: &AgentKind,
        task: &str,
        input: &Value,
        output: &Value,
        is_hitl_result: bool,
    ) -> f64 {
        self.evaluate_detailed(agent, task, input, output, is_hitl_result)
            .await
            .score
    }

    pub async fn evaluate_detailed(
        &self,
        agent: &AgentKind,
        task: &str,
        input: &Value,
        output: &Value,
        is_hitl_result: bool,
    ) -> ConfidenceBreakdown {
        if is_hitl_result {
            return ConfidenceBreakdown {
                score: clamp_score(self.settings.hitl_confidence),
                hitl_verified: true,
                ..Default::default()
            };
        }

        let subject = ValidationSubject {
            agent,
            task,
            input,
            output,
        };
        let weights = self.settings.weights;
        let mut breakdown = ConfidenceBreakdown::default();

        let rule = self.run_tier(self.rule.as_ref(), &subject, 0.0).await;
        let embedding = self.run_tier(self.embedding.as_ref(), &subject, 0.0).await;
        for tier in [&rule, &embedding] {
            breakdown.cache_hits += u32::from(tier.cached);
        }
        if rule.degraded {
            breakdown.degraded.push(ValidatorTier::Rule);
        }
        if embedding.degraded {
            breakdown.degraded.push(ValidatorTier::Embedding);
        }

        let blended = rule.score * weights.rule + embedding.score * weights.embedding;
        let partial_weight = weights.rule + weights.embedding;
        let partial = if partial_weight > 0.0 {
            clamp_score(blended / partial_weight)
        } else {
            0.0
        };

        breakdown.rule = Some(rule.score);
        breakdown.embedding = Some(embedding.score);
        breakdown.partial = Some(partial);

        if partial >= self.settings.threshold {
            tracing::debug!(
                "{}.{}: partial {:.1} clears threshold {:.1}, skipping LLM tier",
                agent,
                task,
                partial,
                self.settings.threshold
            );
            breakdown.llm_skipped = true;
            breakdown.score = partial;
            return breakdown;
        }

        let llm = self
            .run_tier(
                self.llm.as_ref(),
                &subject,
                self.settings.llm_fallback_score,
            )
            .await;
        breakdown.cache_hits += u32::from(llm.cached);
        if llm.degraded {
            breakdown.degraded.push(ValidatorTier::Llm);
        }
        breakdown.llm = Some(llm.score);
        breakdown.score = clamp_score(blended + llm.score * weights.llm);

        tracing::debug!(
            "{}.{}: rule={:.1} embedding={:.1} llm={:.1} -> {:.1}",
            agent,
            task,
            rule.score,
            embedding.score,
            llm.score,
            breakdown.score
        );

        breakdown
    }

    async fn run_tier(
        &self,
        validator: &dyn Validator,
        subject: &ValidationSubject<'_>,
        fallback: f64,
    ) -> TierScore {
        let tier = validator.tier();
        let key = ValidationCache::key(tier, subject);

        if let Some(report) = self.cache.get(&key) {
            tracing::debug!("Validation cache hit for {} tier", tier.as_str());
            return TierScore {
                score: clamp_score(report.score),
                cached: true,
                degraded: false,
            };
        }

        match validator.validate(subject).await {
            Ok(mut report) => {
                report.score = clamp_score(report.score);
                let score = report.score;
                self.cache.insert(key, report);
                TierScore {
                    score,
                    cached: false,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "{} tier failed for {}.{}, using fallback score {:.1}: {}",
                    tier.as_str(),
                    subject.agent,
                    subject.task,
                    fallback,
                    e
                );
                TierScore {
                    score: clamp_score(fallback),
                    cached: false,
                    degraded: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::TierReport;
    use async_trait::async_trait;
    use sdk::errors::EngineError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed score, or fails when `score` is None
    struct FixedValidator {
        tier: ValidatorTier,
        score: Option<f64>,
        calls: AtomicUsize,
    }

    impl FixedValidator {
        fn new(tier: ValidatorTier, score: Option<f64>) -> Arc<Self> {
            Arc::new(Self {
                tier,
                score,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Validator for FixedValidator {
        fn tier(&self) -> ValidatorTier {
            self.tier
        }

        async fn validate(&self, _subject: &ValidationSubject<'_>) -> Result<TierReport, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.score {
                Some(score) => Ok(TierReport {
                    tier: self.tier,
                    is_valid: true,
                    score,
                    message: "fixed".to_string(),
                    details: Value::Null,
                }),
                None => Err(EngineError::Judge("unavailable".to_string())),
            }
        }
    }

    struct PanickingValidator;

    #[async_trait]
    impl Validator for PanickingValidator {
        fn tier(&self) -> ValidatorTier {
            ValidatorTier::Llm
        }

        async fn validate(&self, _subject: &ValidationSubject<'_>) -> Result<TierReport, EngineError> {
            panic!("LLM tier must not run when the partial score clears the threshold");
        }
    }

    fn evaluator(
        rule: Arc<dyn Validator>,
        embedding: Arc<dyn Validator>,
        llm: Arc<dyn Validator>,
    ) -> ConfidenceEvaluator {
        ConfidenceEvaluator::new(
            rule,
            embedding,
            llm,
            Arc::new(ValidationCache::new(100)),
            EvaluatorSettings::default(),
        )
    }

    async fn score(evaluator: &ConfidenceEvaluator, output: Value) -> ConfidenceBreakdown {
        evaluator
            .evaluate_detailed(
                &AgentKind::DataExtraction,
                "extract_data",
                &json!({"data_source": "sales"}),
                &output,
                false,
            )
            .await
    }

    #[tokio::test]
    async fn test_llm_skipped_when_partial_clears_threshold() {
        let eval = evaluator(
            FixedValidator::new(ValidatorTier::Rule, Some(85.0)),
            FixedValidator::new(ValidatorTier::Embedding, Some(100.0)),
            Arc::new(PanickingValidator),
        );

        let breakdown = score(&eval, json!({"data": [1]})).await;
        assert!(breakdown.llm_skipped);
        assert!((breakdown.score - 92.5).abs() < 1e-9);
        assert_eq!(breakdown.llm, None);
    }

    #[tokio::test]
    async fn test_full_blend_below_threshold() {
        let llm = FixedValidator::new(ValidatorTier::Llm, Some(50.0));
        let eval = evaluator(
            FixedValidator::new(ValidatorTier::Rule, Some(60.0)),
            FixedValidator::new(ValidatorTier::Embedding, Some(60.0)),
            Arc::clone(&llm) as Arc<dyn Validator>,
        );

        let breakdown = score(&eval, json!({"data": [1]})).await;
        assert!(!breakdown.llm_skipped);
        assert_eq!(breakdown.partial, Some(60.0));
        // 60*0.3 + 60*0.3 + 50*0.4
        assert!((breakdown.score - 56.0).abs() < 1e-9);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_hitl_result_bypasses_validators() {
        let rule = FixedValidator::new(ValidatorTier::Rule, Some(0.0));
        let eval = evaluator(
            Arc::clone(&rule) as Arc<dyn Validator>,
            FixedValidator::new(ValidatorTier::Embedding, Some(0.0)),
            Arc::new(PanickingValidator),
        );

        let score = eval
            .evaluate(
                &AgentKind::Visualization,
                "create_visualizations",
                &json!({}),
                &json!({}),
                true,
            )
            .await;
        assert_eq!(score, 95.0);
        assert_eq!(rule.calls(), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_uses_fallback_and_is_not_cached() {
        let llm = FixedValidator::new(ValidatorTier::Llm, None);
        let eval = evaluator(
            FixedValidator::new(ValidatorTier::Rule, Some(60.0)),
            FixedValidator::new(ValidatorTier::Embedding, Some(60.0)),
            Arc::clone(&llm) as Arc<dyn Validator>,
        );

        let first = score(&eval, json!({"data": [1]})).await;
        assert_eq!(first.degraded, vec![ValidatorTier::Llm]);
        assert!((first.score - 36.0).abs() < 1e-9);

        let second = score(&eval, json!({"data": [1]})).await;
        assert_eq!(second.cache_hits, 2);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_rule_failure_scores_zero() {
        let eval = evaluator(
            FixedValidator::new(ValidatorTier::Rule, None),
            FixedValidator::new(ValidatorTier::Embedding, Some(100.0)),
            FixedValidator::new(ValidatorTier::Llm, Some(100.0)),
        );

        let breakdown = score(&eval, json!({})).await;
        assert_eq!(breakdown.rule, Some(0.0));
        assert_eq!(breakdown.degraded, vec![ValidatorTier::Rule]);
        assert!((breakdown.score - 70.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cache_hits_skip_validators() {
        let rule = FixedValidator::new(ValidatorTier::Rule, Some(85.0));
        let eval = evaluator(
            Arc::clone(&rule) as Arc<dyn Validator>,
            FixedValidator::new(ValidatorTier::Embedding, Some(100.0)),
            Arc::new(PanickingValidator),
        );

        let first = score(&eval, json!({"data": [1]})).await;
        let second = score(&eval, json!({"data": [1]})).await;
        assert_eq!(first.score, second.score);
        assert_eq!(second.cache_hits, 2);
        assert_eq!(rule.calls(), 1);

        // Any differing field is a miss
        score(&eval, json!({"data": [2]})).await;
        assert_eq!(rule.calls(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_clamped() {
        let eval = evaluator(
            FixedValidator::new(ValidatorTier::Rule, Some(-20.0)),
            FixedValidator::new(ValidatorTier::Embedding, Some(f64::NAN)),
            FixedValidator::new(ValidatorTier::Llm, Some(400.0)),
        );

        let breakdown = score(&eval, json!({})).await;
        assert_eq!(breakdown.rule, Some(0.0));
        assert_eq!(breakdown.embedding, Some(0.0));
        assert_eq!(breakdown.llm, Some(100.0));
        assert!((breakdown.score - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_settings_from_config() {
        let config = EvaluatorConfig::default();
        let settings = EvaluatorSettings::from(&config);
        assert_eq!(settings, EvaluatorSettings::default());
    }
}
