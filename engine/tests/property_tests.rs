use assay_engine::config::{Config, HitlTimeoutPolicy};
use assay_engine::state::{ContextStore, HistoryEntry, HistoryKind, HistoryLog};
use assay_engine::validation::{
    ConfidenceEvaluator, EvaluatorSettings, TierReport, TierWeights, ValidationCache,
    ValidationSubject, Validator, ValidatorTier,
};
use async_trait::async_trait;
use proptest::prelude::*;
use sdk::errors::EngineError;
use sdk::types::AgentKind;
use serde_json::{json, Value};
use std::sync::Arc;

/// Validator returning a fixed, possibly out-of-range, score
struct FixedValidator(ValidatorTier, f64);

#[async_trait]
impl Validator for FixedValidator {
    fn tier(&self) -> ValidatorTier {
        self.0
    }

    async fn validate(&self, _: &ValidationSubject<'_>) -> Result<TierReport, EngineError> {
        Ok(TierReport {
            tier: self.0,
            is_valid: true,
            score: self.1,
            message: "fixed".to_string(),
            details: Value::Null,
        })
    }
}

fn evaluator(scores: [f64; 3], weights: TierWeights, threshold: f64) -> ConfidenceEvaluator {
    ConfidenceEvaluator::new(
        Arc::new(FixedValidator(ValidatorTier::Rule, scores[0])),
        Arc::new(FixedValidator(ValidatorTier::Embedding, scores[1])),
        Arc::new(FixedValidator(ValidatorTier::Llm, scores[2])),
        Arc::new(ValidationCache::new(16)),
        EvaluatorSettings {
            threshold,
            weights,
            ..Default::default()
        },
    )
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

// Final confidence stays in [0, 100] whatever the tiers report
proptest! {
    #[test]
    fn test_score_always_in_bounds(
        rule in -500.0..500.0f64,
        embedding in -500.0..500.0f64,
        llm in -500.0..500.0f64,
        rule_weight in 0.0..1.0f64,
        embedding_weight in 0.0..1.0f64,
        llm_weight in 0.0..1.0f64,
        threshold in 0.0..=100.0f64,
        hitl in any::<bool>(),
    ) {
        let weights = TierWeights { rule: rule_weight, embedding: embedding_weight, llm: llm_weight };
        let evaluator = evaluator([rule, embedding, llm], weights, threshold);
        let input = json!({"data_source": "sales"});
        let output = json!({"data": []});

        let score = block_on(evaluator.evaluate(
            &AgentKind::DataExtraction,
            "extract_data",
            &input,
            &output,
            hitl,
        ));
        prop_assert!((0.0..=100.0).contains(&score), "score {} out of range", score);
        if hitl {
            prop_assert_eq!(score, 95.0);
        }
    }
}

// Identical subjects share a cache key; changing any field changes it
proptest! {
    #[test]
    fn test_cache_key_idempotence(
        task in "[a-z_]{1,12}",
        other_task in "[a-z_]{1,12}",
        input in any::<i64>(),
        output in any::<i64>(),
        other_output in any::<i64>(),
        score in 0.0..=100.0f64,
    ) {
        let agent = AgentKind::StatisticalAnalysis;
        let input = json!({"value": input});
        let output = json!({"value": output});
        let subject = ValidationSubject { agent: &agent, task: &task, input: &input, output: &output };

        let cache = ValidationCache::new(8);
        let key = ValidationCache::key(ValidatorTier::Rule, &subject);
        prop_assert_eq!(&key, &ValidationCache::key(ValidatorTier::Rule, &subject));

        let report = TierReport {
            tier: ValidatorTier::Rule,
            is_valid: true,
            score,
            message: "stored".to_string(),
            details: Value::Null,
        };
        cache.insert(key.clone(), report.clone());
        prop_assert_eq!(cache.get(&key), Some(report));

        prop_assert_ne!(&key, &ValidationCache::key(ValidatorTier::Embedding, &subject));

        let changed = json!({"value": other_output});
        if changed != output {
            let other = ValidationSubject { output: &changed, ..subject };
            prop_assert_ne!(&key, &ValidationCache::key(ValidatorTier::Rule, &other));
        }
        if other_task != task {
            let other = ValidationSubject { task: &other_task, ..subject };
            prop_assert_ne!(&key, &ValidationCache::key(ValidatorTier::Rule, &other));
        }
    }
}

// History never exceeds its bound and drops the oldest first
proptest! {
    #[test]
    fn test_history_bound(max_entries in 1..50usize, appended in 0..200usize) {
        let log = HistoryLog::new(max_entries);
        for seq in 0..appended {
            log.append(
                HistoryEntry::new(HistoryKind::StageCompleted, AgentKind::Visualization, "create_visualizations")
                    .with_field("seq", seq),
            );
        }

        prop_assert!(log.len() <= max_entries);
        prop_assert_eq!(log.len(), appended.min(max_entries));

        let entries = log.entries(None, None, false);
        if let Some(oldest) = entries.first() {
            prop_assert_eq!(&oldest.fields["seq"], &json!(appended - entries.len()));
        }
        if let Some(newest) = entries.last() {
            prop_assert_eq!(&newest.fields["seq"], &json!(appended - 1));
        }
    }
}

// Context store keeps its bound and always holds the newest key
proptest! {
    #[test]
    fn test_context_store_bound(capacity in 1..20usize, inserted in 1..60usize) {
        let store = ContextStore::new(capacity);
        for i in 0..inserted {
            store.set(format!("key:{}", i), json!(i));
        }
        prop_assert_eq!(store.len(), inserted.min(capacity));
        let newest = format!("key:{}", inserted - 1);
        prop_assert_eq!(store.get(&newest), Some(json!(inserted - 1)));
    }
}

// Configuration survives a TOML round trip
proptest! {
    #[test]
    fn test_config_toml_round_trip(
        log_level in "error|warn|info|debug|trace",
        threshold in 0.0..=100.0f64,
        hitl_confidence in 0.0..=100.0f64,
        rule_weight in 0.05..0.45f64,
        embedding_weight in 0.05..0.45f64,
        timeout_secs in 0..=600u64,
        keep_original in any::<bool>(),
        max_history in 1..10_000usize,
    ) {
        let mut config = Config::default();
        config.core.log_level = log_level.clone();
        config.evaluator.confidence_threshold = threshold;
        config.evaluator.hitl_confidence = hitl_confidence;
        config.evaluator.rule_weight = rule_weight;
        config.evaluator.embedding_weight = embedding_weight;
        config.evaluator.llm_weight = 1.0 - rule_weight - embedding_weight;
        config.hitl.timeout_secs = timeout_secs;
        config.hitl.on_timeout = if keep_original {
            HitlTimeoutPolicy::KeepOriginal
        } else {
            HitlTimeoutPolicy::Fail
        };
        config.stores.max_history_entries = max_history;
        prop_assert!(config.validate().is_ok());

        let toml = config.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&toml).unwrap();

        prop_assert_eq!(parsed.core.log_level, log_level);
        prop_assert_eq!(parsed.evaluator.confidence_threshold, threshold);
        prop_assert_eq!(parsed.evaluator.hitl_confidence, hitl_confidence);
        prop_assert_eq!(parsed.evaluator.rule_weight, rule_weight);
        prop_assert_eq!(parsed.evaluator.embedding_weight, embedding_weight);
        prop_assert_eq!(parsed.evaluator.llm_weight, config.evaluator.llm_weight);
        prop_assert_eq!(parsed.hitl.timeout_secs, timeout_secs);
        prop_assert_eq!(parsed.hitl.on_timeout, config.hitl.on_timeout);
        prop_assert_eq!(parsed.stores.max_history_entries, max_history);
        prop_assert_eq!(parsed.pipeline.stages, config.pipeline.stages);
    }
}

// Weights that do not sum to one never validate
proptest! {
    #[test]
    fn test_unbalanced_weights_rejected(
        rule_weight in 0.0..1.0f64,
        embedding_weight in 0.0..1.0f64,
        llm_weight in 0.0..1.0f64,
    ) {
        prop_assume!((rule_weight + embedding_weight + llm_weight - 1.0).abs() > 1e-3);

        let mut config = Config::default();
        config.evaluator.rule_weight = rule_weight;
        config.evaluator.embedding_weight = embedding_weight;
        config.evaluator.llm_weight = llm_weight;
        prop_assert!(config.validate().is_err());
    }
}
