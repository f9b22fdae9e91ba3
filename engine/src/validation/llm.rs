//! Judge-backed validation tier
//!
//! Wraps a [`Judge`] with a per-attempt timeout and a bounded retry loop.
//! When every attempt fails the error is returned; the evaluator decides how
//! to degrade.

use async_trait::async_trait;
use sdk::capability::Judge;
use sdk::errors::EngineError;
use sdk::types::{Assessment, JudgeVerdict, ReviewRequest};
use std::sync::Arc;
use std::time::Duration;

use super::{clamp_score, TierReport, ValidationSubject, Validator, ValidatorTier};

pub struct LlmValidator {
    judge: Arc<dyn Judge>,
    /// Zero disables the per-attempt timeout
    timeout: Duration,
    max_attempts: u32,
}

impl LlmValidator {
    pub fn new(judge: Arc<dyn Judge>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            judge,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    async fn attempt(&self, request: &ReviewRequest) -> Result<JudgeVerdict, EngineError> {
        if self.timeout.is_zero() {
            return self.judge.judge(request).await;
        }
        match tokio::time::timeout(self.timeout, self.judge.judge(request)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Judge(format!(
                "{} did not answer within {}s",
                self.judge.name(),
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

#[async_trait]
impl Validator for LlmValidator {
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Llm
    }

    async fn validate(&self, subject: &ValidationSubject<'_>) -> Result<TierReport, EngineError> {
        let request = ReviewRequest {
            agent: subject.agent.clone(),
            task: subject.task.to_string(),
            input: subject.input.clone(),
            output: subject.output.clone(),
        };

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.attempt(&request).await {
                Ok(verdict) => {
                    tracing::debug!(
                        "Judge {} on {}.{}: {} ({:.1})",
                        self.judge.name(),
                        subject.agent,
                        subject.task,
                        verdict.assessment.as_str(),
                        verdict.confidence
                    );
                    return Ok(TierReport {
                        tier: ValidatorTier::Llm,
                        is_valid: verdict.assessment != Assessment::Invalid,
                        score: clamp_score(verdict.confidence),
                        message: format!("Judge assessment: {}", verdict.assessment.as_str()),
                        details: serde_json::to_value(&verdict)?,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "Judge {} attempt {}/{} failed: {}",
                        self.judge.name(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::Judge("judge was never called".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::AgentKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times, then answers
    struct FlakyJudge {
        failures: u32,
        calls: AtomicU32,
        confidence: f64,
    }

    #[async_trait]
    impl Judge for FlakyJudge {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn judge(&self, _request: &ReviewRequest) -> Result<JudgeVerdict, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(EngineError::Network("connection refused".to_string()));
            }
            Ok(JudgeVerdict {
                assessment: Assessment::PartiallyValid,
                confidence: self.confidence,
                issues: vec!["minor".to_string()],
                suggestions: vec![],
            })
        }
    }

    struct SlowJudge;

    #[async_trait]
    impl Judge for SlowJudge {
        fn name(&self) -> &str {
            "slow"
        }

        async fn judge(&self, _request: &ReviewRequest) -> Result<JudgeVerdict, EngineError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(EngineError::Judge("unreachable".to_string()))
        }
    }

    async fn run(validator: &LlmValidator) -> Result<TierReport, EngineError> {
        let agent = AgentKind::StatisticalAnalysis;
        let input = json!({"data": [1, 2, 3]});
        let output = json!({"analysis_results": {"average_value": 2.0}});
        let subject = ValidationSubject {
            agent: &agent,
            task: "analyze_data",
            input: &input,
            output: &output,
        };
        validator.validate(&subject).await
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let judge = Arc::new(FlakyJudge {
            failures: 1,
            calls: AtomicU32::new(0),
            confidence: 150.0,
        });
        let validator =
            LlmValidator::new(Arc::clone(&judge) as Arc<dyn Judge>, Duration::from_secs(1), 2);
        let report = run(&validator).await.unwrap();
        assert_eq!(report.tier, ValidatorTier::Llm);
        assert!(report.is_valid);
        assert_eq!(report.score, 100.0);
        assert_eq!(report.details["assessment"], "partially_valid");
        assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let judge = Arc::new(FlakyJudge {
            failures: 5,
            calls: AtomicU32::new(0),
            confidence: 80.0,
        });
        let validator =
            LlmValidator::new(Arc::clone(&judge) as Arc<dyn Judge>, Duration::ZERO, 3);
        let err = run(&validator).await.unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let validator = LlmValidator::new(Arc::new(SlowJudge), Duration::from_millis(50), 1);
        let err = run(&validator).await.unwrap_err();
        assert!(matches!(err, EngineError::Judge(msg) if msg.contains("did not answer")));
    }
}
