//! Deterministic stand-in for a human reviewer
//!
//! Answers every prompt the same way: the first option of a question,
//! "verified" for verifications, and unchanged data for reviews. Used by the
//! CLI and by tests; interactive front ends implement [`HumanReviewer`]
//! themselves.

use async_trait::async_trait;
use sdk::capability::HumanReviewer;
use sdk::errors::EngineError;
use sdk::types::{HumanResponse, NotificationLevel, ReviewPrompt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SimulatedReviewer {
    /// Pause before each answer, to mimic review time
    delay: Duration,
    answered: AtomicUsize,
}

impl SimulatedReviewer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            answered: AtomicUsize::new(0),
        }
    }

    /// Number of prompts answered so far
    pub fn answered(&self) -> usize {
        self.answered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HumanReviewer for SimulatedReviewer {
    async fn ask(&self, prompt: ReviewPrompt) -> Result<HumanResponse, EngineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answered.fetch_add(1, Ordering::Relaxed);

        let response = match prompt {
            ReviewPrompt::Question { text, options } => match options.into_iter().next() {
                Some(option) => HumanResponse::OptionSelected { option },
                None => HumanResponse::FreeText {
                    text: format!("Simulated response to: {}", text),
                },
            },
            ReviewPrompt::Verification { .. } => HumanResponse::Verified {
                is_verified: true,
                notes: None,
            },
            ReviewPrompt::Review { data, .. } => HumanResponse::Edited {
                data,
                notes: Some("Reviewed without changes".to_string()),
            },
        };

        tracing::debug!("Simulated reviewer answered: {:?}", response);
        Ok(response)
    }

    async fn notify(&self, message: &str, level: NotificationLevel) -> Result<(), EngineError> {
        match level {
            NotificationLevel::Info => tracing::info!("Reviewer notification: {}", message),
            NotificationLevel::Warning => tracing::warn!("Reviewer notification: {}", message),
            NotificationLevel::Error => tracing::error!("Reviewer notification: {}", message),
        }
        Ok(())
    }
}
