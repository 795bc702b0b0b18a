//! Retry and failover control loop.
//!
//! One call drives one provider process at a time:
//!
//! ```text
//! attempting ──ok──▶ done
//!     │
//!   error ──▶ deciding ──switch──▶ attempting (next provider, same prompt)
//!                │    └──retry───▶ attempting (same provider, after backoff)
//!                └──escalate / attempts exhausted──▶ failed
//! ```
//!
//! Every failure is recorded with the provider manager, even when a later
//! attempt succeeds; the caller only ever sees the final outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use super::classifier::{self, ErrorCategory, RecoveryAction};
use super::events::RelayEvent;
use super::models::{Response, SendOptions};
use super::provider_manager::ProviderManager;
use crate::error::{ProviderAttempt, RelayError, Result};
use crate::providers::Provider;

// =============================================================================
// Backoff
// =============================================================================

/// Exponential backoff for retrying the same provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base × exp_base^retry`, capped.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64()).max(0.0);
        let scaled = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped
        };
        Duration::try_from_secs_f64(scaled).unwrap_or(self.max_delay)
    }
}

/// Attempt budget when none is configured.
#[must_use]
pub fn default_max_attempts(providers: usize) -> usize {
    providers.max(2)
}

// =============================================================================
// Conductor
// =============================================================================

#[derive(Debug, Clone)]
pub struct Conductor {
    manager: Arc<ProviderManager>,
    retry: RetryPolicy,
    max_attempts: usize,
}

impl Conductor {
    #[must_use]
    pub fn new(manager: Arc<ProviderManager>, retry: RetryPolicy) -> Self {
        let max_attempts = default_max_attempts(manager.len());
        Self {
            manager,
            retry,
            max_attempts,
        }
    }

    /// Override the attempt budget (minimum 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    #[must_use]
    pub const fn manager(&self) -> &Arc<ProviderManager> {
        &self.manager
    }

    /// Send a prompt, failing over between providers as needed.
    ///
    /// `provider` pins the first provider; the model option applies to that
    /// first provider only, since model names are provider-specific.
    ///
    /// # Errors
    ///
    /// - the provider's own error for permanent / unknown failures on the
    ///   first attempt, [`RelayError::Escalated`] with the attempt history
    ///   when earlier attempts had already failed
    /// - [`RelayError::NoProvidersAvailable`] once the chain or the attempt
    ///   budget is exhausted
    /// - [`RelayError::Cancelled`] if `options.cancel` fires
    pub async fn send_message(
        &self,
        prompt: &str,
        provider: Option<&str>,
        options: SendOptions,
    ) -> Result<Response> {
        let mut current: Arc<dyn Provider> = self.manager.select_provider(provider)?;
        let mut attempts: Vec<ProviderAttempt> = Vec::new();
        let mut abandoned: Vec<String> = Vec::new();
        let mut retries_on_current: u32 = 0;
        let mut request = options;

        for attempt in 1..=self.max_attempts {
            if request.cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }

            let name = current.name().to_string();
            tracing::info!(
                provider = %name,
                attempt,
                max_attempts = self.max_attempts,
                "Sending prompt"
            );

            let started = Instant::now();
            let err = match current.send_message(prompt, &request).await {
                Ok(response) => {
                    self.manager.record_success(&name, response.duration);
                    self.emit_usage(&response);
                    tracing::info!(
                        provider = %name,
                        attempt,
                        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Prompt succeeded"
                    );
                    if !attempts.is_empty() {
                        tracing::info!(
                            provider = %name,
                            recovered_failures = attempts.len(),
                            "Recovered after failures"
                        );
                    }
                    return Ok(response);
                }
                Err(RelayError::Cancelled) => return Err(RelayError::Cancelled),
                Err(err) => err,
            };

            let category = err
                .category()
                .unwrap_or_else(|| classifier::classify(&err.to_string(), current.error_patterns()));
            let circuit_open = self.manager.record_failure(&name, category);
            if category == ErrorCategory::RateLimited {
                let reset_at = err.retry_after().and_then(|d| {
                    chrono::Duration::from_std(d)
                        .ok()
                        .map(|d| self.manager.now() + d)
                });
                self.manager.mark_rate_limited(&name, reset_at);
            }
            attempts.push(ProviderAttempt::new(&name, Some(category), err.to_string()));

            let action = if circuit_open || matches!(err, RelayError::CliNotFound { .. }) {
                RecoveryAction::SwitchProvider
            } else {
                category.action()
            };

            tracing::warn!(
                provider = %name,
                attempt,
                category = %category,
                action = ?action,
                error = %err,
                "Provider attempt failed"
            );

            match action {
                RecoveryAction::Escalate => {
                    tracing::warn!(
                        attempts = attempts.len(),
                        "Escalating non-recoverable failure"
                    );
                    if attempts.len() == 1 {
                        return Err(err);
                    }
                    return Err(RelayError::Escalated {
                        attempts,
                        cause: Box::new(err),
                    });
                }
                RecoveryAction::SwitchProvider => {
                    abandoned.push(name.clone());
                    if attempt >= self.max_attempts {
                        break;
                    }
                    let skip: Vec<&str> = abandoned.iter().map(String::as_str).collect();
                    let Some(next) = self.manager.switch_provider(&name, category.as_str(), &skip)
                    else {
                        tracing::warn!(provider = %name, "No fallback provider available");
                        break;
                    };
                    current = next;
                    retries_on_current = 0;
                    // Model names do not carry across providers.
                    request.model = None;
                }
                RecoveryAction::RetryWithBackoff => {
                    if attempt >= self.max_attempts {
                        break;
                    }
                    let delay = self.retry.delay_for(retries_on_current);
                    retries_on_current += 1;
                    tracing::info!(
                        provider = %name,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Backing off before retry"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = request.cancel.cancelled() => return Err(RelayError::Cancelled),
                    }
                }
            }
        }

        let err = RelayError::NoProvidersAvailable {
            attempts,
            earliest_reset: self.manager.earliest_reset(),
        };
        tracing::error!(
            attempted = ?err.attempted_providers(),
            "All providers exhausted"
        );
        Err(err)
    }

    fn emit_usage(&self, response: &Response) {
        if let Some(usage) = response.usage {
            self.manager.events().emit(&RelayEvent::TokenUsage {
                provider: response.provider.clone(),
                model: response.model.clone(),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                total_tokens: usage.total_tokens,
                timestamp: self.manager.now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let policy = RetryPolicy::default();
        for retry in 0..5 {
            let full = no_jitter().delay_for(retry);
            let jittered = policy.delay_for(retry);
            assert!(jittered <= full, "{jittered:?} > {full:?}");
            assert!(jittered >= full / 2, "{jittered:?} < half of {full:?}");
        }
    }

    #[test]
    fn default_attempt_budget() {
        assert_eq!(default_max_attempts(0), 2);
        assert_eq!(default_max_attempts(1), 2);
        assert_eq!(default_max_attempts(4), 4);
    }
}
