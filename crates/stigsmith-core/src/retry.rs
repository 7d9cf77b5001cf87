//! Bounded retry with exponential backoff, per-attempt timeout and cancellation
//!
//! Every tool call the engine makes goes through [`call_with_retry`]:
//! - transient [`ToolError`]s and timeouts each consume one attempt
//! - definitive errors (not found, logic failures) return immediately
//! - the task's cancellation token is raced against both the call and the
//!   backoff sleep

use crate::config::RetryConfig;
use crate::error::{PhaseError, TimedOut, ToolError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff schedule derived from [`RetryConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Single attempt, no backoff
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let factor = self.multiplier.powi(i32::try_from(exponent).unwrap_or(32));
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

/// Run `call` until it succeeds, fails definitively, or the budget is spent
///
/// # Errors
/// - `PhaseError::Tool` for a non-retryable adapter error
/// - `PhaseError::Exhausted` once `policy.max_attempts` transient failures
///   or timeouts have been seen
/// - `PhaseError::Cancelled` if `cancel` fires first
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    operation: &'static str,
    mut call: F,
) -> Result<T, PhaseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ToolError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(PhaseError::Cancelled);
        }

        tracing::debug!(operation, attempt, max_attempts, "calling tool");
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PhaseError::Cancelled),
            outcome = tokio::time::timeout(timeout, call()) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(source)) if !source.is_retryable() => {
                return Err(PhaseError::Tool { operation, source });
            }
            Ok(Err(source)) => {
                tracing::warn!(operation, attempt, error = %source, "transient tool failure");
                last = source.to_string();
            }
            Err(_) => {
                let timed_out = TimedOut { after: timeout };
                tracing::warn!(operation, attempt, "{timed_out}");
                last = timed_out.to_string();
            }
        }

        if attempt < max_attempts {
            let delay = policy.backoff_for(attempt);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PhaseError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(PhaseError::Exhausted {
        operation,
        attempts: max_attempts,
        last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1_000),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(3), Duration::from_millis(400));
        assert_eq!(p.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(p.backoff_for(40), Duration::from_millis(1_000));
    }

    #[test]
    fn policy_from_config_never_zero_attempts() {
        let p: RetryPolicy = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        }
        .into();
        assert_eq!(p.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = call_with_retry(&policy(3), Duration::from_secs(5), &cancel, "acquire_stig", || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ToolError::transport("connection reset"))
                } else {
                    Ok("stig")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("stig"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<(), _> =
            call_with_retry(&policy(3), Duration::from_secs(5), &cancel, "find_baseline", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ToolError::not_found("baseline"))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(PhaseError::Tool {
                operation: "find_baseline",
                source: ToolError::NotFound { .. }
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<(), _> =
            call_with_retry(&policy(2), Duration::from_secs(5), &cancel, "provision_target", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ToolError::transport("registry down"))
                }
            })
            .await;

        match result {
            Err(PhaseError::Exhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(last.contains("registry down"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_consumes_an_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = call_with_retry(&policy(3), Duration::from_secs(1), &cancel, "run_validation", || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok::<_, ToolError>(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn only_timeouts_exhaust_with_timeout_message() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> =
            call_with_retry(&policy(2), Duration::from_millis(50), &cancel, "commit_memory", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        match result {
            Err(PhaseError::Exhausted { last, .. }) => assert!(last.contains("timed out")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_call() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> =
            call_with_retry(&policy(3), Duration::from_secs(600), &cancel, "implement_controls", || async {
                tokio::time::sleep(Duration::from_secs(300)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(PhaseError::Cancelled));
    }

    #[tokio::test]
    async fn cancelled_token_skips_call() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> =
            call_with_retry(&policy(3), Duration::from_secs(1), &cancel, "acquire_stig", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(PhaseError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
