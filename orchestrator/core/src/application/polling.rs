// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded Polling
//!
//! The one retry helper every waiting state goes through. A step is invoked,
//! and while it reports `Pending` or `Transient` the helper sleeps with
//! exponential backoff (`initial * multiplier^attempt`, capped at
//! `max_delay`) until the cumulative sleep reaches the budget.
//!
//! `PropagationPending` is tolerated only while the cumulative time spent in
//! that state stays below `propagation_grace`; past that the resource is
//! treated as never having been created.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::domain::lifecycle_config::PollingConfig;
use crate::domain::step::{PendingReason, StepOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct PollingPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Cumulative sleep allowed before giving up
    pub budget: Duration,
    pub propagation_grace: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollingPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            budget: config.budget,
            propagation_grace: config.propagation_grace,
        }
    }
}

impl PollingPolicy {
    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let scaled = self.initial_delay.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PollError {
    #[error("{step} exceeded its polling budget of {budget:?} (last status: {last_status})")]
    BudgetExceeded {
        step: &'static str,
        budget: Duration,
        last_status: String,
    },

    #[error("{step} failed: {reason}")]
    Permanent { step: &'static str, reason: String },
}

/// Drive `check` until it reports `Done`, a permanent failure, or the
/// budget runs out.
pub async fn poll_until<T, F, Fut>(
    policy: &PollingPolicy,
    step: &'static str,
    mut check: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StepOutcome<T>>,
{
    let mut waited = Duration::ZERO;
    let mut propagation_waited = Duration::ZERO;
    let mut attempt: u32 = 0;

    loop {
        let (last_status, propagating) = match check().await {
            StepOutcome::Done(value) => return Ok(value),
            StepOutcome::Permanent(reason) => return Err(PollError::Permanent { step, reason }),
            StepOutcome::Pending(PendingReason::PropagationPending) => {
                if propagation_waited >= policy.propagation_grace {
                    return Err(PollError::Permanent {
                        step,
                        reason: format!(
                            "resource still not visible after a propagation grace of {:?}",
                            policy.propagation_grace
                        ),
                    });
                }
                (PendingReason::PropagationPending.to_string(), true)
            }
            StepOutcome::Pending(reason) => (reason.to_string(), false),
            StepOutcome::Transient(reason) => {
                metrics::counter!("aro_step_retries_total", "step" => step).increment(1);
                (reason, false)
            }
        };

        let remaining = policy.budget.saturating_sub(waited);
        if remaining.is_zero() {
            return Err(PollError::BudgetExceeded {
                step,
                budget: policy.budget,
                last_status,
            });
        }

        let delay = policy.delay_for(attempt).min(remaining);
        debug!(step, attempt, ?delay, status = %last_status, "Polling again after delay");
        tokio::time::sleep(delay).await;

        waited += delay;
        if propagating {
            propagation_waited += delay;
        }
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> PollingPolicy {
        PollingPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            budget: Duration::from_millis(40),
            propagation_grace: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_default_backoff_schedule() {
        let policy = PollingPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(30), Duration::from_secs(60));
        assert_eq!(policy.budget, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_pending_then_done() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = poll_until(&fast_policy(), "check", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    StepOutcome::in_progress("CREATING")
                } else {
                    StepOutcome::Done(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = poll_until(&fast_policy(), "start", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    StepOutcome::Transient("throttled".to_string())
                } else {
                    StepOutcome::Done(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_permanent_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = poll_until(&fast_policy(), "check", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StepOutcome::Permanent("CREATE_FAILED".to_string())
            }
        })
        .await;

        assert!(matches!(result, Err(PollError::Permanent { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exceeded() {
        let result: Result<(), _> = poll_until(&fast_policy(), "check", || async {
            StepOutcome::in_progress("DELETING")
        })
        .await;

        match result {
            Err(PollError::BudgetExceeded { step, last_status, .. }) => {
                assert_eq!(step, "check");
                assert!(last_status.contains("DELETING"));
            }
            other => panic!("expected budget exceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_propagation_pending_is_retried_within_grace() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = poll_until(&fast_policy(), "check", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    StepOutcome::Pending(PendingReason::PropagationPending)
                } else {
                    StepOutcome::Done("visible")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("visible"));
    }

    #[tokio::test]
    async fn test_propagation_pending_past_grace_is_permanent() {
        let result: Result<(), _> = poll_until(&fast_policy(), "check", || async {
            StepOutcome::Pending(PendingReason::PropagationPending)
        })
        .await;
        assert!(matches!(result, Err(PollError::Permanent { .. })));
    }
}
