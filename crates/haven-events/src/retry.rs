//! Bounded retry loop for handler invocations.
//!
//! Attempt `k` (1-indexed) that fails waits `base * 2^(k-1)` before attempt
//! `k + 1`. A timed-out attempt is a failure like any other. Panics inside a
//! handler are caught and treated as failures so that siblings keep running.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, error, warn};

use haven_types::event::{Delivery, DeliveryOutcome, Event};

use crate::handler::{EventHandler, RetryPolicy};

/// Upper bound on the exponent so the delay never overflows.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Counters updated by handler execution.
#[derive(Debug, Default)]
pub(crate) struct ExecutionCounters {
    pub retries: AtomicU64,
    pub timeouts: AtomicU64,
}

/// Delay before the attempt following failed attempt `attempt` (1-indexed).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(2u32.pow(exp))
}

enum AttemptFailure {
    Error(String),
    Panicked,
    TimedOut,
}

async fn attempt_once(
    handler: &dyn EventHandler,
    event: &Event,
    timeout: Option<Duration>,
) -> Result<(), AttemptFailure> {
    let call = AssertUnwindSafe(handler.handle(event)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(AttemptFailure::TimedOut),
        },
        None => call.await,
    };
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(AttemptFailure::Error(e.to_string())),
        Err(_) => Err(AttemptFailure::Panicked),
    }
}

/// Run one handler against one event under its retry policy.
///
/// Never returns an error: the final outcome is recorded in the returned
/// [`Delivery`].
pub(crate) async fn execute(
    handler: &dyn EventHandler,
    priority: i32,
    policy: &RetryPolicy,
    event: &Event,
    backoff_base: Duration,
    default_timeout: Option<Duration>,
    counters: &ExecutionCounters,
) -> Delivery {
    let max_attempts = policy.max_attempts();
    let timeout = policy.timeout_ms.map(Duration::from_millis).or(default_timeout);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(handler = handler.name(), topic = %event.topic, attempt, "invoking handler");

        let failure = match attempt_once(handler, event, timeout).await {
            Ok(()) => {
                return Delivery {
                    handler: handler.name().to_string(),
                    priority,
                    attempts: attempt,
                    outcome: DeliveryOutcome::Succeeded,
                };
            }
            Err(failure) => failure,
        };

        if matches!(failure, AttemptFailure::TimedOut) {
            counters.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = match failure {
            AttemptFailure::Error(message) => DeliveryOutcome::Failed { error: message },
            AttemptFailure::Panicked => DeliveryOutcome::Failed {
                error: "handler panicked".into(),
            },
            AttemptFailure::TimedOut => DeliveryOutcome::TimedOut,
        };

        if attempt >= max_attempts {
            let delivery = Delivery {
                handler: handler.name().to_string(),
                priority,
                attempts: attempt,
                outcome,
            };
            if let Some(err) = delivery.error() {
                error!(
                    topic = %event.topic,
                    event_id = %event.id,
                    error = %err,
                    "handler failed, giving up"
                );
            }
            return delivery;
        }

        let delay = backoff_delay(backoff_base, attempt);
        warn!(
            handler = handler.name(),
            topic = %event.topic,
            attempt,
            delay_ms = delay.as_millis() as u64,
            outcome = ?outcome,
            "handler failed, retrying after backoff"
        );
        counters.retries.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
    }
}
