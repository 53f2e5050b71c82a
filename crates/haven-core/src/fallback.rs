//! Bounded fallback execution.
//!
//! The primary target is tried first, then each declared fallback in
//! order. Every attempt is bounded by the per-target timeout and by what
//! is left of the query deadline; once the deadline passes no further
//! targets are tried. Confidence is discounted once per hop.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use haven_types::error::HavenError;
use haven_types::routing::ProcessingTarget;

use crate::provider::{Invocation, InvocationParams, ProviderError, TargetRegistry};

/// Fallback settings for one query.
#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    /// Multiplier applied to confidence per hop.
    pub discount: f64,
    /// Upper bound on a single target call.
    pub target_timeout: Duration,
    /// Point after which no new attempt starts.
    pub deadline: Instant,
}

/// Record of one target attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub target: ProcessingTarget,
    /// Position in the chain; 0 is the primary.
    pub hop: usize,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A target that answered.
#[derive(Debug, Clone)]
pub struct Served {
    pub target: ProcessingTarget,
    pub invocation: Invocation,
    /// Base confidence times `discount^hop`.
    pub confidence: f64,
    pub hop: usize,
}

/// Everything the executor did for one query.
#[derive(Debug)]
pub struct FallbackRun {
    pub attempts: Vec<AttemptRecord>,
    pub outcome: Result<Served, HavenError>,
}

/// Try `chain` in order until a target answers.
///
/// Returns [`HavenError::Exhausted`] in `outcome` when every target failed
/// or the deadline passed first.
pub async fn execute(
    registry: &TargetRegistry,
    chain: &[ProcessingTarget],
    prompt: &str,
    params: &InvocationParams,
    base_confidence: f64,
    policy: FallbackPolicy,
) -> FallbackRun {
    let mut attempts = Vec::with_capacity(chain.len());
    let mut failures = Vec::new();

    for (hop, &target) in chain.iter().enumerate() {
        let now = Instant::now();
        let Some(remaining) = policy.deadline.checked_duration_since(now).filter(|d| !d.is_zero())
        else {
            warn!(%target, hop, "query deadline passed, not trying further targets");
            let skipped = HavenError::Timeout {
                operation: format!("query deadline before target {target}"),
            };
            failures.push(skipped.to_string());
            break;
        };
        let limit = remaining.min(policy.target_timeout);

        debug!(%target, hop, timeout_ms = limit.as_millis() as u64, "invoking target");
        let started = Instant::now();
        let result = match tokio::time::timeout(limit, registry.invoke(target, prompt, params)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(limit.as_millis() as u64)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(invocation) => {
                attempts.push(AttemptRecord {
                    target,
                    hop,
                    latency_ms: invocation.latency_ms.max(elapsed_ms),
                    success: true,
                    error: None,
                });
                let confidence = base_confidence * policy.discount.powi(hop as i32);
                return FallbackRun {
                    attempts,
                    outcome: Ok(Served {
                        target,
                        invocation,
                        confidence,
                        hop,
                    }),
                };
            }
            Err(err) => {
                warn!(
                    %target,
                    hop,
                    total_targets = chain.len(),
                    error = %err,
                    "target failed, trying next in fallback chain"
                );
                attempts.push(AttemptRecord {
                    target,
                    hop,
                    latency_ms: elapsed_ms,
                    success: false,
                    error: Some(err.to_string()),
                });
                failures.push(err.into_target_error(target).to_string());
            }
        }
    }

    FallbackRun {
        attempts,
        outcome: Err(HavenError::Exhausted { attempts: failures }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ModelProvider, ScriptedProvider, Usage};
    use async_trait::async_trait;
    use std::sync::Arc;

    use ProcessingTarget as T;

    fn params() -> InvocationParams {
        InvocationParams {
            temperature: 0.7,
            max_tokens: 128,
        }
    }

    fn policy(deadline: Duration) -> FallbackPolicy {
        FallbackPolicy {
            discount: 0.8,
            target_timeout: Duration::from_millis(50),
            deadline: Instant::now() + deadline,
        }
    }

    struct Hanging;

    #[async_trait]
    impl ModelProvider for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn invoke(
            &self,
            _target: ProcessingTarget,
            _prompt: &str,
            _params: &InvocationParams,
        ) -> Result<Invocation, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Invocation {
                content: String::new(),
                usage: Usage::default(),
                latency_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn primary_success_keeps_base_confidence() {
        let registry = TargetRegistry::uniform(Arc::new(ScriptedProvider::new()));
        let run = execute(
            &registry,
            &[T::EducationTutor, T::BalancedGeneral],
            "p",
            &params(),
            0.9,
            policy(Duration::from_secs(5)),
        )
        .await;
        let served = run.outcome.unwrap();
        assert_eq!(served.target, T::EducationTutor);
        assert_eq!(served.hop, 0);
        assert!((served.confidence - 0.9).abs() < 1e-9);
        assert_eq!(run.attempts.len(), 1);
    }

    #[tokio::test]
    async fn each_hop_discounts_confidence() {
        let provider = ScriptedProvider::new()
            .failing(T::EducationTutor)
            .failing(T::BalancedGeneral);
        let registry = TargetRegistry::uniform(Arc::new(provider));
        let run = execute(
            &registry,
            &[T::EducationTutor, T::BalancedGeneral, T::FastResponse],
            "p",
            &params(),
            0.9,
            policy(Duration::from_secs(5)),
        )
        .await;
        let served = run.outcome.unwrap();
        assert_eq!(served.target, T::FastResponse);
        assert_eq!(served.hop, 2);
        assert!((served.confidence - 0.9 * 0.8 * 0.8).abs() < 1e-9);
        let outcomes: Vec<bool> = run.attempts.iter().map(|a| a.success).collect();
        assert_eq!(outcomes, vec![false, false, true]);
    }

    #[tokio::test]
    async fn all_failing_is_exhausted_with_every_cause() {
        let provider = ScriptedProvider::new()
            .failing(T::CodeSpecialist)
            .failing(T::DeepReasoning);
        let registry = TargetRegistry::uniform(Arc::new(provider));
        let run = execute(
            &registry,
            &[T::CodeSpecialist, T::DeepReasoning],
            "p",
            &params(),
            0.9,
            policy(Duration::from_secs(5)),
        )
        .await;
        match run.outcome {
            Err(HavenError::Exhausted { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0], "target 'code-specialist' failed: invocation failed: code-specialist is scripted to fail");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_target_times_out_and_falls_back() {
        let registry = TargetRegistry::uniform(Arc::new(ScriptedProvider::new()))
            .with_target(T::LongContext, Arc::new(Hanging));
        let run = execute(
            &registry,
            &[T::LongContext, T::DeepReasoning],
            "p",
            &params(),
            0.9,
            policy(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(run.outcome.unwrap().target, T::DeepReasoning);
        assert!(run.attempts[0].error.as_deref().unwrap_or_default().contains("timeout"));
    }

    #[tokio::test]
    async fn deadline_stops_the_chain() {
        let registry = TargetRegistry::uniform(Arc::new(Hanging));
        let started = Instant::now();
        let run = execute(
            &registry,
            &[T::LongContext, T::DeepReasoning, T::BalancedGeneral],
            "p",
            &params(),
            0.9,
            FallbackPolicy {
                discount: 0.8,
                target_timeout: Duration::from_millis(40),
                deadline: Instant::now() + Duration::from_millis(60),
            },
        )
        .await;
        match run.outcome {
            Err(HavenError::Exhausted { attempts }) => {
                assert_eq!(attempts.len(), 3);
                assert!(attempts[0].starts_with("operation timed out: target long-context"));
                assert_eq!(
                    attempts[2],
                    "operation timed out: query deadline before target balanced-general"
                );
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(run.attempts.len(), 2);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn unmapped_target_counts_as_failure() {
        let registry = TargetRegistry::new()
            .with_target(T::BalancedGeneral, Arc::new(ScriptedProvider::new()));
        let run = execute(
            &registry,
            &[T::CreativeWriter, T::BalancedGeneral],
            "p",
            &params(),
            0.9,
            policy(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(run.outcome.unwrap().target, T::BalancedGeneral);
    }
}
