//! Model execution interface.
//!
//! Targets are a closed enum, so provider dispatch is a table lookup in
//! [`TargetRegistry`]: each [`ProcessingTarget`] resolves to one
//! [`ModelProvider`], with an optional default for unmapped targets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use haven_types::error::HavenError;
use haven_types::routing::ProcessingTarget;

/// Errors a model provider can return. Every variant makes the fallback
/// executor move on to the next target.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider call failed.
    #[error("invocation failed: {0}")]
    Failed(String),

    /// The call did not finish within the per-target timeout.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// No provider is registered for the target.
    #[error("no provider configured for target {0}")]
    NotConfigured(ProcessingTarget),

    /// The provider answered with something unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Attribute the failure to `target`. Timeouts keep their own variant.
    pub fn into_target_error(self, target: ProcessingTarget) -> HavenError {
        match self {
            Self::Timeout(ms) => HavenError::Timeout {
                operation: format!("target {target} after {ms}ms"),
            },
            other => HavenError::TargetInvocation {
                target: target.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvocationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Token accounting for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// A successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub content: String,
    pub usage: Usage,
    pub latency_ms: u64,
}

/// A backend that can serve processing targets.
///
/// Implementations should enforce their own network timeouts; the
/// fallback executor also bounds each call with the per-target timeout.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt` on `target`.
    async fn invoke(
        &self,
        target: ProcessingTarget,
        prompt: &str,
        params: &InvocationParams,
    ) -> Result<Invocation, ProviderError>;
}

/// Fixed lookup from target to provider.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    providers: HashMap<ProcessingTarget, Arc<dyn ModelProvider>>,
    default: Option<Arc<dyn ModelProvider>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every target with one provider.
    pub fn uniform(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            providers: HashMap::new(),
            default: Some(provider),
        }
    }

    /// Map one target to a provider, overriding the default.
    pub fn with_target(mut self, target: ProcessingTarget, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(target, provider);
        self
    }

    /// Provider serving `target`, if any.
    pub fn resolve(&self, target: ProcessingTarget) -> Option<&Arc<dyn ModelProvider>> {
        self.providers.get(&target).or(self.default.as_ref())
    }

    /// Invoke `target` through its provider.
    pub async fn invoke(
        &self,
        target: ProcessingTarget,
        prompt: &str,
        params: &InvocationParams,
    ) -> Result<Invocation, ProviderError> {
        let provider = self
            .resolve(target)
            .ok_or(ProviderError::NotConfigured(target))?;
        provider.invoke(target, prompt, params).await
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut mapped: Vec<&str> = self.providers.keys().map(|t| t.id()).collect();
        mapped.sort_unstable();
        f.debug_struct("TargetRegistry")
            .field("mapped", &mapped)
            .field("default", &self.default.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

// ── Scripted provider ───────────────────────────────────────────────────

/// Deterministic provider for dry runs and tests.
///
/// Replies with a canned line per target (or a generic echo) and can be
/// told to fail specific targets to exercise the fallback chain.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: HashMap<ProcessingTarget, String>,
    failing: HashSet<ProcessingTarget>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed reply for a target.
    pub fn reply(mut self, target: ProcessingTarget, content: impl Into<String>) -> Self {
        self.replies.insert(target, content.into());
        self
    }

    /// Make a target fail every call.
    pub fn failing(mut self, target: ProcessingTarget) -> Self {
        self.failing.insert(target);
        self
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        target: ProcessingTarget,
        prompt: &str,
        params: &InvocationParams,
    ) -> Result<Invocation, ProviderError> {
        if self.failing.contains(&target) {
            return Err(ProviderError::Failed(format!("{target} is scripted to fail")));
        }
        let content = match self.replies.get(&target) {
            Some(reply) => reply.clone(),
            None => {
                let request = prompt.lines().last().unwrap_or_default();
                format!("[{target}] Here is a response to: {request}")
            }
        };
        let completion_tokens = (content.split_whitespace().count() as u32).min(params.max_tokens);
        Ok(Invocation {
            usage: Usage {
                prompt_tokens: prompt.split_whitespace().count() as u32,
                completion_tokens,
            },
            content,
            latency_ms: 0,
        })
    }
}
