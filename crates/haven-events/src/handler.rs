//! Handler interface and registration options.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use haven_types::event::Event;
use haven_types::BoxError;

/// Result returned by a handler invocation.
pub type HandlerResult = Result<(), BoxError>;

/// A subscriber callback.
///
/// Handlers must be idempotent when registered with retries enabled: a
/// failed or timed-out attempt is simply invoked again.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and delivery records.
    fn name(&self) -> &str;

    /// Handle one event.
    async fn handle(&self, event: &Event) -> HandlerResult;
}

/// Adapter turning an async closure into an [`EventHandler`].
struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> HandlerResult {
        (self.f)(event.clone()).await
    }
}

/// Build a handler from a name and an async closure.
///
/// ```rust,ignore
/// let audit = handler_fn("audit", |event| async move {
///     tracing::info!(topic = %event.topic, "audited");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// Per-handler retry and timeout policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry failed attempts.
    pub enabled: bool,
    /// Total attempts when enabled (`attempt <= max_retries`).
    pub max_retries: u32,
    /// Per-attempt timeout; a timeout counts as a failure.
    pub timeout_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.max(1)
        } else {
            1
        }
    }
}

/// Options supplied at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Higher runs first; ties keep registration order.
    pub priority: i32,
    /// Retry and timeout policy.
    pub retry: RetryPolicy,
}

impl HandlerOptions {
    /// Options with the given priority and no retries.
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Enable retries with the given attempt budget.
    pub fn retries(mut self, max_retries: u32) -> Self {
        self.retry.enabled = true;
        self.retry.max_retries = max_retries;
        self
    }

    /// Set a per-attempt timeout.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.retry.timeout_ms = Some(timeout_ms);
        self
    }
}
