//! Priority-ordered event dispatcher.
//!
//! [`EventDispatcher`] is constructed explicitly by the composition root and
//! shared through an `Arc`. Publishing an event:
//!
//! 1. validates the topic and payload (the only synchronous failure mode),
//! 2. stamps `{id, timestamp}` metadata and appends to the bounded history,
//! 3. invokes every handler registered on the topic. Handlers are started
//!    in priority-descending order (ties keep registration order) and run
//!    concurrently, so one handler's retry loop never blocks its siblings,
//! 4. records per-handler deliveries on the history record and bumps the
//!    counters.
//!
//! Handler failures are retried per policy, logged, and never re-thrown to
//! the publisher.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use haven_types::config::DispatcherConfig;
use haven_types::error::{HavenError, Result};
use haven_types::event::{DeliveryOutcome, Event, EventMetadata, HistoryRecord};

use crate::handler::{EventHandler, HandlerOptions};
use crate::history::{History, HistoryFilter};
use crate::retry::{self, ExecutionCounters};

/// Longest accepted topic name.
const MAX_TOPIC_LEN: usize = 128;

/// Identifier returned by [`EventDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandlerId(u64);

/// Optional metadata supplied at publish time.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub persistent: bool,
}

impl PublishOptions {
    /// Options carrying only a correlation id.
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }

    /// Attach a user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Events accepted by `publish`.
    pub emitted: u64,
    /// Events whose handlers have all finished.
    pub processed: u64,
    /// Handler deliveries that failed after exhausting their policy.
    pub errors: u64,
    /// Retry attempts scheduled.
    pub retries: u64,
    /// Handler attempts that timed out.
    pub timeouts: u64,
    /// Records currently held in history.
    pub history_len: usize,
    /// Registered handlers across all topics.
    pub handlers: usize,
}

#[derive(Clone)]
struct Registration {
    id: HandlerId,
    handler: Arc<dyn EventHandler>,
    options: HandlerOptions,
}

#[derive(Default)]
struct Counters {
    emitted: AtomicU64,
    processed: AtomicU64,
    errors: AtomicU64,
    execution: ExecutionCounters,
}

/// Decrements the in-flight count on drop and wakes shutdown waiters.
struct InFlight<'a> {
    count: &'a AtomicUsize,
    idle: &'a Notify,
}

impl<'a> InFlight<'a> {
    fn enter(count: &'a AtomicUsize, idle: &'a Notify) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self { count, idle }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        leave(self.count, self.idle);
    }
}

/// In-flight marker owned by a spawned publish. Taken before the task is
/// spawned so `shutdown` waits for tasks that have not been polled yet.
struct DetachedInFlight(Arc<EventDispatcher>);

impl DetachedInFlight {
    fn enter(dispatcher: Arc<EventDispatcher>) -> Self {
        dispatcher.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(dispatcher)
    }
}

impl Drop for DetachedInFlight {
    fn drop(&mut self) {
        leave(&self.0.in_flight, &self.0.idle);
    }
}

fn leave(count: &AtomicUsize, idle: &Notify) {
    if count.fetch_sub(1, Ordering::SeqCst) == 1 {
        idle.notify_waiters();
    }
}

/// Publish/subscribe dispatcher with priority ordering, retries and a
/// bounded history.
pub struct EventDispatcher {
    config: DispatcherConfig,
    registry: RwLock<HashMap<String, Vec<Registration>>>,
    history: Mutex<History>,
    counters: Counters,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher with the given settings.
    pub fn new(config: DispatcherConfig) -> Self {
        debug!(
            history_capacity = config.history_capacity,
            backoff_base_ms = config.backoff_base_ms,
            "event dispatcher created"
        );
        Self {
            history: Mutex::new(History::new(config.history_capacity)),
            config,
            registry: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            accepting: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler on a topic.
    ///
    /// The topic's handler list is re-sorted by priority, descending. The
    /// sort is stable, so equal priorities keep registration order.
    pub fn register(
        &self,
        topic: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: HandlerOptions,
    ) -> HandlerId {
        let topic = topic.into();
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            topic = %topic,
            handler = handler.name(),
            priority = options.priority,
            "registering handler"
        );
        let mut registry = self.registry.write();
        let handlers = registry.entry(topic).or_default();
        handlers.push(Registration {
            id,
            handler,
            options,
        });
        handlers.sort_by(|a, b| b.options.priority.cmp(&a.options.priority));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut registry = self.registry.write();
        let mut removed = false;
        registry.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|r| r.id != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Number of handlers registered on a topic.
    pub fn handler_count(&self, topic: &str) -> usize {
        self.registry.read().get(topic).map_or(0, Vec::len)
    }

    /// Topics with at least one handler, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.registry.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Publish an event and wait for every handler to finish.
    ///
    /// # Errors
    ///
    /// Returns [`HavenError::Validation`] for a malformed topic or payload
    /// and [`HavenError::ShutDown`] after [`shutdown`](Self::shutdown).
    /// Handler failures are never returned.
    pub async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        source: &str,
        options: PublishOptions,
    ) -> Result<Event> {
        let _in_flight = InFlight::enter(&self.in_flight, &self.idle);
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(shut_down());
        }
        self.dispatch(topic, payload, source, options).await
    }

    /// Validate, record and deliver one event. Callers hold an in-flight
    /// marker and have checked `accepting`.
    async fn dispatch(
        &self,
        topic: &str,
        payload: serde_json::Value,
        source: &str,
        options: PublishOptions,
    ) -> Result<Event> {
        validate_topic(topic)?;
        self.validate_payload(&payload)?;

        let event = Event {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            payload,
            metadata: EventMetadata {
                timestamp: Utc::now(),
                source: source.to_string(),
                correlation_id: options.correlation_id,
                user_id: options.user_id,
                session_id: options.session_id,
                persistent: options.persistent,
            },
        };

        self.history.lock().push(HistoryRecord {
            event: event.clone(),
            deliveries: Vec::new(),
        });
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);

        let handlers: Vec<Registration> = self
            .registry
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default();

        debug!(
            topic = %topic,
            event_id = %event.id,
            handlers = handlers.len(),
            "dispatching event"
        );

        let backoff_base = Duration::from_millis(self.config.backoff_base_ms);
        let default_timeout = self.config.default_timeout_ms.map(Duration::from_millis);
        let deliveries = join_all(handlers.iter().map(|r| {
            retry::execute(
                r.handler.as_ref(),
                r.options.priority,
                &r.options.retry,
                &event,
                backoff_base,
                default_timeout,
                &self.counters.execution,
            )
        }))
        .await;

        let failed = deliveries
            .iter()
            .filter(|d| d.outcome != DeliveryOutcome::Succeeded)
            .count() as u64;
        self.counters.errors.fetch_add(failed, Ordering::Relaxed);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        self.history.lock().attach_deliveries(&event.id, deliveries);

        Ok(event)
    }

    /// Publish from a spawned task without waiting for handlers.
    ///
    /// Used for observability events where delivery is best-effort. The
    /// event counts as in flight from this call on, so a later
    /// [`shutdown`](Self::shutdown) drains it within the grace window.
    /// Outside a Tokio runtime, or after shutdown, the event is dropped.
    pub fn emit_detached(
        self: &Arc<Self>,
        topic: &'static str,
        payload: serde_json::Value,
        source: &'static str,
        options: PublishOptions,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(topic, "no async runtime, dropping event");
            return;
        };
        let in_flight = DetachedInFlight::enter(Arc::clone(self));
        if !self.accepting.load(Ordering::SeqCst) {
            debug!(topic, "dispatcher shut down, dropping detached event");
            return;
        }
        runtime.spawn(async move {
            let dispatcher = &in_flight.0;
            if let Err(e) = dispatcher.dispatch(topic, payload, source, options).await {
                debug!(topic, error = %e, "detached publish rejected");
            }
        });
    }

    /// Matching history records, newest first.
    pub fn history(&self, filter: &HistoryFilter) -> Vec<HistoryRecord> {
        self.history.lock().query(filter)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DispatcherStats {
        let handlers = self.registry.read().values().map(Vec::len).sum();
        DispatcherStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            retries: self.counters.execution.retries.load(Ordering::Relaxed),
            timeouts: self.counters.execution.timeouts.load(Ordering::Relaxed),
            history_len: self.history.lock().len(),
            handlers,
        }
    }

    /// Whether `publish` is still accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting publishes, give in-flight dispatches the configured
    /// grace window, then clear registrations and history.
    pub async fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            debug!("dispatcher already shut down");
            return;
        }

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let drained = async {
            loop {
                let notified = self.idle.notified();
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(grace, drained).await.is_err() {
            warn!(
                in_flight = self.in_flight.load(Ordering::SeqCst),
                grace_ms = self.config.shutdown_grace_ms,
                "shutdown grace window elapsed with handlers still running"
            );
        }

        self.registry.write().clear();
        self.history.lock().clear();
        info!("event dispatcher shut down");
    }

    fn validate_payload(&self, payload: &serde_json::Value) -> Result<()> {
        if !(payload.is_object() || payload.is_null()) {
            return Err(HavenError::validation(
                "event payload must be a JSON object or null",
            ));
        }
        let size = serde_json::to_vec(payload)?.len();
        if size > self.config.max_payload_bytes {
            return Err(HavenError::validation(format!(
                "event payload is {size} bytes, max {}",
                self.config.max_payload_bytes
            )));
        }
        Ok(())
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("topics", &self.topics())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Topics are dot-separated segments of `[a-z0-9_-]`.
fn shut_down() -> HavenError {
    HavenError::ShutDown {
        component: "event dispatcher".into(),
    }
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(HavenError::validation("topic must not be empty"));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(HavenError::validation(format!(
            "topic too long ({} bytes, max {MAX_TOPIC_LEN})",
            topic.len()
        )));
    }
    for segment in topic.split('.') {
        if segment.is_empty() {
            return Err(HavenError::validation(format!(
                "topic '{topic}' contains an empty segment"
            )));
        }
        if let Some(bad) = segment
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(HavenError::validation(format!(
                "topic '{topic}' contains invalid character {bad:?}"
            )));
        }
    }
    Ok(())
}
