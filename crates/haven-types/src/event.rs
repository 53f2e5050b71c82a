//! Dispatcher event types.
//!
//! An [`Event`] is created by the dispatcher on every publish. It lives
//! only in the bounded history ring buffer; there is no persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HavenError;

/// Well-known topics emitted by the orchestrator and safety gate.
pub mod topics {
    /// One query finished (any path).
    pub const REQUEST_COMPLETED: &str = "request.completed";
    /// The safety gate rejected a query or a response.
    pub const SAFETY_VIOLATION: &str = "safety.violation.detected";
    /// Crisis notification for the human-review queue.
    pub const CRISIS_NOTIFICATION: &str = "safety.crisis.notification";
    /// One target invocation attempt finished.
    pub const TARGET_PERFORMANCE: &str = "target.performance";
    /// A target failed and the next fallback is being tried.
    pub const TARGET_FAILOVER: &str = "target.failover";
    /// The caller consented to the interaction being used for training.
    pub const INTERACTION_RECORDED: &str = "interaction.recorded";
}

/// Metadata attached to every event at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// When the event was published.
    pub timestamp: DateTime<Utc>,

    /// Component that published the event.
    pub source: String,

    /// Correlates events belonging to the same request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// User the event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Session the event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Publisher asked for the event to be kept for replay.
    #[serde(default)]
    pub persistent: bool,
}

/// A published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier (UUID v4).
    pub id: String,

    /// Topic the event was published on (e.g. `"request.completed"`).
    #[serde(rename = "type")]
    pub topic: String,

    /// Topic-specific payload; always a JSON object or null.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Publish-time metadata.
    pub metadata: EventMetadata,
}

/// Outcome of delivering one event to one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DeliveryOutcome {
    /// The handler eventually succeeded.
    Succeeded,
    /// The handler failed on its last attempt.
    Failed {
        /// Last error message.
        error: String,
    },
    /// The handler's last attempt exceeded its timeout.
    TimedOut,
}

/// Per-handler delivery record, kept in invocation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    /// Handler name.
    pub handler: String,
    /// Handler priority at dispatch time.
    pub priority: i32,
    /// Number of attempts made.
    pub attempts: u32,
    /// Final outcome.
    pub outcome: DeliveryOutcome,
}

impl Delivery {
    /// The error this delivery ended with, if it did not succeed.
    pub fn error(&self) -> Option<HavenError> {
        match &self.outcome {
            DeliveryOutcome::Succeeded => None,
            DeliveryOutcome::Failed { error } => Some(HavenError::HandlerFailed {
                handler: self.handler.clone(),
                attempts: self.attempts,
                source: error.clone().into(),
            }),
            DeliveryOutcome::TimedOut => Some(HavenError::Timeout {
                operation: format!("handler '{}' attempt {}", self.handler, self.attempts),
            }),
        }
    }
}

/// An entry in the dispatcher history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The published event.
    pub event: Event,
    /// Deliveries in invocation order; empty until dispatch completes.
    #[serde(default)]
    pub deliveries: Vec<Delivery>,
}
