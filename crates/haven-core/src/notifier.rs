//! Crisis notifications delivered over the event dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use haven_events::{EventDispatcher, PublishOptions};
use haven_safety::{CrisisNotification, CrisisNotifier};
use haven_types::event::topics;

/// Publishes crisis notifications on `safety.crisis.notification` for the
/// human-review side channel.
#[derive(Debug, Clone)]
pub struct DispatcherNotifier {
    dispatcher: Arc<EventDispatcher>,
}

impl DispatcherNotifier {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl CrisisNotifier for DispatcherNotifier {
    async fn notify(&self, notification: CrisisNotification) {
        let payload = match serde_json::to_value(&notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode crisis notification");
                return;
            }
        };
        let options = PublishOptions {
            correlation_id: Some(notification.escalation_id.clone()),
            user_id: Some(notification.user_id.clone()),
            session_id: None,
            persistent: true,
        };
        self.dispatcher
            .emit_detached(topics::CRISIS_NOTIFICATION, payload, "safety-gate", options);
    }
}
