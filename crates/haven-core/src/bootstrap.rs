//! Composition root.
//!
//! [`Haven`] builds the dispatcher, safety gate and orchestrator from a
//! [`Config`] and wires crisis notifications onto the dispatcher. It owns
//! the explicit construct/shutdown lifecycle.
//!
//! ```rust,ignore
//! let haven = Haven::new(config, features, TargetRegistry::uniform(provider))?;
//! let envelope = haven.orchestrator().process_query(request).await;
//! haven.shutdown().await;
//! ```

use std::sync::Arc;

use tracing::info;

use haven_events::EventDispatcher;
use haven_safety::{FeatureLookup, SafetyGate};
use haven_types::config::Config;
use haven_types::error::Result;

use crate::cache::SemanticCache;
use crate::notifier::DispatcherNotifier;
use crate::orchestrator::Orchestrator;
use crate::provider::TargetRegistry;

/// Fully wired haven core.
#[derive(Debug)]
pub struct Haven {
    dispatcher: Arc<EventDispatcher>,
    gate: Arc<SafetyGate>,
    orchestrator: Orchestrator,
}

impl Haven {
    /// Validate `config` and wire every component.
    pub fn new(
        config: Config,
        features: Arc<dyn FeatureLookup>,
        targets: TargetRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let Config {
            dispatcher,
            safety,
            orchestrator,
        } = config;

        let dispatcher = Arc::new(EventDispatcher::new(dispatcher));
        let gate = Arc::new(
            SafetyGate::new(safety, features)?
                .with_notifier(Arc::new(DispatcherNotifier::new(Arc::clone(&dispatcher)))),
        );
        let orchestrator =
            Orchestrator::new(orchestrator, Arc::clone(&gate), Arc::clone(&dispatcher), targets);

        info!("haven core initialized");
        Ok(Self {
            dispatcher,
            gate,
            orchestrator,
        })
    }

    /// Use a semantic cache.
    pub fn with_cache(mut self, cache: Arc<dyn SemanticCache>) -> Self {
        self.orchestrator = self.orchestrator.with_cache(cache);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn gate(&self) -> &Arc<SafetyGate> {
        &self.gate
    }

    /// Drain and stop the dispatcher.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        info!("haven core shut down");
    }
}
