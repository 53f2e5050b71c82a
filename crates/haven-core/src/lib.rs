//! # haven-core
//!
//! The orchestrator: every query is screened by the safety gate, checked
//! against the semantic cache, routed by the rule table, executed through
//! a bounded fallback chain and post-processed before being wrapped in a
//! [`ResponseEnvelope`](haven_types::envelope::ResponseEnvelope).
//!
//! - [`rules`] -- data-driven routing rule table
//! - [`targets`] -- action-to-target lookup, fallback chains, cost tiers
//! - [`pipeline`] -- pipeline steps, prompt shaping, post-processing
//! - [`provider`] -- model execution interface and target registry
//! - [`cache`] -- semantic cache interface
//! - [`fallback`] -- bounded fallback executor
//! - [`orchestrator`] -- `process_query`
//! - [`bootstrap`] -- composition root

pub mod bootstrap;
pub mod cache;
pub mod fallback;
pub mod notifier;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod rules;
pub mod targets;

pub use bootstrap::Haven;
pub use cache::{CacheHit, InMemoryCache, NoCache, SemanticCache};
pub use orchestrator::{Orchestrator, QueryRequest};
pub use provider::{
    Invocation, InvocationParams, ModelProvider, ProviderError, ScriptedProvider, TargetRegistry,
    Usage,
};
