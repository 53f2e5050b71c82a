//! # haven-safety
//!
//! The safety gate. Every inbound query and every model response passes
//! through [`SafetyGate`] before it reaches a user.
//!
//! - [`crisis`] -- weighted keyword and intent-pattern crisis scoring
//! - [`moderation`] -- profanity, harmful-advice and PII detection with cleaning
//! - [`escalation`] -- bounded operator review queue
//! - [`features`] -- user feature/risk lookup interface
//! - [`gate`] -- query and response validation

pub mod crisis;
pub mod escalation;
pub mod features;
pub mod gate;
pub mod moderation;

pub use crisis::CrisisDetector;
pub use escalation::EscalationQueue;
pub use features::{FeatureLookup, StaticFeatureStore};
pub use gate::{CrisisNotification, CrisisNotifier, NoopNotifier, SafetyGate};
pub use moderation::Moderator;
