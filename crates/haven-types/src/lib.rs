//! # haven-types
//!
//! Core type definitions for the haven request orchestrator.
//!
//! This crate is the foundation of the dependency graph -- every other
//! haven crate depends on it. It contains:
//!
//! - **[`error`]** -- [`HavenError`], the error taxonomy shared by all layers
//! - **[`config`]** -- Configuration schema for dispatcher, safety gate and orchestrator
//! - **[`event`]** -- Dispatcher events and their metadata
//! - **[`safety`]** -- Verdicts, crisis scores, moderation results, escalations
//! - **[`routing`]** -- Query context, actions, targets and routing decisions
//! - **[`envelope`]** -- The uniform [`ResponseEnvelope`](envelope::ResponseEnvelope)
//! - **[`user`]** -- Caller identity, preferences and feature/risk records

pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod routing;
pub mod safety;
pub mod user;

pub use error::{BoxError, HavenError, Result};
