//! The uniform response envelope.
//!
//! Every orchestration path (safety-blocked, cache hit, pipeline executed,
//! error) produces the same [`ResponseEnvelope`] shape.

use serde::{Deserialize, Serialize};

use crate::routing::{CostTier, PipelineStep};

/// Target id reported when the safety gate blocked the query.
pub const SAFETY_FILTER_TARGET: &str = "safety-filter";

/// Target id reported when orchestration failed.
pub const ERROR_HANDLER_TARGET: &str = "error-handler";

/// Envelope metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Request identifier (UUID v4).
    pub request_id: String,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Prompt plus completion tokens consumed.
    pub tokens_used: u32,
    /// Served from the semantic cache.
    pub cached: bool,
    /// Steps that were applied.
    pub pipeline_steps: Vec<PipelineStep>,
    /// Safety checks that were applied.
    pub safety_checks: Vec<String>,
    /// Billing tier of the target that answered.
    pub cost_tier: CostTier,
}

/// Uniform output of `process_query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// User-facing text.
    pub text: String,
    /// Target that answered, or a pseudo-target such as `"safety-filter"`.
    pub target_id: String,
    /// Confidence after any fallback discount.
    pub confidence: f64,
    /// Human-readable reasoning trail.
    pub reasoning: Vec<String>,
    /// Request metadata.
    pub metadata: EnvelopeMetadata,
}
