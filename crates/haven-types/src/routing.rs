//! Routing types: query context, actions, processing targets and decisions.
//!
//! A [`RoutingDecision`] is created fresh for every query and never
//! persisted. Targets and actions are closed enums so that dispatch is a
//! fixed table lookup rather than string matching.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::user::RiskLevel;

/// Caller-declared urgency of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl FromStr for QueryPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Everything rule predicates may inspect about a query.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Raw query text.
    pub text: String,
    /// Lowercased query text, computed once.
    pub lowered: String,
    /// Character count of the query.
    pub length: usize,
    /// Declared priority.
    pub priority: QueryPriority,
    /// Caller risk level.
    pub risk_level: RiskLevel,
}

impl QueryContext {
    /// Build a context, precomputing the lowercased text and length.
    pub fn new(text: impl Into<String>, priority: QueryPriority, risk_level: RiskLevel) -> Self {
        let text = text.into();
        let lowered = text.to_lowercase();
        let length = text.chars().count();
        Self {
            text,
            lowered,
            length,
            priority,
            risk_level,
        }
    }
}

/// Abstract action chosen by the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetAction {
    MentalHealthSupport,
    Educational,
    Technical,
    Creative,
    LongContext,
    Analytical,
    FastResponse,
    General,
}

impl fmt::Display for TargetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MentalHealthSupport => "mental-health-support",
            Self::Educational => "educational",
            Self::Technical => "technical",
            Self::Creative => "creative",
            Self::LongContext => "long-context",
            Self::Analytical => "analytical",
            Self::FastResponse => "fast-response",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// Concrete backend processing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingTarget {
    EmpatheticSupport,
    EducationTutor,
    CodeSpecialist,
    CreativeWriter,
    LongContext,
    DeepReasoning,
    FastResponse,
    BalancedGeneral,
}

impl ProcessingTarget {
    /// Every target, in declaration order.
    pub const ALL: [ProcessingTarget; 8] = [
        Self::EmpatheticSupport,
        Self::EducationTutor,
        Self::CodeSpecialist,
        Self::CreativeWriter,
        Self::LongContext,
        Self::DeepReasoning,
        Self::FastResponse,
        Self::BalancedGeneral,
    ];

    /// Stable identifier used in envelopes and events.
    pub fn id(&self) -> &'static str {
        match self {
            Self::EmpatheticSupport => "empathetic-support",
            Self::EducationTutor => "education-tutor",
            Self::CodeSpecialist => "code-specialist",
            Self::CreativeWriter => "creative-writer",
            Self::LongContext => "long-context",
            Self::DeepReasoning => "deep-reasoning",
            Self::FastResponse => "fast-response",
            Self::BalancedGeneral => "balanced-general",
        }
    }
}

impl fmt::Display for ProcessingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProcessingTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.id() == s)
            .ok_or_else(|| format!("unknown processing target: {s}"))
    }
}

/// Billing tier reported in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Free,
    Standard,
    Premium,
}

/// A named pre/post-processing stage around a target invocation.
///
/// Unrecognized names are carried as [`PipelineStep::Custom`] and treated
/// as no-ops by the post-processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PipelineStep {
    Preprocessing,
    ModelCall,
    Postprocessing,
    CrisisDetection,
    EmpathyEnhancement,
    MentalHealthSafety,
    EducationalContext,
    PedagogicalEnhancement,
    TechnicalContext,
    CodeFormatting,
    CreativeContext,
    ContentSafety,
    ContextCompression,
    ReasoningScaffold,
    CacheRetrieval,
    Custom(String),
}

impl PipelineStep {
    /// Step name as it appears in envelopes.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Preprocessing => "preprocessing",
            Self::ModelCall => "model-call",
            Self::Postprocessing => "postprocessing",
            Self::CrisisDetection => "crisis-detection",
            Self::EmpathyEnhancement => "empathy-enhancement",
            Self::MentalHealthSafety => "mental-health-safety",
            Self::EducationalContext => "educational-context",
            Self::PedagogicalEnhancement => "pedagogical-enhancement",
            Self::TechnicalContext => "technical-context",
            Self::CodeFormatting => "code-formatting",
            Self::CreativeContext => "creative-context",
            Self::ContentSafety => "content-safety",
            Self::ContextCompression => "context-compression",
            Self::ReasoningScaffold => "reasoning-scaffold",
            Self::CacheRetrieval => "cache-retrieval",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for PipelineStep {
    fn from(s: String) -> Self {
        match s.as_str() {
            "preprocessing" => Self::Preprocessing,
            "model-call" => Self::ModelCall,
            "postprocessing" => Self::Postprocessing,
            "crisis-detection" => Self::CrisisDetection,
            "empathy-enhancement" => Self::EmpathyEnhancement,
            "mental-health-safety" => Self::MentalHealthSafety,
            "educational-context" => Self::EducationalContext,
            "pedagogical-enhancement" => Self::PedagogicalEnhancement,
            "technical-context" => Self::TechnicalContext,
            "code-formatting" => Self::CodeFormatting,
            "creative-context" => Self::CreativeContext,
            "content-safety" => Self::ContentSafety,
            "context-compression" => Self::ContextCompression,
            "reasoning-scaffold" => Self::ReasoningScaffold,
            "cache-retrieval" => Self::CacheRetrieval,
            _ => Self::Custom(s),
        }
    }
}

impl From<PipelineStep> for String {
    fn from(step: PipelineStep) -> Self {
        step.as_str().to_string()
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A rule in the rule table matched.
    Rule,
    /// No rule matched; length/density heuristics chose the target.
    Heuristic,
}

/// The selected processing target and pipeline for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Primary target.
    #[serde(rename = "target_id")]
    pub target: ProcessingTarget,
    /// Action the target was derived from.
    pub action: TargetAction,
    /// Ordered pipeline steps.
    pub pipeline_steps: Vec<PipelineStep>,
    /// Decision confidence before any fallback discount.
    pub confidence: f64,
    /// Ordered fallback targets tried after the primary fails.
    pub fallback_chain: Vec<ProcessingTarget>,
    /// Safety checks applied around this query.
    pub safety_checks: Vec<String>,
    /// Rule or heuristic that produced the decision.
    pub source: DecisionSource,
    /// Human-readable rationale.
    pub rationale: String,
}
