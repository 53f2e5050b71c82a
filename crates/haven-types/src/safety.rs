//! Safety gate result types.
//!
//! The gate produces a [`SafetyVerdict`] for every query and every model
//! response. Crisis scoring yields a [`CrisisScore`]; content moderation
//! yields a [`ModerationResult`]. Escalated verdicts are queued as
//! [`EscalationEntry`] records for operator review.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HavenError;

/// Severity of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The gate's structured safe/unsafe classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Whether downstream processing may proceed.
    pub safe: bool,

    /// Confidence in the verdict, 0.0--1.0.
    pub confidence: f64,

    /// Violation labels or matched terms that drove the verdict.
    #[serde(default)]
    pub violations: Vec<String>,

    /// Severity of the worst finding.
    pub severity: Severity,

    /// Whether the verdict requires operator review.
    #[serde(default)]
    pub escalate: bool,

    /// User-facing message to return instead of a model response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SafetyVerdict {
    /// A clean pass with full confidence.
    pub fn pass() -> Self {
        Self {
            safe: true,
            confidence: 1.0,
            violations: Vec::new(),
            severity: Severity::Low,
            escalate: false,
            message: None,
        }
    }

    /// An unsafe verdict with the given severity and user-facing message.
    pub fn reject(
        severity: Severity,
        confidence: f64,
        violations: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            safe: false,
            confidence,
            violations,
            severity,
            escalate: false,
            message: Some(message.into()),
        }
    }

    /// Set the escalate flag.
    pub fn escalated(mut self, escalate: bool) -> Self {
        self.escalate = escalate;
        self
    }

    /// Whether the orchestrator must stop before invoking any target.
    pub fn blocks_processing(&self) -> bool {
        !self.safe || self.escalate
    }

    /// The rejection to report when this verdict blocks processing.
    pub fn rejection(&self) -> Option<HavenError> {
        if !self.blocks_processing() {
            return None;
        }
        let reason = if self.violations.is_empty() {
            format!("{} severity, escalated for review", self.severity)
        } else {
            format!("{} severity: {}", self.severity, self.violations.join(", "))
        };
        Some(HavenError::SafetyRejection { reason })
    }
}

/// Crisis severity bands produced by crisis scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisSeverity {
    Low,
    Medium,
    High,
    Imminent,
}

/// What the caller should do about a crisis score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Monitor,
    Escalate,
    Emergency,
}

/// Crisis-type label set by the first matching intent pattern family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisType {
    Suicidal,
    SelfHarm,
    Violent,
}

impl fmt::Display for CrisisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suicidal => write!(f, "suicidal"),
            Self::SelfHarm => write!(f, "self_harm"),
            Self::Violent => write!(f, "violent"),
        }
    }
}

/// Result of crisis scoring one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisScore {
    /// Final score after the risk multiplier.
    pub score: f64,
    /// Keyword and pattern total before the risk multiplier.
    pub raw_score: f64,
    /// Severity band for `score`.
    pub severity: CrisisSeverity,
    /// Recommended follow-up.
    pub recommended_action: RecommendedAction,
    /// Label from the matching intent pattern, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crisis_type: Option<CrisisType>,
    /// Keywords that matched, in table order.
    #[serde(default)]
    pub matched_terms: Vec<String>,
    /// `score` reached the medium threshold.
    pub is_crisis: bool,
}

/// Moderation finding categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationCategory {
    Profanity,
    HarmfulAdvice,
    Pii,
}

impl fmt::Display for ModerationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profanity => write!(f, "profanity"),
            Self::HarmfulAdvice => write!(f, "harmful_advice"),
            Self::Pii => write!(f, "pii"),
        }
    }
}

/// Result of a moderation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    /// Any category matched.
    pub flagged: bool,
    /// Confidence that the content is actually objectionable, 0.0--1.0.
    pub confidence: f64,
    /// Categories that matched, deduplicated, in detection order.
    #[serde(default)]
    pub categories: Vec<ModerationCategory>,
    /// Content with profanity masked and PII redacted.
    pub cleaned: String,
}

/// Response validation output: the verdict plus the cleaned text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCheck {
    /// Verdict for the response.
    pub verdict: SafetyVerdict,
    /// Response with moderation cleaning applied.
    pub cleaned: String,
}

/// Review state of an escalation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Handled,
}

/// A verdict queued for operator review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEntry {
    /// Entry identifier (UUID v4).
    pub id: String,
    /// User the verdict concerns.
    pub user_id: String,
    /// The escalated verdict.
    pub verdict: SafetyVerdict,
    /// Leading excerpt of the offending text.
    pub excerpt: String,
    /// When the entry was queued.
    pub created_at: DateTime<Utc>,
    /// Review state.
    pub status: EscalationStatus,
    /// Operator who handled the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled_by: Option<String>,
    /// Operator notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When the entry was handled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(CrisisSeverity::Imminent > CrisisSeverity::High);
    }

    #[test]
    fn pass_does_not_block() {
        let verdict = SafetyVerdict::pass();
        assert!(verdict.safe);
        assert_eq!(verdict.confidence, 1.0);
        assert!(!verdict.blocks_processing());
    }

    #[test]
    fn safe_but_escalated_blocks() {
        let verdict = SafetyVerdict::pass().escalated(true);
        assert!(verdict.safe);
        assert!(verdict.blocks_processing());
    }

    #[test]
    fn reject_carries_message() {
        let verdict = SafetyVerdict::reject(Severity::High, 0.9, vec!["x".into()], "no");
        assert!(!verdict.safe);
        assert!(!verdict.escalate);
        assert_eq!(verdict.message.as_deref(), Some("no"));
    }

    #[test]
    fn blocking_verdict_becomes_a_rejection() {
        assert!(SafetyVerdict::pass().rejection().is_none());

        let verdict = SafetyVerdict::reject(
            Severity::High,
            0.9,
            vec!["crisis_language:suicidal".into(), "harmful_content".into()],
            "no",
        );
        let err = verdict.rejection().unwrap();
        assert!(matches!(err, HavenError::SafetyRejection { .. }));
        assert_eq!(
            err.to_string(),
            "safety rejection: high severity: crisis_language:suicidal, harmful_content"
        );

        let escalated = SafetyVerdict::pass().escalated(true);
        assert_eq!(
            escalated.rejection().unwrap().to_string(),
            "safety rejection: low severity, escalated for review"
        );
    }

    #[test]
    fn severity_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(
            serde_json::to_string(&RecommendedAction::Emergency).unwrap(),
            "\"emergency\""
        );
        assert_eq!(serde_json::to_string(&CrisisType::SelfHarm).unwrap(), "\"self_harm\"");
    }
}
