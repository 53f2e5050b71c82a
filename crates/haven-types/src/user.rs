//! Caller identity, preferences and feature records.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller risk level from the feature store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// Consent flags recorded for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFlags {
    /// User opted in to mental-health support features.
    #[serde(default, alias = "mentalHealthFeatures")]
    pub mental_health_features: bool,

    /// User opted in to personalization from stored history.
    #[serde(default)]
    pub personalization: bool,
}

/// Feature and risk record for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFeatures {
    /// Risk level used by crisis scoring and routing.
    #[serde(default, alias = "riskLevel")]
    pub risk_level: RiskLevel,

    /// Consent flags.
    #[serde(default, alias = "consentFlags")]
    pub consent_flags: ConsentFlags,

    /// Any other features the store returns.
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Authenticated caller context supplied by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user identifier.
    pub user_id: String,

    /// Session identifier, if the gateway tracks sessions.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AuthContext {
    /// Context for a user with no session.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
        }
    }
}

/// Per-request generation preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// Sampling temperature override.
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Maximum completion tokens override.
    #[serde(default, alias = "maxTokens")]
    pub max_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!("low".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
        assert!("extreme".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn features_accept_camel_case() {
        let json = r#"{
            "riskLevel": "high",
            "consentFlags": {"mentalHealthFeatures": true},
            "segment": "beta"
        }"#;
        let features: UserFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(features.risk_level, RiskLevel::High);
        assert!(features.consent_flags.mental_health_features);
        assert_eq!(features.extra["segment"], "beta");
    }

    #[test]
    fn features_default_to_low_risk_without_consent() {
        let features: UserFeatures = serde_json::from_str("{}").unwrap();
        assert_eq!(features.risk_level, RiskLevel::Low);
        assert!(!features.consent_flags.mental_health_features);
    }
}
