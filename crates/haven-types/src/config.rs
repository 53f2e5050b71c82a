//! Configuration schema types.
//!
//! All structs accept both `snake_case` and `camelCase` field names in JSON
//! via `#[serde(alias)]`. Unknown fields are silently ignored for forward
//! compatibility. Every field has a default, so an empty object (or a
//! missing config file) yields a working configuration.
//!
//! The crisis thresholds, risk multiplier, cache threshold and fallback
//! discount are heuristic constants; they live here so deployments can
//! tune them.

use serde::{Deserialize, Serialize};

use crate::error::{HavenError, Result};

// ── Root config ──────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Event dispatcher settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Safety gate settings.
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Check semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate()?;
        self.safety.validate()?;
        self.orchestrator.validate()
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────

/// Event dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum events kept in the history ring buffer.
    #[serde(default = "default_history_capacity", alias = "historyCapacity")]
    pub history_capacity: usize,

    /// Base retry delay; attempt `k` waits `base * 2^(k-1)`.
    #[serde(default = "default_backoff_base_ms", alias = "backoffBaseMs")]
    pub backoff_base_ms: u64,

    /// Timeout applied to handlers registered without one.
    #[serde(default, alias = "defaultTimeoutMs")]
    pub default_timeout_ms: Option<u64>,

    /// Grace window for in-flight handlers during shutdown.
    #[serde(default = "default_shutdown_grace_ms", alias = "shutdownGraceMs")]
    pub shutdown_grace_ms: u64,

    /// Largest accepted serialized payload.
    #[serde(default = "default_max_payload_bytes", alias = "maxPayloadBytes")]
    pub max_payload_bytes: usize,
}

fn default_history_capacity() -> usize {
    1000
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_shutdown_grace_ms() -> u64 {
    5000
}
fn default_max_payload_bytes() -> usize {
    64 * 1024
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            backoff_base_ms: default_backoff_base_ms(),
            default_timeout_ms: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl DispatcherConfig {
    fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(HavenError::config("dispatcher.history_capacity must be > 0"));
        }
        if self.max_payload_bytes == 0 {
            return Err(HavenError::config("dispatcher.max_payload_bytes must be > 0"));
        }
        Ok(())
    }
}

// ── Safety ───────────────────────────────────────────────────────────────

/// Crisis score thresholds and risk amplification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisThresholds {
    /// Score at or above which the crisis is imminent (emergency).
    #[serde(default = "default_imminent")]
    pub imminent: f64,

    /// Score at or above which severity is high (escalate).
    #[serde(default = "default_high")]
    pub high: f64,

    /// Score at or above which severity is medium (escalate); also the
    /// `is_crisis` cut-off.
    #[serde(default = "default_medium")]
    pub medium: f64,

    /// Multiplier applied when the caller's risk level is high.
    #[serde(default = "default_high_risk_multiplier", alias = "highRiskMultiplier")]
    pub high_risk_multiplier: f64,
}

fn default_imminent() -> f64 {
    15.0
}
fn default_high() -> f64 {
    10.0
}
fn default_medium() -> f64 {
    6.0
}
fn default_high_risk_multiplier() -> f64 {
    1.5
}

impl Default for CrisisThresholds {
    fn default() -> Self {
        Self {
            imminent: default_imminent(),
            high: default_high(),
            medium: default_medium(),
            high_risk_multiplier: default_high_risk_multiplier(),
        }
    }
}

/// Safety gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Crisis scoring thresholds.
    #[serde(default)]
    pub crisis: CrisisThresholds,

    /// Moderation confidence above which a flagged query is rejected.
    #[serde(
        default = "default_moderation_block_confidence",
        alias = "moderationBlockConfidence"
    )]
    pub moderation_block_confidence: f64,

    /// Terms that always reject a query (case-insensitive substring match).
    #[serde(default = "default_prohibited_terms", alias = "prohibitedTerms")]
    pub prohibited_terms: Vec<String>,

    /// Maximum entries kept in the escalation queue.
    #[serde(default = "default_escalation_capacity", alias = "escalationCapacity")]
    pub escalation_capacity: usize,

    /// Override for the scripted crisis-resource message.
    #[serde(default, alias = "crisisMessage")]
    pub crisis_message: Option<String>,
}

fn default_moderation_block_confidence() -> f64 {
    0.8
}
fn default_escalation_capacity() -> usize {
    1000
}
fn default_prohibited_terms() -> Vec<String> {
    [
        "build a bomb",
        "make a weapon",
        "synthesize meth",
        "child sexual",
        "buy a gun illegally",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            crisis: CrisisThresholds::default(),
            moderation_block_confidence: default_moderation_block_confidence(),
            prohibited_terms: default_prohibited_terms(),
            escalation_capacity: default_escalation_capacity(),
            crisis_message: None,
        }
    }
}

impl SafetyConfig {
    fn validate(&self) -> Result<()> {
        let c = &self.crisis;
        if !(c.medium > 0.0 && c.medium < c.high && c.high < c.imminent) {
            return Err(HavenError::config(format!(
                "safety.crisis thresholds must satisfy 0 < medium < high < imminent \
                 (got {} / {} / {})",
                c.medium, c.high, c.imminent
            )));
        }
        if c.high_risk_multiplier < 1.0 {
            return Err(HavenError::config(
                "safety.crisis.high_risk_multiplier must be >= 1.0",
            ));
        }
        check_unit("safety.moderation_block_confidence", self.moderation_block_confidence)?;
        if self.escalation_capacity == 0 {
            return Err(HavenError::config("safety.escalation_capacity must be > 0"));
        }
        Ok(())
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Minimum cache confidence that short-circuits routing.
    #[serde(default = "default_cache_threshold", alias = "cacheThreshold")]
    pub cache_threshold: f64,

    /// Confidence multiplier applied per fallback hop.
    #[serde(default = "default_fallback_discount", alias = "fallbackDiscount")]
    pub fallback_discount: f64,

    /// Confidence of a rule-table decision.
    #[serde(default = "default_rule_confidence", alias = "ruleConfidence")]
    pub rule_confidence: f64,

    /// Confidence of a heuristic decision.
    #[serde(default = "default_heuristic_confidence", alias = "heuristicConfidence")]
    pub heuristic_confidence: f64,

    /// Query length (chars) above which the long-context target is used.
    #[serde(default = "default_long_context_chars", alias = "longContextChars")]
    pub long_context_chars: usize,

    /// Complex-term density above which the long-context target is used.
    #[serde(
        default = "default_complex_density_threshold",
        alias = "complexDensityThreshold"
    )]
    pub complex_density_threshold: f64,

    /// Timeout for a single target invocation.
    #[serde(default = "default_target_timeout_ms", alias = "targetTimeoutMs")]
    pub target_timeout_ms: u64,

    /// Overall deadline for one query, across all fallback hops.
    #[serde(default = "default_query_deadline_ms", alias = "queryDeadlineMs")]
    pub query_deadline_ms: u64,

    /// Sampling temperature when the caller gives none.
    #[serde(default = "default_temperature", alias = "defaultTemperature")]
    pub default_temperature: f64,

    /// Completion token limit when the caller gives none.
    #[serde(default = "default_max_tokens", alias = "defaultMaxTokens")]
    pub default_max_tokens: u32,
}

fn default_cache_threshold() -> f64 {
    0.95
}
fn default_fallback_discount() -> f64 {
    0.8
}
fn default_rule_confidence() -> f64 {
    0.9
}
fn default_heuristic_confidence() -> f64 {
    0.7
}
fn default_long_context_chars() -> usize {
    2000
}
fn default_complex_density_threshold() -> f64 {
    0.15
}
fn default_target_timeout_ms() -> u64 {
    30_000
}
fn default_query_deadline_ms() -> u64 {
    60_000
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_threshold: default_cache_threshold(),
            fallback_discount: default_fallback_discount(),
            rule_confidence: default_rule_confidence(),
            heuristic_confidence: default_heuristic_confidence(),
            long_context_chars: default_long_context_chars(),
            complex_density_threshold: default_complex_density_threshold(),
            target_timeout_ms: default_target_timeout_ms(),
            query_deadline_ms: default_query_deadline_ms(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
        }
    }
}

impl OrchestratorConfig {
    fn validate(&self) -> Result<()> {
        check_unit("orchestrator.cache_threshold", self.cache_threshold)?;
        check_unit("orchestrator.fallback_discount", self.fallback_discount)?;
        check_unit("orchestrator.rule_confidence", self.rule_confidence)?;
        check_unit("orchestrator.heuristic_confidence", self.heuristic_confidence)?;
        if self.target_timeout_ms == 0 || self.query_deadline_ms == 0 {
            return Err(HavenError::config(
                "orchestrator timeouts must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(HavenError::config(format!("{name} must be within [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.dispatcher.history_capacity, 1000);
        assert_eq!(config.safety.crisis.imminent, 15.0);
        assert_eq!(config.safety.crisis.high_risk_multiplier, 1.5);
        assert_eq!(config.orchestrator.cache_threshold, 0.95);
        assert_eq!(config.orchestrator.fallback_discount, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn camel_case_aliases_accepted() {
        let json = r#"{
            "dispatcher": {"historyCapacity": 10, "backoffBaseMs": 5},
            "safety": {"crisis": {"highRiskMultiplier": 2.0}, "prohibitedTerms": ["x"]},
            "orchestrator": {"cacheThreshold": 0.9, "targetTimeoutMs": 100}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.dispatcher.history_capacity, 10);
        assert_eq!(config.dispatcher.backoff_base_ms, 5);
        assert_eq!(config.safety.crisis.high_risk_multiplier, 2.0);
        assert_eq!(config.safety.prohibited_terms, vec!["x".to_string()]);
        assert_eq!(config.orchestrator.cache_threshold, 0.9);
        assert_eq!(config.orchestrator.target_timeout_ms, 100);
    }

    #[test]
    fn unknown_fields_ignored() {
        let config: Config = serde_json::from_str(r#"{"gateway": {"port": 1}}"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn misordered_thresholds_rejected() {
        let mut config = Config::default();
        config.safety.crisis.high = 20.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("medium < high < imminent"));
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let mut config = Config::default();
        config.orchestrator.fallback_discount = 1.2;
        assert!(matches!(
            config.validate(),
            Err(HavenError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn multiplier_below_one_rejected() {
        let mut config = Config::default();
        config.safety.crisis.high_risk_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_history_rejected() {
        let mut config = Config::default();
        config.dispatcher.history_capacity = 0;
        assert!(config.validate().is_err());
    }
}
