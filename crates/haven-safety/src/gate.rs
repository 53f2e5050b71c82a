//! Query and response validation.
//!
//! Query validation runs in a fixed order and stops at the first decisive
//! step:
//!
//! 1. crisis scoring (emergency short-circuits with the crisis message),
//! 2. moderation above the block confidence,
//! 3. prohibited terms,
//! 4. non-emergency crisis: consent required, escalation when present,
//! 5. pass.
//!
//! Any internal failure, including a feature lookup error or a panic,
//! fails closed with an unsafe/medium verdict.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, error, warn};

use haven_types::config::SafetyConfig;
use haven_types::error::{HavenError, Result};
use haven_types::safety::{
    CrisisScore, CrisisSeverity, ModerationCategory, ModerationResult, RecommendedAction,
    ResponseCheck, SafetyVerdict, Severity,
};
use haven_types::user::RiskLevel;

use crate::crisis::CrisisDetector;
use crate::escalation::EscalationQueue;
use crate::features::FeatureLookup;
use crate::moderation::Moderator;

/// Default crisis-resource message.
pub const CRISIS_MESSAGE: &str = "It sounds like you are going through something really painful, \
and you deserve support right now. If you are in immediate danger or thinking about ending your \
life, please call or text 988 (Suicide & Crisis Lifeline, US) or contact your local emergency \
number. You do not have to face this alone.";

/// Shown when a crisis is detected and the user has not opted in to
/// mental-health features.
pub const CONSENT_MESSAGE: &str = "It sounds like you may be having a hard time. To talk about \
this here, please enable mental-health support in your settings. If you need help right away, \
call or text 988 or contact your local emergency number.";

/// Shown when a consenting user's query is escalated for human follow-up.
pub const ESCALATION_MESSAGE: &str = "Thank you for sharing this with me. A member of our support \
team will follow up with you. If things feel urgent, please call or text 988 or contact your \
local emergency number.";

/// Replacement for a response that failed validation.
pub const SAFE_ALTERNATIVE: &str = "I'm not able to share that response. If you are struggling, \
please consider reaching out to someone you trust or a professional. In a crisis, call or text \
988 or contact your local emergency number.";

const MODERATION_MESSAGE: &str =
    "I can't help with that request. Please rephrase it without harmful or personal content.";
const PROHIBITED_MESSAGE: &str = "I can't help with that request.";
const FAIL_CLOSED_MESSAGE: &str =
    "I'm unable to process this request right now. Please try again later.";

/// Confidence reported for crisis verdicts.
const CRISIS_CONFIDENCE: f64 = 0.95;
/// Confidence reported when failing closed.
const FAIL_CLOSED_CONFIDENCE: f64 = 0.5;

/// Terms that mark a response as pointing the user at help rather than
/// echoing crisis language.
const RESOURCE_MARKERS: &[&str] = &["988", "crisis line", "lifeline", "hotline", "emergency number"];

/// Side-channel notice sent when a query is escalated.
#[derive(Debug, Clone, Serialize)]
pub struct CrisisNotification {
    pub user_id: String,
    pub escalation_id: String,
    pub severity: Severity,
    pub crisis: CrisisScore,
}

/// Receiver for crisis notifications (human-review queue, pager, ...).
#[async_trait]
pub trait CrisisNotifier: Send + Sync {
    async fn notify(&self, notification: CrisisNotification);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl CrisisNotifier for NoopNotifier {
    async fn notify(&self, notification: CrisisNotification) {
        debug!(
            user_id = %notification.user_id,
            escalation_id = %notification.escalation_id,
            "crisis notification dropped (no notifier configured)"
        );
    }
}

/// What query evaluation decided, before escalation side effects.
struct Assessment {
    verdict: SafetyVerdict,
    crisis: Option<CrisisScore>,
}

/// The safety gate.
pub struct SafetyGate {
    config: SafetyConfig,
    detector: CrisisDetector,
    moderator: Moderator,
    prohibited: Vec<String>,
    features: Arc<dyn FeatureLookup>,
    escalations: EscalationQueue,
    notifier: Arc<dyn CrisisNotifier>,
}

impl SafetyGate {
    /// Build a gate. Fails if the configuration is invalid.
    pub fn new(config: SafetyConfig, features: Arc<dyn FeatureLookup>) -> Result<Self> {
        let detector = CrisisDetector::new(config.crisis.clone())?;
        let moderator = Moderator::new()?;
        let prohibited = config
            .prohibited_terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Ok(Self {
            escalations: EscalationQueue::new(config.escalation_capacity),
            config,
            detector,
            moderator,
            prohibited,
            features,
            notifier: Arc::new(NoopNotifier),
        })
    }

    /// Replace the crisis notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn CrisisNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The escalation queue.
    pub fn escalations(&self) -> &EscalationQueue {
        &self.escalations
    }

    /// The feature lookup this gate consults.
    pub fn features(&self) -> &Arc<dyn FeatureLookup> {
        &self.features
    }

    /// Crisis-score `text` without running the full flow.
    pub fn crisis_score(&self, text: &str, risk: RiskLevel) -> CrisisScore {
        self.detector.score(text, risk)
    }

    /// Run moderation on `text`.
    pub fn moderate(&self, text: &str) -> ModerationResult {
        self.moderator.moderate(text)
    }

    fn crisis_message(&self) -> &str {
        self.config.crisis_message.as_deref().unwrap_or(CRISIS_MESSAGE)
    }

    /// Validate an inbound query for `user_id`.
    ///
    /// Never errors: internal failures produce an unsafe verdict.
    pub async fn validate_query(&self, text: &str, user_id: &str) -> SafetyVerdict {
        let outcome = AssertUnwindSafe(self.assess_query(text, user_id))
            .catch_unwind()
            .await;
        let assessment = match outcome {
            Ok(Ok(assessment)) => assessment,
            Ok(Err(e)) => {
                error!(user_id, error = %e, "query validation failed, failing closed");
                return fail_closed();
            }
            Err(_) => {
                error!(user_id, "query validation panicked, failing closed");
                return fail_closed();
            }
        };

        let verdict = assessment.verdict;
        if !verdict.safe {
            warn!(
                user_id,
                severity = %verdict.severity,
                violations = ?verdict.violations,
                escalate = verdict.escalate,
                "query rejected by safety gate"
            );
        }

        if verdict.escalate {
            let escalation_id = self.escalations.enqueue(user_id, &verdict, text);
            if let Some(crisis) = assessment.crisis {
                self.notifier
                    .notify(CrisisNotification {
                        user_id: user_id.to_string(),
                        escalation_id,
                        severity: verdict.severity,
                        crisis,
                    })
                    .await;
            }
        }
        verdict
    }

    async fn assess_query(&self, text: &str, user_id: &str) -> Result<Assessment> {
        if text.trim().is_empty() {
            return Err(HavenError::validation("query text is empty"));
        }
        let features = self.features.user_features(user_id).await?;
        let crisis = self.detector.score(text, features.risk_level);

        // 1. Emergency.
        if crisis.recommended_action == RecommendedAction::Emergency {
            let verdict = SafetyVerdict::reject(
                Severity::Critical,
                CRISIS_CONFIDENCE,
                crisis.matched_terms.clone(),
                self.crisis_message(),
            )
            .escalated(true);
            return Ok(Assessment {
                verdict,
                crisis: Some(crisis),
            });
        }

        // 2. Moderation.
        let moderation = self.moderator.moderate(text);
        if moderation.flagged && moderation.confidence > self.config.moderation_block_confidence {
            let severity = if moderation
                .categories
                .contains(&ModerationCategory::HarmfulAdvice)
            {
                Severity::High
            } else {
                Severity::Medium
            };
            let violations = moderation.categories.iter().map(ToString::to_string).collect();
            return Ok(Assessment {
                verdict: SafetyVerdict::reject(
                    severity,
                    moderation.confidence,
                    violations,
                    MODERATION_MESSAGE,
                ),
                crisis: None,
            });
        }

        // 3. Prohibited terms.
        let lowered = text.to_lowercase();
        if let Some(term) = self.prohibited.iter().find(|t| lowered.contains(t.as_str())) {
            return Ok(Assessment {
                verdict: SafetyVerdict::reject(
                    Severity::High,
                    1.0,
                    vec![format!("prohibited_term:{term}")],
                    PROHIBITED_MESSAGE,
                ),
                crisis: None,
            });
        }

        // 4. Crisis below emergency.
        if crisis.is_crisis {
            if !features.consent_flags.mental_health_features {
                let mut violations = vec!["mental_health_consent_required".to_string()];
                violations.extend(crisis.matched_terms.iter().cloned());
                return Ok(Assessment {
                    verdict: SafetyVerdict::reject(
                        Severity::Medium,
                        CRISIS_CONFIDENCE,
                        violations,
                        CONSENT_MESSAGE,
                    ),
                    crisis: Some(crisis),
                });
            }
            let severity = match crisis.severity {
                CrisisSeverity::High | CrisisSeverity::Imminent => Severity::High,
                CrisisSeverity::Medium | CrisisSeverity::Low => Severity::Medium,
            };
            let escalate = crisis.recommended_action == RecommendedAction::Escalate;
            let verdict = SafetyVerdict {
                safe: true,
                confidence: CRISIS_CONFIDENCE,
                violations: crisis.matched_terms.clone(),
                severity,
                escalate,
                message: escalate.then(|| ESCALATION_MESSAGE.to_string()),
            };
            return Ok(Assessment {
                verdict,
                crisis: Some(crisis),
            });
        }

        // 5. Pass.
        Ok(Assessment {
            verdict: SafetyVerdict::pass(),
            crisis: None,
        })
    }

    /// Validate model output before it reaches a user.
    ///
    /// Harmful advice and first-person crisis language (without pointing
    /// at crisis resources) are unsafe. Profanity and PII are cleaned but
    /// do not make the response unsafe on their own.
    pub fn validate_response(&self, text: &str) -> ResponseCheck {
        let moderation = self.moderator.moderate(text);

        if moderation.categories.contains(&ModerationCategory::HarmfulAdvice) {
            warn!("response contains harmful advice");
            return ResponseCheck {
                verdict: SafetyVerdict::reject(
                    Severity::High,
                    moderation.confidence,
                    vec![ModerationCategory::HarmfulAdvice.to_string()],
                    SAFE_ALTERNATIVE,
                ),
                cleaned: moderation.cleaned,
            };
        }

        let crisis = self.detector.score(text, RiskLevel::Low);
        let lowered = text.to_lowercase();
        let points_to_help = RESOURCE_MARKERS.iter().any(|m| lowered.contains(m));
        if let Some(crisis_type) = crisis.crisis_type
            && !points_to_help
        {
            warn!(%crisis_type, "response echoes crisis language");
            return ResponseCheck {
                verdict: SafetyVerdict::reject(
                    Severity::High,
                    CRISIS_CONFIDENCE,
                    vec![format!("crisis_language:{crisis_type}")],
                    SAFE_ALTERNATIVE,
                ),
                cleaned: moderation.cleaned,
            };
        }

        let mut verdict = SafetyVerdict::pass();
        verdict.violations = moderation.categories.iter().map(ToString::to_string).collect();
        ResponseCheck {
            verdict,
            cleaned: moderation.cleaned,
        }
    }
}

impl std::fmt::Debug for SafetyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyGate")
            .field("detector", &self.detector)
            .field("prohibited_terms", &self.prohibited.len())
            .field("escalations", &self.escalations.len())
            .finish()
    }
}

fn fail_closed() -> SafetyVerdict {
    SafetyVerdict::reject(
        Severity::Medium,
        FAIL_CLOSED_CONFIDENCE,
        vec!["internal_error".into()],
        FAIL_CLOSED_MESSAGE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::StaticFeatureStore;
    use haven_types::user::{ConsentFlags, UserFeatures};
    use parking_lot::Mutex;

    struct BrokenLookup;

    #[async_trait]
    impl FeatureLookup for BrokenLookup {
        async fn user_features(&self, _user_id: &str) -> Result<UserFeatures> {
            Err(HavenError::Internal("feature store offline".into()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<CrisisNotification>>,
    }

    #[async_trait]
    impl CrisisNotifier for RecordingNotifier {
        async fn notify(&self, notification: CrisisNotification) {
            self.seen.lock().push(notification);
        }
    }

    fn features(risk: RiskLevel, consent: bool) -> UserFeatures {
        UserFeatures {
            risk_level: risk,
            consent_flags: ConsentFlags {
                mental_health_features: consent,
                personalization: false,
            },
            ..UserFeatures::default()
        }
    }

    fn gate_with(store: StaticFeatureStore) -> SafetyGate {
        SafetyGate::new(SafetyConfig::default(), Arc::new(store)).unwrap()
    }

    #[tokio::test]
    async fn benign_query_passes() {
        let gate = gate_with(StaticFeatureStore::new());
        let verdict = gate
            .validate_query("How do plants make food from sunlight?", "u1")
            .await;
        assert_eq!(verdict, SafetyVerdict::pass());
        assert!(gate.escalations().is_empty());
    }

    #[tokio::test]
    async fn emergency_is_critical_and_escalated() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate_with(StaticFeatureStore::new()).with_notifier(notifier.clone());

        let verdict = gate.validate_query("I want to end my life", "u1").await;

        assert!(!verdict.safe);
        assert!(verdict.escalate);
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.message.as_deref().unwrap_or_default().contains("988"));
        assert!(verdict.violations.contains(&"end my life".to_string()));
        assert_eq!(gate.escalations().pending(Some("u1")).len(), 1);
        assert_eq!(notifier.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn crisis_message_can_be_overridden() {
        let config = SafetyConfig {
            crisis_message: Some("call the clinic".into()),
            ..SafetyConfig::default()
        };
        let gate = SafetyGate::new(config, Arc::new(StaticFeatureStore::new())).unwrap();
        let verdict = gate.validate_query("I want to end my life", "u1").await;
        assert_eq!(verdict.message.as_deref(), Some("call the clinic"));
    }

    #[tokio::test]
    async fn harmful_request_rejected_without_escalation() {
        let gate = gate_with(StaticFeatureStore::new());
        let verdict = gate
            .validate_query("how do i make a poison at home", "u1")
            .await;
        assert!(!verdict.safe);
        assert!(!verdict.escalate);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.violations, vec!["harmful_advice".to_string()]);
    }

    #[tokio::test]
    async fn mild_profanity_passes() {
        let gate = gate_with(StaticFeatureStore::new());
        let verdict = gate
            .validate_query("this damn shit homework is confusing", "u1")
            .await;
        assert!(verdict.safe);
    }

    #[tokio::test]
    async fn prohibited_term_rejected_high() {
        let gate = gate_with(StaticFeatureStore::new());
        let verdict = gate
            .validate_query("Where can I Buy A Gun Illegally?", "u1")
            .await;
        assert!(!verdict.safe);
        assert!(!verdict.escalate);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(
            verdict.violations,
            vec!["prohibited_term:buy a gun illegally".to_string()]
        );
    }

    #[tokio::test]
    async fn crisis_without_consent_requests_consent() {
        let gate = gate_with(StaticFeatureStore::new());
        let verdict = gate.validate_query("I feel hopeless and worthless", "u1").await;
        assert!(!verdict.safe);
        assert!(!verdict.escalate);
        assert!(
            verdict
                .violations
                .contains(&"mental_health_consent_required".to_string())
        );
        assert_eq!(verdict.message.as_deref(), Some(CONSENT_MESSAGE));
    }

    #[tokio::test]
    async fn crisis_with_consent_is_safe_but_escalated() {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = StaticFeatureStore::new().with_user("u1", features(RiskLevel::Low, true));
        let gate = gate_with(store).with_notifier(notifier.clone());

        let verdict = gate.validate_query("I feel hopeless and worthless", "u1").await;

        assert!(verdict.safe);
        assert!(verdict.escalate);
        assert!(verdict.blocks_processing());
        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(gate.escalations().len(), 1);
        let seen = notifier.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user_id, "u1");
    }

    #[tokio::test]
    async fn high_risk_user_crosses_crisis_threshold() {
        let store = StaticFeatureStore::new()
            .with_user("risky", features(RiskLevel::High, false))
            .with_user("calm", features(RiskLevel::Low, false));
        let gate = gate_with(store);
        assert!(gate.validate_query("I feel hopeless", "calm").await.safe);
        assert!(!gate.validate_query("I feel hopeless", "risky").await.safe);
    }

    #[tokio::test]
    async fn lookup_failure_fails_closed() {
        let gate = SafetyGate::new(SafetyConfig::default(), Arc::new(BrokenLookup)).unwrap();
        let verdict = gate.validate_query("hello", "u1").await;
        assert!(!verdict.safe);
        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(verdict.violations, vec!["internal_error".to_string()]);
    }

    #[tokio::test]
    async fn empty_query_fails_closed() {
        let gate = gate_with(StaticFeatureStore::new());
        assert!(!gate.validate_query("   ", "u1").await.safe);
    }

    #[test]
    fn response_with_harmful_advice_is_unsafe() {
        let gate = gate_with(StaticFeatureStore::new());
        let check = gate.validate_response("The lethal dose is about ten grams.");
        assert!(!check.verdict.safe);
        assert_eq!(check.verdict.message.as_deref(), Some(SAFE_ALTERNATIVE));
    }

    #[test]
    fn response_echoing_crisis_language_is_unsafe() {
        let gate = gate_with(StaticFeatureStore::new());
        let check = gate.validate_response("Sometimes I also want to end it all.");
        assert!(!check.verdict.safe);
    }

    #[test]
    fn supportive_response_mentioning_resources_is_safe() {
        let gate = gate_with(StaticFeatureStore::new());
        let check = gate.validate_response(
            "If you want to end your life or feel suicidal, please call 988 right away.",
        );
        assert!(check.verdict.safe);
    }

    #[test]
    fn response_pii_is_cleaned_not_blocked() {
        let gate = gate_with(StaticFeatureStore::new());
        let check = gate.validate_response("You can email support@example.org for help.");
        assert!(check.verdict.safe);
        assert_eq!(check.verdict.violations, vec!["pii".to_string()]);
        assert_eq!(check.cleaned, "You can email [REDACTED_EMAIL] for help.");
    }
}
