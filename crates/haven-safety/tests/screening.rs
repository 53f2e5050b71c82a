//! Safety gate screening tests.
//!
//! Exercise the public gate surface with stub feature stores and a
//! recording notifier.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use haven_safety::{
    CrisisNotification, CrisisNotifier, FeatureLookup, SafetyGate, StaticFeatureStore,
};
use haven_types::config::SafetyConfig;
use haven_types::error::{HavenError, Result};
use haven_types::safety::{EscalationStatus, Severity};
use haven_types::user::{ConsentFlags, RiskLevel, UserFeatures};

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

struct BrokenStore;

#[async_trait]
impl FeatureLookup for BrokenStore {
    async fn user_features(&self, _user_id: &str) -> Result<UserFeatures> {
        Err(HavenError::Internal("feature store offline".into()))
    }
}

fn user(risk: RiskLevel, consent: bool) -> UserFeatures {
    UserFeatures {
        risk_level: risk,
        consent_flags: ConsentFlags {
            mental_health_features: consent,
            personalization: false,
        },
        ..UserFeatures::default()
    }
}

fn gate(store: StaticFeatureStore) -> (SafetyGate, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let gate = SafetyGate::new(SafetyConfig::default(), Arc::new(store))
        .unwrap()
        .with_notifier(notifier.clone());
    (gate, notifier)
}

/// Test 1: a feature store outage fails closed.
#[tokio::test]
async fn feature_store_outage_fails_closed() {
    let gate = SafetyGate::new(SafetyConfig::default(), Arc::new(BrokenStore)).unwrap();
    let verdict = gate.validate_query("What's the capital of France?", "u1").await;
    assert!(!verdict.safe);
    assert_eq!(verdict.severity, Severity::Medium);
    assert_eq!(verdict.violations, vec!["internal_error".to_string()]);
}

/// Test 2: ordinary questions pass with no escalation.
#[tokio::test]
async fn ordinary_question_passes() {
    let (gate, notifier) = gate(StaticFeatureStore::new());
    let verdict = gate.validate_query("What's the capital of France?", "u1").await;
    assert!(verdict.safe);
    assert!(!verdict.escalate);
    assert!(!verdict.blocks_processing());
    assert!(gate.escalations().is_empty());
    assert!(notifier.seen.lock().is_empty());
}

/// Test 3: an emergency is escalated, queued and notified exactly once.
#[tokio::test]
async fn emergency_is_queued_and_notified() {
    let (gate, notifier) = gate(StaticFeatureStore::new());
    let verdict = gate
        .validate_query("I have pills and I am going to kill myself tonight", "u7")
        .await;
    assert!(!verdict.safe);
    assert!(verdict.escalate);
    assert_eq!(verdict.severity, Severity::Critical);
    assert!(verdict.message.as_deref().unwrap_or_default().contains("988"));

    let pending = gate.escalations().pending(Some("u7"));
    assert_eq!(pending.len(), 1);
    let seen = notifier.seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].escalation_id, pending[0].id);
    assert_eq!(seen[0].user_id, "u7");
}

/// Test 4: an operator resolves an escalation once; resolving again fails.
#[tokio::test]
async fn operator_resolves_escalation_once() {
    let (gate, _) = gate(StaticFeatureStore::new());
    gate.validate_query("I want to end my life", "u7").await;
    let entry_id = gate.escalations().pending(None)[0].id.clone();

    let handled = gate
        .escalations()
        .resolve(&entry_id, "operator-1", Some("called the user".into()))
        .unwrap();
    assert_eq!(handled.status, EscalationStatus::Handled);
    assert_eq!(handled.handled_by.as_deref(), Some("operator-1"));
    assert!(gate.escalations().pending(None).is_empty());

    let err = gate
        .escalations()
        .resolve(&entry_id, "operator-2", None)
        .unwrap_err();
    assert!(matches!(err, HavenError::Validation { .. }));
}

/// Test 5: crisis language without consent asks for consent; with consent
/// it is escalated for follow-up.
#[tokio::test]
async fn consent_decides_between_prompt_and_escalation() {
    let store = StaticFeatureStore::new()
        .with_user("opted-in", user(RiskLevel::Low, true))
        .with_user("opted-out", user(RiskLevel::Low, false));
    let (gate, _) = gate(store);
    let text = "I feel hopeless and worthless";

    let declined = gate.validate_query(text, "opted-out").await;
    assert!(!declined.safe);
    assert!(!declined.escalate);
    assert!(
        declined
            .violations
            .contains(&"mental_health_consent_required".to_string())
    );

    let escalated = gate.validate_query(text, "opted-in").await;
    assert!(escalated.safe);
    assert!(escalated.escalate);
    assert!(escalated.blocks_processing());
    assert_eq!(gate.escalations().pending(Some("opted-in")).len(), 1);
    assert!(gate.escalations().pending(Some("opted-out")).is_empty());
}

/// Test 6: personal data in a query blocks it.
#[tokio::test]
async fn personal_data_blocks_query() {
    let (gate, _) = gate(StaticFeatureStore::new());
    let verdict = gate
        .validate_query("my ssn is 123-45-6789, can you store it?", "u1")
        .await;
    assert!(!verdict.safe);
    assert!(!verdict.escalate);
}

/// Test 7: raising the user's risk never lowers the crisis score.
#[test]
fn risk_never_lowers_crisis_score() {
    let (gate, _) = gate(StaticFeatureStore::new());
    let corpus = [
        "",
        "what is the weather like",
        "I feel depressed",
        "hopeless and worthless",
        "I want to hurt myself",
        "I can't go on anymore",
        "I want to end my life",
        "I am going to hurt someone",
    ];
    for text in corpus {
        let low = gate.crisis_score(text, RiskLevel::Low).score;
        let medium = gate.crisis_score(text, RiskLevel::Medium).score;
        let high = gate.crisis_score(text, RiskLevel::High).score;
        assert!(medium >= low, "{text}: medium {medium} < low {low}");
        assert!(high >= medium, "{text}: high {high} < medium {medium}");
    }
}

/// Test 8: responses echoing crisis intent without resources are rejected;
/// the same language alongside crisis resources passes.
#[test]
fn crisis_language_in_responses_needs_resources() {
    let (gate, _) = gate(StaticFeatureStore::new());

    let echoed = gate.validate_response("Honestly, I want to end it all too.");
    assert!(!echoed.verdict.safe);
    assert!(echoed.verdict.violations[0].starts_with("crisis_language:"));

    let supportive = gate.validate_response(
        "When you say you want to die, please call or text 988 right now. You are not alone.",
    );
    assert!(supportive.verdict.safe, "{:?}", supportive.verdict);
}
