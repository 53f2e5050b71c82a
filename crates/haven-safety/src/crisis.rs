//! Crisis scoring.
//!
//! The score is the sum of every matching keyword weight plus a bonus from
//! the first matching intent pattern family (families are checked in
//! descending severity). Callers at high risk get the configured
//! multiplier. The result is banded against [`CrisisThresholds`].

use regex::Regex;
use tracing::debug;

use haven_types::config::CrisisThresholds;
use haven_types::error::{HavenError, Result};
use haven_types::safety::{CrisisScore, CrisisSeverity, CrisisType, RecommendedAction};
use haven_types::user::RiskLevel;

/// Risk keywords and their weights (1--10). Matched as case-insensitive
/// substrings.
const KEYWORDS: &[(&str, f64)] = &[
    ("suicide", 10.0),
    ("kill myself", 10.0),
    ("end my life", 10.0),
    ("want to die", 9.0),
    ("better off dead", 9.0),
    ("kill someone", 9.0),
    ("overdose", 8.0),
    ("no reason to live", 8.0),
    ("self harm", 8.0),
    ("self-harm", 8.0),
    ("hurt myself", 8.0),
    ("cut myself", 8.0),
    ("give up on life", 7.0),
    ("hurt someone", 7.0),
    ("can't go on", 6.0),
    ("cant go on", 6.0),
    ("hopeless", 5.0),
    ("burden to everyone", 5.0),
    ("worthless", 4.0),
    ("depressed", 3.0),
    ("alone forever", 3.0),
    ("panic attack", 2.0),
];

/// Intent pattern families in descending severity.
const INTENT_FAMILIES: &[(CrisisType, f64, &[&str])] = &[
    (
        CrisisType::Suicidal,
        15.0,
        &[
            r"(?i)\b(want|going|plan(ning)?|ready|try(ing)?)\s+to\s+(die|end\s+(my\s+life|it\s+all)|kill\s+myself)\b",
            r"(?i)\b(take|end)\s+my\s+(own\s+)?life\b",
            r"(?i)\bsuicid(e|al)\s+(thoughts?|plan|note|attempt)\b",
        ],
    ),
    (
        CrisisType::SelfHarm,
        12.0,
        &[
            r"(?i)\b(cut|cutting|burn|burning|hurt|hurting|harm|harming)\s+myself\b",
            r"(?i)\bself[\s-]?harm(ing)?\b",
        ],
    ),
    (
        CrisisType::Violent,
        10.0,
        &[
            r"(?i)\b(kill|hurt|shoot|stab|attack)\s+(him|her|them|someone|somebody|people|everyone)\b",
            r"(?i)\b(going|want|plan(ning)?)\s+to\s+(hurt|kill)\s+(him|her|them|someone|somebody|people|everyone|you)\b",
        ],
    ),
];

struct IntentFamily {
    crisis_type: CrisisType,
    bonus: f64,
    patterns: Vec<Regex>,
}

/// Weighted keyword and intent-pattern crisis scorer.
pub struct CrisisDetector {
    thresholds: CrisisThresholds,
    families: Vec<IntentFamily>,
}

impl CrisisDetector {
    /// Build a detector with the given thresholds.
    pub fn new(thresholds: CrisisThresholds) -> Result<Self> {
        let families = INTENT_FAMILIES
            .iter()
            .map(|(crisis_type, bonus, patterns)| {
                let patterns = patterns
                    .iter()
                    .map(|p| compile(p))
                    .collect::<Result<Vec<_>>>()?;
                Ok(IntentFamily {
                    crisis_type: *crisis_type,
                    bonus: *bonus,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            thresholds,
            families,
        })
    }

    /// Thresholds in use.
    pub fn thresholds(&self) -> &CrisisThresholds {
        &self.thresholds
    }

    /// Score `text` for a caller at `risk`.
    pub fn score(&self, text: &str, risk: RiskLevel) -> CrisisScore {
        let lowered = text.to_lowercase();

        let mut raw = 0.0;
        let mut matched_terms = Vec::new();
        for (phrase, weight) in KEYWORDS {
            if lowered.contains(phrase) {
                raw += weight;
                matched_terms.push((*phrase).to_string());
            }
        }

        let crisis_type = self
            .families
            .iter()
            .find(|f| f.patterns.iter().any(|p| p.is_match(text)));
        if let Some(family) = crisis_type {
            raw += family.bonus;
        }

        let score = if risk == RiskLevel::High {
            raw * self.thresholds.high_risk_multiplier
        } else {
            raw
        };

        let t = &self.thresholds;
        let (severity, recommended_action) = if score >= t.imminent {
            (CrisisSeverity::Imminent, RecommendedAction::Emergency)
        } else if score >= t.high {
            (CrisisSeverity::High, RecommendedAction::Escalate)
        } else if score >= t.medium {
            (CrisisSeverity::Medium, RecommendedAction::Escalate)
        } else {
            (CrisisSeverity::Low, RecommendedAction::Monitor)
        };

        if raw > 0.0 {
            debug!(
                score,
                raw_score = raw,
                %risk,
                terms = matched_terms.len(),
                crisis_type = ?crisis_type.map(|f| f.crisis_type),
                "crisis indicators matched"
            );
        }

        CrisisScore {
            score,
            raw_score: raw,
            severity,
            recommended_action,
            crisis_type: crisis_type.map(|f| f.crisis_type),
            matched_terms,
            is_crisis: score >= t.medium,
        }
    }
}

impl std::fmt::Debug for CrisisDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrisisDetector")
            .field("thresholds", &self.thresholds)
            .field("families", &self.families.len())
            .finish()
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| HavenError::Internal(format!("invalid safety pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CrisisDetector {
        CrisisDetector::new(CrisisThresholds::default()).unwrap()
    }

    #[test]
    fn benign_text_scores_zero() {
        let score = detector().score("What is the capital of France?", RiskLevel::Low);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.severity, CrisisSeverity::Low);
        assert_eq!(score.recommended_action, RecommendedAction::Monitor);
        assert!(!score.is_crisis);
        assert!(score.crisis_type.is_none());
    }

    #[test]
    fn end_my_life_is_imminent() {
        let score = detector().score("I want to end my life", RiskLevel::Low);
        assert!(score.score >= 15.0, "score was {}", score.score);
        assert_eq!(score.severity, CrisisSeverity::Imminent);
        assert_eq!(score.recommended_action, RecommendedAction::Emergency);
        assert_eq!(score.crisis_type, Some(CrisisType::Suicidal));
        assert!(score.matched_terms.contains(&"end my life".to_string()));
        assert!(score.is_crisis);
    }

    #[test]
    fn moderate_distress_escalates() {
        let score = detector().score("I feel hopeless and worthless lately", RiskLevel::Low);
        assert_eq!(score.score, 9.0);
        assert_eq!(score.severity, CrisisSeverity::Medium);
        assert_eq!(score.recommended_action, RecommendedAction::Escalate);
        assert!(score.is_crisis);
    }

    #[test]
    fn high_band() {
        let score = detector().score("everything is hopeless, I can't go on", RiskLevel::Low);
        assert_eq!(score.score, 11.0);
        assert_eq!(score.severity, CrisisSeverity::High);
        assert_eq!(score.recommended_action, RecommendedAction::Escalate);
    }

    #[test]
    fn first_family_by_severity_wins() {
        // Matches both self-harm and violent families.
        let score = detector().score("I might hurt myself or hurt someone", RiskLevel::Low);
        assert_eq!(score.crisis_type, Some(CrisisType::SelfHarm));
    }

    #[test]
    fn violent_intent_needs_a_person() {
        let d = detector();
        for text in [
            "I want to kill some time before class, any podcast ideas?",
            "I'm going to kill it at my job interview tomorrow",
            "planning to hurt my chances by skipping the review",
        ] {
            let score = d.score(text, RiskLevel::Low);
            assert!(score.score < d.thresholds().medium, "{text}: {}", score.score);
            assert!(score.crisis_type.is_none(), "{text}");
            assert!(!score.is_crisis);
        }

        let score = d.score("I am going to hurt them tonight", RiskLevel::Low);
        assert_eq!(score.crisis_type, Some(CrisisType::Violent));
    }

    #[test]
    fn high_risk_amplifies() {
        let d = detector();
        let text = "I feel hopeless";
        let low = d.score(text, RiskLevel::Low);
        let high = d.score(text, RiskLevel::High);
        assert_eq!(low.score, 5.0);
        assert_eq!(high.score, 7.5);
        assert_eq!(high.raw_score, low.raw_score);
        assert!(!low.is_crisis);
        assert!(high.is_crisis);
    }

    #[test]
    fn medium_risk_is_not_amplified() {
        let d = detector();
        let text = "I feel hopeless";
        assert_eq!(
            d.score(text, RiskLevel::Medium).score,
            d.score(text, RiskLevel::Low).score
        );
    }

    #[test]
    fn adding_keyword_never_lowers_score() {
        let d = detector();
        let base = "I have been so tired and everything feels pointless";
        let before = d.score(base, RiskLevel::Low);
        for (phrase, _) in KEYWORDS {
            let after = d.score(&format!("{base} {phrase}"), RiskLevel::Low);
            assert!(after.score >= before.score, "adding {phrase:?}");
            assert!(after.is_crisis || !before.is_crisis);
        }
    }

    #[test]
    fn custom_thresholds_apply() {
        let d = CrisisDetector::new(CrisisThresholds {
            imminent: 8.0,
            high: 5.0,
            medium: 2.0,
            high_risk_multiplier: 2.0,
        })
        .unwrap();
        let score = d.score("feeling depressed", RiskLevel::Low);
        assert_eq!(score.severity, CrisisSeverity::Medium);
        let score = d.score("feeling depressed", RiskLevel::High);
        assert_eq!(score.score, 6.0);
        assert_eq!(score.severity, CrisisSeverity::High);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let score = detector().score("I WANT TO DIE", RiskLevel::Low);
        assert!(score.matched_terms.contains(&"want to die".to_string()));
        assert_eq!(score.crisis_type, Some(CrisisType::Suicidal));
    }
}
