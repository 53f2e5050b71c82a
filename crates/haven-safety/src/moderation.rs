//! Content moderation: profanity, harmful advice and PII.
//!
//! Moderation both classifies and cleans. Cleaning masks profanity with
//! `*` and replaces PII with `[REDACTED_<KIND>]`; harmful advice is never
//! cleaned, only flagged.

use regex::Regex;

use haven_types::error::Result;
use haven_types::safety::{ModerationCategory, ModerationResult};

use crate::crisis::compile;

/// Confidence assigned to a harmful-advice match.
const HARMFUL_ADVICE_CONFIDENCE: f64 = 0.95;
/// Confidence assigned to a PII match.
const PII_CONFIDENCE: f64 = 0.85;
/// Profanity confidence in hundredths: base, per extra hit, cap.
const PROFANITY_BASE: u32 = 60;
const PROFANITY_STEP: u32 = 5;
const PROFANITY_CAP: u32 = 85;

const PROFANITY: &str = r"(?i)\b(fuck\w*|shit\w*|bitch\w*|asshole\w*|bastard\w*|dick(head)?s?|cunt\w*|motherfuck\w*)\b";

const HARMFUL_ADVICE: &[&str] = &[
    r"(?i)\bhow\s+(to|do\s+i|can\s+i)\s+(make|build|create)\s+(a\s+)?(bomb|explosive|poison|weapon)",
    r"(?i)\b(lethal|fatal)\s+dose\b",
    r"(?i)\bhow\s+many\s+(pills|tablets)\b.*\b(die|kill|overdose|fatal)\b",
    r"(?i)\b(stop|quit)\s+taking\s+(your|my|all)\s+(medication|meds|medicine)\b",
    r"(?i)\b(you\s+should|just)\s+(hurt|kill|harm)\s+(yourself|them|him|her)\b",
    r"(?i)\b(best|easiest|painless)\s+way\s+to\s+(die|kill)\b",
];

/// PII kinds in replacement order. Card numbers go first so their digit
/// runs are not partially consumed by the phone pattern.
const PII: &[(&str, &str)] = &[
    ("CARD", r"\b(?:\d[ -]?){12,15}\d\b"),
    ("SSN", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("EMAIL", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    ("PHONE", r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b"),
];

/// Regex-driven moderation pass.
pub struct Moderator {
    profanity: Regex,
    harmful: Vec<Regex>,
    pii: Vec<(&'static str, Regex)>,
}

impl Moderator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            profanity: compile(PROFANITY)?,
            harmful: HARMFUL_ADVICE
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?,
            pii: PII
                .iter()
                .map(|(kind, p)| Ok((*kind, compile(p)?)))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Whether `text` contains harmful advice.
    pub fn has_harmful_advice(&self, text: &str) -> bool {
        self.harmful.iter().any(|p| p.is_match(text))
    }

    /// Classify and clean `text`.
    pub fn moderate(&self, text: &str) -> ModerationResult {
        let mut categories = Vec::new();
        let mut confidence: f64 = 0.0;

        let profane_hits = self.profanity.find_iter(text).count() as u32;
        if profane_hits > 0 {
            categories.push(ModerationCategory::Profanity);
            let hundredths =
                (PROFANITY_BASE + PROFANITY_STEP * (profane_hits - 1)).min(PROFANITY_CAP);
            confidence = confidence.max(f64::from(hundredths) / 100.0);
        }

        if self.has_harmful_advice(text) {
            categories.push(ModerationCategory::HarmfulAdvice);
            confidence = confidence.max(HARMFUL_ADVICE_CONFIDENCE);
        }

        let mut cleaned = self
            .profanity
            .replace_all(text, |caps: &regex::Captures<'_>| "*".repeat(caps[0].chars().count()))
            .into_owned();

        let mut pii_found = false;
        for (kind, pattern) in &self.pii {
            if pattern.is_match(&cleaned) {
                pii_found = true;
                cleaned = pattern
                    .replace_all(&cleaned, format!("[REDACTED_{kind}]").as_str())
                    .into_owned();
            }
        }
        if pii_found {
            categories.push(ModerationCategory::Pii);
            confidence = confidence.max(PII_CONFIDENCE);
        }

        ModerationResult {
            flagged: !categories.is_empty(),
            confidence,
            categories,
            cleaned,
        }
    }
}

impl std::fmt::Debug for Moderator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Moderator")
            .field("harmful_patterns", &self.harmful.len())
            .field("pii_kinds", &self.pii.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moderator() -> Moderator {
        Moderator::new().unwrap()
    }

    #[test]
    fn clean_text_is_not_flagged() {
        let result = moderator().moderate("Photosynthesis converts light into energy.");
        assert!(!result.flagged);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.cleaned, "Photosynthesis converts light into energy.");
    }

    #[test]
    fn single_profanity_is_masked_below_block_level() {
        let result = moderator().moderate("this shit is hard");
        assert!(result.flagged);
        assert_eq!(result.categories, vec![ModerationCategory::Profanity]);
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.cleaned, "this **** is hard");
    }

    #[test]
    fn profanity_confidence_grows_and_caps() {
        let result = moderator().moderate("fuck fuck fuck fuck fuck fuck fuck fuck");
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn harmful_advice_is_high_confidence() {
        let result = moderator().moderate("what is the lethal dose of acetaminophen");
        assert!(result.categories.contains(&ModerationCategory::HarmfulAdvice));
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn pii_is_redacted() {
        let result = moderator()
            .moderate("mail me at jane.doe@example.com or call 555-123-4567, ssn 123-45-6789");
        assert!(result.categories.contains(&ModerationCategory::Pii));
        assert!(result.cleaned.contains("[REDACTED_EMAIL]"));
        assert!(result.cleaned.contains("[REDACTED_PHONE]"));
        assert!(result.cleaned.contains("[REDACTED_SSN]"));
        assert!(!result.cleaned.contains("example.com"));
    }

    #[test]
    fn card_number_is_redacted_whole() {
        let result = moderator().moderate("card 4111 1111 1111 1111 please");
        assert_eq!(result.cleaned, "card [REDACTED_CARD] please");
    }

    #[test]
    fn categories_combine() {
        let result = moderator().moderate("damn bastard, email x@y.io");
        assert_eq!(
            result.categories,
            vec![ModerationCategory::Profanity, ModerationCategory::Pii]
        );
        assert_eq!(result.confidence, PII_CONFIDENCE);
    }
}
