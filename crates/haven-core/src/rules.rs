//! Routing rule table.
//!
//! Rules are plain data: a predicate over [`QueryContext`], the action it
//! selects, a priority and a rationale. [`evaluate`] is a pure function
//! over the table; the highest-priority match wins and ties go to the
//! earlier rule.

use std::fmt;

use haven_types::config::OrchestratorConfig;
use haven_types::routing::{QueryContext, QueryPriority, TargetAction};
use haven_types::user::RiskLevel;

type Predicate = Box<dyn Fn(&QueryContext) -> bool + Send + Sync>;

/// One entry in the rule table.
pub struct RoutingRule {
    pub name: &'static str,
    pub priority: u32,
    pub action: TargetAction,
    pub rationale: &'static str,
    predicate: Predicate,
}

impl RoutingRule {
    pub fn new(
        name: &'static str,
        priority: u32,
        action: TargetAction,
        rationale: &'static str,
        predicate: impl Fn(&QueryContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            priority,
            action,
            rationale,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, ctx: &QueryContext) -> bool {
        (self.predicate)(ctx)
    }
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("action", &self.action)
            .finish()
    }
}

const MENTAL_HEALTH_TERMS: &[&str] = &[
    "anxious",
    "anxiety",
    "depress",
    "stress",
    "lonely",
    "loneliness",
    "sad",
    "therapy",
    "therapist",
    "mental health",
    "panic",
    "overwhelmed",
    "grief",
    "grieving",
    "hopeless",
];

const TECHNICAL_TERMS: &[&str] = &[
    "code",
    "coding",
    "function",
    "bug",
    "compile",
    "compiler",
    "python",
    "rust",
    "javascript",
    "typescript",
    "sql",
    "api",
    "debug",
    "algorithm",
    "program",
    "stack trace",
    "exception",
];

const EDUCATIONAL_TERMS: &[&str] = &[
    "homework",
    "understand",
    "explain",
    "learn",
    "study",
    "teach me",
    "lesson",
    "exam",
    "quiz",
];

const CREATIVE_TERMS: &[&str] = &[
    "story",
    "poem",
    "poetry",
    "creative",
    "imagine",
    "lyrics",
    "fiction",
    "write a song",
];

const ANALYTICAL_TERMS: &[&str] = &[
    "analyze",
    "analyse",
    "compare",
    "evaluate",
    "pros and cons",
    "trade-off",
    "tradeoff",
    "why does",
];

/// Terms this short only match a whole word or its plural.
const SHORT_TERM_LEN: usize = 3;

/// Whether the query mentions any term. Multi-word terms match as
/// substrings. Longer single words match at a word start ("depress" fires
/// on "depressed"); short ones must be the whole word, so "sad" does not
/// fire on "saddle" and "api" does not fire on "capital".
pub fn mentions(ctx: &QueryContext, terms: &[&str]) -> bool {
    let words: Vec<&str> = ctx
        .lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    terms.iter().any(|term| {
        if term.contains(' ') || term.contains('-') {
            ctx.lowered.contains(term)
        } else if term.len() <= SHORT_TERM_LEN {
            words
                .iter()
                .any(|w| w.strip_prefix(term).is_some_and(|rest| rest.is_empty() || rest == "s"))
        } else {
            words.iter().any(|w| w.starts_with(term))
        }
    })
}

/// The default rule table.
pub fn default_rules(config: &OrchestratorConfig) -> Vec<RoutingRule> {
    let long_context_chars = config.long_context_chars;
    vec![
        RoutingRule::new(
            "high-risk-user",
            100,
            TargetAction::MentalHealthSupport,
            "caller risk level is high",
            |ctx| ctx.risk_level == RiskLevel::High,
        ),
        RoutingRule::new(
            "mental-health",
            90,
            TargetAction::MentalHealthSupport,
            "query mentions mental-health topics",
            |ctx| mentions(ctx, MENTAL_HEALTH_TERMS),
        ),
        RoutingRule::new(
            "urgent",
            80,
            TargetAction::FastResponse,
            "caller marked the query urgent",
            |ctx| ctx.priority == QueryPriority::Urgent,
        ),
        RoutingRule::new(
            "technical",
            70,
            TargetAction::Technical,
            "query is about code or software",
            |ctx| mentions(ctx, TECHNICAL_TERMS),
        ),
        RoutingRule::new(
            "educational",
            60,
            TargetAction::Educational,
            "query asks to learn or understand a topic",
            |ctx| mentions(ctx, EDUCATIONAL_TERMS),
        ),
        RoutingRule::new(
            "creative",
            50,
            TargetAction::Creative,
            "query asks for creative writing",
            |ctx| mentions(ctx, CREATIVE_TERMS),
        ),
        RoutingRule::new(
            "long-context",
            40,
            TargetAction::LongContext,
            "query exceeds the long-context length",
            move |ctx| ctx.length > long_context_chars,
        ),
        RoutingRule::new(
            "analytical",
            30,
            TargetAction::Analytical,
            "query asks for analysis or comparison",
            |ctx| mentions(ctx, ANALYTICAL_TERMS),
        ),
    ]
}

/// Highest-priority matching rule, earlier rule on ties.
pub fn evaluate<'a>(rules: &'a [RoutingRule], ctx: &QueryContext) -> Option<&'a RoutingRule> {
    let mut best: Option<&'a RoutingRule> = None;
    for rule in rules.iter().filter(|r| r.matches(ctx)) {
        if best.is_none_or(|b| rule.priority > b.priority) {
            best = Some(rule);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str) -> QueryContext {
        QueryContext::new(text, QueryPriority::Normal, RiskLevel::Low)
    }

    fn pick(text: &str) -> Option<TargetAction> {
        let rules = default_rules(&OrchestratorConfig::default());
        evaluate(&rules, &ctx(text)).map(|r| r.action)
    }

    #[test]
    fn photosynthesis_homework_is_educational() {
        assert_eq!(
            pick("Can you help me understand photosynthesis for my biology homework?"),
            Some(TargetAction::Educational)
        );
    }

    #[test]
    fn word_start_matching_avoids_false_hits() {
        assert_eq!(pick("What is the capital of France?"), None);
        assert_eq!(pick("My Python function throws"), Some(TargetAction::Technical));
    }

    #[test]
    fn short_terms_match_whole_words_only() {
        assert_eq!(pick("Where can I buy a saddle for my horse?"), None);
        assert_eq!(pick("Sadly the shop was closed"), None);
        assert_eq!(pick("I feel sad today"), Some(TargetAction::MentalHealthSupport));
        assert_eq!(pick("Which APIs return paged results?"), Some(TargetAction::Technical));
        assert_eq!(pick("I keep getting stressed"), Some(TargetAction::MentalHealthSupport));
    }

    #[test]
    fn higher_priority_rule_wins() {
        // Technical (70) beats educational (60).
        assert_eq!(
            pick("explain this rust compile error"),
            Some(TargetAction::Technical)
        );
        // Mental health (90) beats educational (60).
        assert_eq!(
            pick("I feel anxious about my exam"),
            Some(TargetAction::MentalHealthSupport)
        );
    }

    #[test]
    fn risk_and_priority_rules() {
        let rules = default_rules(&OrchestratorConfig::default());
        let risky = QueryContext::new("tell me a story", QueryPriority::Normal, RiskLevel::High);
        assert_eq!(
            evaluate(&rules, &risky).map(|r| r.name),
            Some("high-risk-user")
        );
        let urgent = QueryContext::new("tell me a story", QueryPriority::Urgent, RiskLevel::Low);
        assert_eq!(evaluate(&rules, &urgent).map(|r| r.action), Some(TargetAction::FastResponse));
    }

    #[test]
    fn length_rule_uses_configured_threshold() {
        let config = OrchestratorConfig {
            long_context_chars: 10,
            ..OrchestratorConfig::default()
        };
        let rules = default_rules(&config);
        let matched = evaluate(&rules, &ctx("a plain but long sentence"));
        assert_eq!(matched.map(|r| r.action), Some(TargetAction::LongContext));
    }

    #[test]
    fn ties_keep_table_order() {
        let rules = vec![
            RoutingRule::new("first", 5, TargetAction::Creative, "", |_| true),
            RoutingRule::new("second", 5, TargetAction::Analytical, "", |_| true),
        ];
        assert_eq!(evaluate(&rules, &ctx("x")).map(|r| r.name), Some("first"));
    }

    #[test]
    fn no_match_yields_none() {
        assert!(evaluate(&[], &ctx("anything")).is_none());
    }
}
