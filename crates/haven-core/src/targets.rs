//! Static target table: action lookup, fallback chains and cost tiers.
//!
//! Also holds the heuristic used when no routing rule matches.

use haven_types::config::OrchestratorConfig;
use haven_types::routing::{CostTier, ProcessingTarget, QueryContext, TargetAction};

/// Static properties of one processing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetProfile {
    pub target: ProcessingTarget,
    pub cost_tier: CostTier,
    /// Ordered fallbacks tried after this target fails.
    pub fallbacks: &'static [ProcessingTarget],
}

use ProcessingTarget as T;

const PROFILES: &[TargetProfile] = &[
    TargetProfile {
        target: T::EmpatheticSupport,
        cost_tier: CostTier::Premium,
        fallbacks: &[T::BalancedGeneral],
    },
    TargetProfile {
        target: T::EducationTutor,
        cost_tier: CostTier::Standard,
        fallbacks: &[T::BalancedGeneral, T::FastResponse],
    },
    TargetProfile {
        target: T::CodeSpecialist,
        cost_tier: CostTier::Premium,
        fallbacks: &[T::DeepReasoning, T::BalancedGeneral],
    },
    TargetProfile {
        target: T::CreativeWriter,
        cost_tier: CostTier::Standard,
        fallbacks: &[T::BalancedGeneral],
    },
    TargetProfile {
        target: T::LongContext,
        cost_tier: CostTier::Premium,
        fallbacks: &[T::DeepReasoning, T::BalancedGeneral],
    },
    TargetProfile {
        target: T::DeepReasoning,
        cost_tier: CostTier::Premium,
        fallbacks: &[T::BalancedGeneral, T::FastResponse],
    },
    TargetProfile {
        target: T::FastResponse,
        cost_tier: CostTier::Free,
        fallbacks: &[T::BalancedGeneral],
    },
    TargetProfile {
        target: T::BalancedGeneral,
        cost_tier: CostTier::Standard,
        fallbacks: &[T::FastResponse],
    },
];

/// Profile for a target.
pub fn profile(target: ProcessingTarget) -> TargetProfile {
    PROFILES
        .iter()
        .copied()
        .find(|p| p.target == target)
        .unwrap_or(TargetProfile {
            target,
            cost_tier: CostTier::Standard,
            fallbacks: &[],
        })
}

/// Concrete target for an action.
pub fn target_for(action: TargetAction) -> ProcessingTarget {
    match action {
        TargetAction::MentalHealthSupport => T::EmpatheticSupport,
        TargetAction::Educational => T::EducationTutor,
        TargetAction::Technical => T::CodeSpecialist,
        TargetAction::Creative => T::CreativeWriter,
        TargetAction::LongContext => T::LongContext,
        TargetAction::Analytical => T::DeepReasoning,
        TargetAction::FastResponse => T::FastResponse,
        TargetAction::General => T::BalancedGeneral,
    }
}

/// Terms that make a query "dense" for the heuristic.
const COMPLEX_TERMS: &[&str] = &[
    "analysis",
    "architecture",
    "comprehensive",
    "implication",
    "methodology",
    "framework",
    "hypothes",
    "theoretical",
    "quantum",
    "optimiz",
    "algorithm",
    "correlation",
    "derivative",
    "philosoph",
    "epistemolog",
    "statistical",
    "macroeconomic",
];

/// Share of words that start with a complex term.
pub fn complex_density(ctx: &QueryContext) -> f64 {
    let words: Vec<&str> = ctx
        .lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let complex = words
        .iter()
        .filter(|w| COMPLEX_TERMS.iter().any(|t| w.starts_with(t)))
        .count();
    complex as f64 / words.len() as f64
}

/// Heuristic choice when no rule matches: long or dense queries go to the
/// long-context action, everything else to the balanced default.
pub fn heuristic_action(ctx: &QueryContext, config: &OrchestratorConfig) -> (TargetAction, String) {
    if ctx.length > config.long_context_chars {
        return (
            TargetAction::LongContext,
            format!(
                "heuristic: {} chars exceeds {}",
                ctx.length, config.long_context_chars
            ),
        );
    }
    let density = complex_density(ctx);
    if density > config.complex_density_threshold {
        return (
            TargetAction::LongContext,
            format!("heuristic: complex-term density {density:.2}"),
        );
    }
    (
        TargetAction::General,
        "heuristic: no rule matched, balanced default".to_string(),
    )
}
