//! Pipeline construction, prompt shaping and post-processing.
//!
//! A pipeline is the base `preprocessing, model-call, postprocessing`
//! sequence wrapped with action-specific steps. Steps before `model-call`
//! shape the prompt; steps after it transform the model output. Steps a
//! phase does not recognize are no-ops.

use tracing::{debug, warn};

use haven_safety::SafetyGate;
use haven_safety::gate::SAFE_ALTERNATIVE;
use haven_types::routing::{PipelineStep, TargetAction};

/// Ordered steps for an action.
pub fn steps_for(action: TargetAction) -> Vec<PipelineStep> {
    use PipelineStep as S;
    let (before, after) = match action {
        TargetAction::MentalHealthSupport => (
            vec![S::CrisisDetection, S::EmpathyEnhancement],
            vec![S::MentalHealthSafety],
        ),
        TargetAction::Educational => (vec![S::EducationalContext], vec![S::PedagogicalEnhancement]),
        TargetAction::Technical => (vec![S::TechnicalContext], vec![S::CodeFormatting]),
        TargetAction::Creative => (vec![S::CreativeContext], vec![S::ContentSafety]),
        TargetAction::LongContext => (vec![S::ContextCompression], vec![]),
        TargetAction::Analytical => (vec![S::ReasoningScaffold], vec![]),
        TargetAction::FastResponse | TargetAction::General => (vec![], vec![]),
    };
    let mut steps = before;
    steps.extend([S::Preprocessing, S::ModelCall, S::Postprocessing]);
    steps.extend(after);
    steps
}

/// Safety checks applied around a query routed to `action`.
pub fn safety_checks_for(action: TargetAction) -> Vec<String> {
    let mut checks = vec!["query-validation".to_string(), "response-validation".to_string()];
    match action {
        TargetAction::MentalHealthSupport => {
            checks.push("crisis-detection".into());
            checks.push("mental-health-safety".into());
        }
        TargetAction::Creative => checks.push("content-safety".into()),
        _ => {}
    }
    checks
}

fn model_call_index(steps: &[PipelineStep]) -> usize {
    steps
        .iter()
        .position(|s| *s == PipelineStep::ModelCall)
        .unwrap_or(steps.len())
}

/// Build the prompt sent to the target by applying the pre-model steps.
pub fn build_prompt(steps: &[PipelineStep], query: &str) -> String {
    let mut instructions: Vec<&str> = Vec::new();
    let mut body = query.to_string();

    for step in &steps[..model_call_index(steps)] {
        match step {
            PipelineStep::Preprocessing => body = body.trim().to_string(),
            PipelineStep::ContextCompression => {
                body = body.split_whitespace().collect::<Vec<_>>().join(" ");
            }
            PipelineStep::EmpathyEnhancement => instructions.push(
                "Respond warmly and without judgement. Acknowledge the person's feelings \
                 before offering suggestions.",
            ),
            PipelineStep::EducationalContext => instructions.push(
                "You are a patient tutor. Explain step by step at the learner's level.",
            ),
            PipelineStep::TechnicalContext => instructions.push(
                "You are a precise software engineer. Put code in fenced blocks.",
            ),
            PipelineStep::CreativeContext => {
                instructions.push("You are an imaginative writer. Keep content suitable for all audiences.");
            }
            PipelineStep::ReasoningScaffold => {
                instructions.push("Reason through the problem step by step before answering.");
            }
            // Crisis detection already ran in the safety gate.
            _ => {}
        }
    }

    if instructions.is_empty() {
        body
    } else {
        format!("{}\n\n{body}", instructions.join("\n"))
    }
}

/// Result of post-processing model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub text: String,
    /// A safety step replaced the model output.
    pub substituted: bool,
    /// Notes for the envelope's reasoning trail.
    pub notes: Vec<String>,
}

/// Apply the post-model steps in order.
pub fn postprocess(steps: &[PipelineStep], raw: &str, gate: &SafetyGate) -> Processed {
    let mut out = Processed {
        text: raw.to_string(),
        substituted: false,
        notes: Vec::new(),
    };
    let start = (model_call_index(steps) + 1).min(steps.len());

    for step in &steps[start..] {
        if out.substituted {
            break;
        }
        match step {
            PipelineStep::Postprocessing => {
                let check = gate.validate_response(out.text.trim());
                if check.verdict.safe {
                    if !check.verdict.violations.is_empty() {
                        out.notes.push(format!(
                            "response cleaned: {}",
                            check.verdict.violations.join(", ")
                        ));
                    }
                    out.text = check.cleaned;
                } else {
                    substitute(&mut out, step, &check.verdict.violations);
                }
            }
            PipelineStep::MentalHealthSafety | PipelineStep::ContentSafety => {
                let check = gate.validate_response(&out.text);
                if !check.verdict.safe {
                    substitute(&mut out, step, &check.verdict.violations);
                }
            }
            PipelineStep::PedagogicalEnhancement => {
                if !out.text.trim_end().ends_with('?') {
                    out.text.push_str(
                        "\n\nTo check your understanding, try explaining the key idea in your own words.",
                    );
                }
            }
            PipelineStep::CodeFormatting => {
                out.text = out
                    .text
                    .lines()
                    .map(|l| l.replace('\t', "    ").trim_end().to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            other => debug!(step = %other, "no post-processing for step"),
        }
    }
    out
}

fn substitute(out: &mut Processed, step: &PipelineStep, violations: &[String]) {
    warn!(%step, ?violations, "response failed validation, substituting safe alternative");
    out.text = SAFE_ALTERNATIVE.to_string();
    out.substituted = true;
    out.notes.push(format!("{step}: response replaced ({})", violations.join(", ")));
}
