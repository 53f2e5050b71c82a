//! `haven screen` -- safety gate verdict for a piece of text.
//!
//! Prints the query verdict together with the crisis score that drove it.
//! With `--response` the text is validated as model output instead.

use std::sync::Arc;

use clap::Args;
use serde_json::json;

use haven_safety::SafetyGate;
use haven_types::config::Config;

use super::{UserArgs, print_json};

/// Arguments for `haven screen`.
#[derive(Args, Debug)]
pub struct ScreenArgs {
    /// Text to screen.
    pub text: String,

    #[command(flatten)]
    pub user: UserArgs,

    /// Validate the text as a model response rather than a query.
    #[arg(long)]
    pub response: bool,
}

pub async fn run(args: ScreenArgs, config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let gate = SafetyGate::new(config.safety, Arc::new(args.user.feature_store()))?;

    let report = if args.response {
        let check = gate.validate_response(&args.text);
        json!({
            "verdict": check.verdict,
            "cleaned": check.cleaned,
        })
    } else {
        let crisis = gate.crisis_score(&args.text, args.user.risk_level);
        let verdict = gate.validate_query(&args.text, &args.user.user).await;
        json!({
            "verdict": verdict,
            "crisis": crisis,
            "escalations_pending": gate.escalations().len(),
        })
    };
    print_json(&report)
}
