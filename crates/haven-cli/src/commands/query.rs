//! `haven query` -- run one query end to end.
//!
//! Builds the composition root, runs the query through the safety gate,
//! router and fallback chain, prints the response envelope as JSON and
//! shuts the dispatcher down so observability events are drained.
//!
//! # Examples
//!
//! ```text
//! haven query "Can you help me understand photosynthesis?"
//! haven query "I feel hopeless" --risk-level high --mental-health-consent
//! ```

use clap::Args;

use haven_core::QueryRequest;
use haven_types::config::Config;
use haven_types::routing::QueryPriority;

use super::{UserArgs, build_haven, print_json};

/// Arguments for `haven query`.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query text.
    pub text: String,

    #[command(flatten)]
    pub user: UserArgs,

    /// Query priority (low, normal, high, urgent).
    #[arg(long, default_value = "normal")]
    pub priority: QueryPriority,

    /// Record the interaction for training.
    #[arg(long)]
    pub consent_to_train: bool,

    /// Sampling temperature override.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum completion tokens override.
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

pub async fn run(args: QueryArgs, config: Config) -> anyhow::Result<()> {
    let haven = build_haven(config, &args.user)?;

    let mut request = QueryRequest::new(args.text, args.user.user.clone())
        .with_priority(args.priority)
        .with_consent_to_train(args.consent_to_train);
    request.preferences.temperature = args.temperature;
    request.preferences.max_tokens = args.max_tokens;

    let envelope = haven.orchestrator().process_query(request).await;
    haven.shutdown().await;
    print_json(&envelope)
}
