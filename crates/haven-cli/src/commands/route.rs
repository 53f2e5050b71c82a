//! `haven route` -- show the routing decision for a query.
//!
//! Routing does not consult the safety gate; it shows which target and
//! pipeline the query would use if it passed screening.

use clap::Args;

use haven_types::config::Config;
use haven_types::routing::{QueryContext, QueryPriority};
use haven_types::user::RiskLevel;

use super::{UserArgs, build_haven, print_json};

/// Arguments for `haven route`.
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Query text.
    pub text: String,

    /// Caller risk level (low, medium, high).
    #[arg(long, default_value = "low")]
    pub risk_level: RiskLevel,

    /// Query priority (low, normal, high, urgent).
    #[arg(long, default_value = "normal")]
    pub priority: QueryPriority,
}

pub fn run(args: RouteArgs, config: Config) -> anyhow::Result<()> {
    let user = UserArgs {
        user: "cli-user".into(),
        risk_level: args.risk_level,
        mental_health_consent: false,
    };
    let haven = build_haven(config, &user)?;
    let ctx = QueryContext::new(args.text, args.priority, args.risk_level);
    print_json(&haven.orchestrator().route(&ctx))
}
