//! CLI command implementations.
//!
//! Each submodule implements one top-level subcommand. Shared helpers for
//! building the caller's feature record and the composition root live
//! here.

pub mod config_cmd;
pub mod query;
pub mod route;
pub mod screen;

use std::sync::Arc;

use clap::Args;

use haven_core::{Haven, ScriptedProvider, TargetRegistry};
use haven_safety::StaticFeatureStore;
use haven_types::config::Config;
use haven_types::user::{ConsentFlags, RiskLevel, UserFeatures};

/// Caller identity and feature flags shared by `query` and `screen`.
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// User identifier.
    #[arg(long, default_value = "cli-user")]
    pub user: String,

    /// Risk level reported by the feature store (low, medium, high).
    #[arg(long, default_value = "low")]
    pub risk_level: RiskLevel,

    /// The user opted in to mental-health support features.
    #[arg(long)]
    pub mental_health_consent: bool,
}

impl UserArgs {
    /// Feature store holding exactly this caller.
    pub fn feature_store(&self) -> StaticFeatureStore {
        StaticFeatureStore::new().with_user(
            self.user.clone(),
            UserFeatures {
                risk_level: self.risk_level,
                consent_flags: ConsentFlags {
                    mental_health_features: self.mental_health_consent,
                    personalization: false,
                },
                ..UserFeatures::default()
            },
        )
    }
}

/// Build the composition root with the scripted provider behind every
/// target.
pub fn build_haven(config: Config, user: &UserArgs) -> anyhow::Result<Haven> {
    let targets = TargetRegistry::uniform(Arc::new(ScriptedProvider::new()));
    Ok(Haven::new(config, Arc::new(user.feature_store()), targets)?)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
