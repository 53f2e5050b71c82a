//! `haven config` -- print the resolved configuration.
//!
//! Values are shown after file loading and defaults, so the output is what
//! `query`, `screen` and `route` actually run with.
//!
//! # Examples
//!
//! ```text
//! haven config show
//! haven config section safety
//! ```

use anyhow::{Context, bail};
use serde_json::Value;

use haven_types::config::Config;

use super::print_json;

/// Print every section.
pub fn show(config: &Config) -> anyhow::Result<()> {
    print_json(config)
}

/// Print one section by its top-level key.
pub fn show_section(config: &Config, name: &str) -> anyhow::Result<()> {
    print_json(&section(config, name)?)
}

/// Look up one top-level section of the resolved config.
fn section(config: &Config, name: &str) -> anyhow::Result<Value> {
    let Value::Object(mut sections) =
        serde_json::to_value(config).context("serializing config")?
    else {
        bail!("config did not serialize to an object");
    };
    match sections.remove(name) {
        Some(value) => Ok(value),
        None => {
            let mut known: Vec<String> = sections.into_iter().map(|(k, _)| k).collect();
            known.sort();
            bail!("unknown config section '{name}' (known: {})", known.join(", "))
        }
    }
}
