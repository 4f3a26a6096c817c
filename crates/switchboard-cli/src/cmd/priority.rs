use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use switchboard_core::config::Config;
use switchboard_core::{signal, SwitchboardError};

pub fn run(root: &Path, signal_type: &str, strict: bool, json: bool) -> anyhow::Result<()> {
    // Uninitialized projects still get the built-in table.
    let config = match Config::load(root) {
        Ok(cfg) => cfg,
        Err(SwitchboardError::NotInitialized) => Config::default(),
        Err(e) => return Err(e).context("failed to load config"),
    };

    let origin = if config.priorities.overrides.contains_key(signal_type) {
        "config"
    } else if signal::known_priority(signal_type).is_some() {
        "built-in"
    } else if strict {
        return Err(SwitchboardError::UnknownSignalType(signal_type.to_string()).into());
    } else {
        "default"
    };
    let priority = config.priorities.resolve(signal_type);
    let escalates = priority != switchboard_core::Priority::P0
        && config.priorities.escalates(signal_type);

    if json {
        print_json(&serde_json::json!({
            "signal_type": signal_type,
            "priority": priority,
            "label": priority.label(),
            "origin": origin,
            "escalates": escalates,
        }))?;
    } else {
        println!("{signal_type}: {priority} ({}) [{origin}]", priority.label());
        if escalates {
            println!("  escalates to advisory review");
        }
    }
    Ok(())
}
