use super::Workspace;
use crate::output::{or_dash, print_json};
use std::path::Path;
use std::time::Duration;

const ACTIVITY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const SIGNAL_EVENTS: [&str; 6] = [
    "signal_received",
    "signal_outcome",
    "signal_held",
    "signal_escalated",
    "signal_dropped",
    "signal_expired",
];

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    let rotation = ws.router.get_status();

    let mut activity = serde_json::Map::new();
    for event in SIGNAL_EVENTS {
        let n = ws.log.count(event, ACTIVITY_WINDOW, None)?;
        activity.insert(event.to_string(), n.into());
    }
    let failures = ws
        .log
        .recent(ACTIVITY_WINDOW, Some("switchboard"), Some("signal_outcome"))?
        .into_iter()
        .filter(|c| c.metadata["success"] == false)
        .count();

    if json {
        return print_json(&serde_json::json!({
            "rotation": rotation,
            "activity_24h": activity,
            "failures_24h": failures,
        }));
    }

    let complete = rotation.channels.iter().filter(|c| c.phase.is_complete()).count();
    println!(
        "Rotation: cycle {}, channel {} ({}/{} complete){}",
        rotation.cycles,
        or_dash(rotation.current_channel.as_deref()),
        complete,
        rotation.channels.len(),
        if rotation.interrupt_active { " [interrupted]" } else { "" },
    );
    println!("Signals (24h):");
    for (event, n) in &activity {
        println!("  {:<18} {n}", event.trim_start_matches("signal_"));
    }
    println!("  {:<18} {failures}", "failures");
    Ok(())
}
