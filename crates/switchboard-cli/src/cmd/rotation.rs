use super::{parse_pairs, Workspace};
use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use switchboard_core::{Phase, SwitchboardError};

#[derive(Subcommand)]
pub enum RotationSubcommand {
    /// Decide the next activity (may reset a finished rotation)
    Next,

    /// Mark the channel's current phase as done
    Complete {
        channel: String,
        /// Phase the caller believes it finished (recorded only)
        #[arg(long)]
        phase: Option<String>,
        /// Progress counter (repeatable): key=value
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Show every channel's phase and counters
    Status,

    /// Put every channel back to p1
    Reset,
}

pub fn run(root: &Path, subcmd: RotationSubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        RotationSubcommand::Next => next(&ws, json),
        RotationSubcommand::Complete {
            channel,
            phase,
            set,
        } => complete(&ws, &channel, phase.as_deref(), &set, json),
        RotationSubcommand::Status => status(&ws, json),
        RotationSubcommand::Reset => reset(&ws, json),
    }
}

fn next(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let decision = ws.router.get_next_activity();
    ws.save_rotation()?;
    if json {
        return print_json(&decision);
    }
    match (&decision.channel_id, decision.phase) {
        (Some(channel), Some(phase)) => {
            println!("{} on {channel} ({phase})", decision.next_activity.name())
        }
        _ => println!("{}", decision.next_activity.name()),
    }
    if let Some(resource) = &decision.recommended_resource {
        println!("  resource: {resource}");
    }
    println!("  {}", decision.reason);
    Ok(())
}

fn complete(
    ws: &Workspace,
    channel: &str,
    phase: Option<&str>,
    set: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let counters = parse_pairs(set)?;
    let current = ws
        .router
        .get_status()
        .channels
        .into_iter()
        .find(|c| c.channel_id == channel)
        .ok_or_else(|| SwitchboardError::UnknownChannel(channel.to_string()))?;
    let reported: Phase = match phase {
        Some(p) => p.parse().context("invalid --phase")?,
        None => current.phase,
    };
    let new_phase = ws
        .router
        .signal_phase_complete(channel, reported, Some(&counters))
        .ok_or_else(|| SwitchboardError::UnknownChannel(channel.to_string()))?;
    ws.save_rotation()?;

    if json {
        print_json(&serde_json::json!({
            "channel_id": channel,
            "previous_phase": current.phase,
            "new_phase": new_phase,
        }))?;
    } else {
        println!("{channel}: {} -> {new_phase}", current.phase);
    }
    Ok(())
}

fn status(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    let status = ws.router.get_status();
    if json {
        return print_json(&status);
    }
    println!(
        "cycles: {}  current: {}  p2: {}  p3: {}{}",
        status.cycles,
        or_dash(status.current_channel.as_deref()),
        on_off(status.p2_enabled),
        on_off(status.p3_enabled),
        if status.interrupt_active { "  [interrupted]" } else { "" },
    );
    let rows = status
        .channels
        .iter()
        .map(|c| {
            vec![
                c.channel_id.clone(),
                c.channel_name.clone(),
                c.phase.to_string(),
                or_dash(c.resource.as_deref()),
                c.cycles_completed.to_string(),
                c.counters
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(","),
            ]
        })
        .collect();
    print_table(
        &["CHANNEL", "NAME", "PHASE", "RESOURCE", "CYCLES", "COUNTERS"],
        rows,
    );
    Ok(())
}

fn reset(ws: &Workspace, json: bool) -> anyhow::Result<()> {
    ws.router.reset();
    ws.save_rotation()?;
    if json {
        print_json(&ws.router.get_status())?;
    } else {
        println!("Rotation reset: all channels at p1.");
    }
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
