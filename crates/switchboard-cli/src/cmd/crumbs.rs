use super::Workspace;
use crate::output::{or_dash, print_json, print_table};
use clap::Subcommand;
use std::path::Path;
use std::time::Duration;
use switchboard_core::breadcrumbs::Breadcrumb;

#[derive(Subcommand)]
pub enum CrumbsSubcommand {
    /// Breadcrumbs from the last N minutes, newest first
    Recent {
        #[arg(long, default_value_t = 60)]
        minutes: u64,
        #[arg(long)]
        source: Option<String>,
        #[arg(long = "type", value_name = "EVENT_TYPE")]
        event_type: Option<String>,
    },

    /// Identical events repeated within a window
    Patterns {
        #[arg(long, default_value_t = 5)]
        minutes: u64,
        /// Minimum occurrences for a group to be reported
        #[arg(long, default_value_t = 3)]
        min: u64,
    },

    /// Count events of one type within a window
    Count {
        event_type: String,
        #[arg(long, default_value_t = 60)]
        minutes: u64,
        #[arg(long)]
        source: Option<String>,
    },

    /// Delete breadcrumbs older than the retention period
    Purge {
        /// Override event_log.retention_days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Every breadcrumb of one session (an execution id), oldest first
    Session { id: String },
}

pub fn run(root: &Path, subcmd: CrumbsSubcommand, json: bool) -> anyhow::Result<()> {
    let ws = Workspace::open(root)?;
    match subcmd {
        CrumbsSubcommand::Recent {
            minutes,
            source,
            event_type,
        } => {
            let crumbs = ws
                .log
                .recent(minutes_to(minutes), source.as_deref(), event_type.as_deref())?;
            print_crumbs(&crumbs, json)
        }
        CrumbsSubcommand::Patterns { minutes, min } => {
            let groups = ws.log.repeated_patterns(minutes_to(minutes), min)?;
            if json {
                return print_json(&groups);
            }
            if groups.is_empty() {
                println!("No repeated patterns in the last {minutes} minutes.");
                return Ok(());
            }
            let rows = groups
                .iter()
                .map(|g| {
                    vec![
                        g.count.to_string(),
                        g.source.clone(),
                        g.event_type.clone(),
                        g.message.clone(),
                        g.last_seen.format("%H:%M:%S").to_string(),
                    ]
                })
                .collect();
            print_table(&["COUNT", "SOURCE", "EVENT", "MESSAGE", "LAST"], rows);
            Ok(())
        }
        CrumbsSubcommand::Count {
            event_type,
            minutes,
            source,
        } => {
            let n = ws
                .log
                .count(&event_type, minutes_to(minutes), source.as_deref())?;
            if json {
                print_json(&serde_json::json!({ "event_type": event_type, "count": n }))
            } else {
                println!("{n}");
                Ok(())
            }
        }
        CrumbsSubcommand::Purge { days } => {
            let days = days.unwrap_or(ws.config.event_log.retention_days);
            let deleted = ws
                .log
                .purge_older_than(Duration::from_secs(u64::from(days) * 86_400))?;
            if json {
                print_json(&serde_json::json!({ "retention_days": days, "deleted": deleted }))
            } else {
                println!("Purged {deleted} breadcrumbs older than {days} days.");
                Ok(())
            }
        }
        CrumbsSubcommand::Session { id } => {
            let crumbs = ws.log.session(&id)?;
            print_crumbs(&crumbs, json)
        }
    }
}

fn minutes_to(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn print_crumbs(crumbs: &[Breadcrumb], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&crumbs);
    }
    if crumbs.is_empty() {
        println!("No breadcrumbs.");
        return Ok(());
    }
    let rows = crumbs
        .iter()
        .map(|c| {
            vec![
                c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                c.source.clone(),
                or_dash(c.phase.as_deref()),
                c.event_type.clone(),
                c.message.clone(),
            ]
        })
        .collect();
    print_table(&["TIME", "SOURCE", "PHASE", "EVENT", "MESSAGE"], rows);
    Ok(())
}
