use super::{parse_pairs, Workspace};
use crate::output::print_json;
use std::path::Path;
use std::sync::Arc;
use switchboard_core::switchboard::ExecutionResult;
use switchboard_core::{Switchboard, SwitchboardError};

pub fn run(
    root: &Path,
    signal_type: &str,
    source: &str,
    meta: &[String],
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let metadata = parse_pairs(meta)?;
    let ws = Workspace::open(root)?;
    let gate = Switchboard::builder()
        .config(&ws.config)
        .sink(Arc::new(ws.log.clone()))
        .router(ws.router.clone())
        .build();

    let decision = gate.receive(signal_type, source, Some(metadata));
    let result = if decision.should_execute() && !dry_run {
        Some(gate.execute(decision.signal.clone()))
    } else {
        None
    };
    ws.save_rotation()?;

    if json {
        print_json(&serde_json::json!({
            "decision": decision,
            "result": result,
        }))?;
    } else {
        println!(
            "{} {} ({}): {}",
            decision.action, signal_type, decision.signal.priority, decision.reason
        );
        if let Some(resource) = &decision.recommended_resource {
            println!("  resource: {resource}");
        }
        if let Some(position) = decision.queue_position {
            println!("  queue position: {position}");
        }
        if let Some(result) = &result {
            print_result(result);
        }
    }

    match result {
        Some(r) if !r.success => Err(SwitchboardError::HandlerExecution {
            signal_type: r.signal_type,
            message: r.error.unwrap_or_default(),
        }
        .into()),
        _ => Ok(()),
    }
}

fn print_result(result: &ExecutionResult) {
    let verdict = if result.success { "ok" } else { "failed" };
    println!("  {verdict} in {}ms", result.duration_ms);
    if let Some(outcome) = &result.outcome {
        for (key, value) in outcome {
            println!("    {key}: {value}");
        }
    }
    if let Some(error) = &result.error {
        println!("    error: {error}");
    }
}
