use anyhow::Context;
use std::path::Path;
use switchboard_core::breadcrumbs::EventLog;
use switchboard_core::config::Config;
use switchboard_core::{io, paths};

const GITIGNORE: &str = "breadcrumbs.db*\nurgent\nrotation.yaml\n";

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing switchboard in: {}", root.display());

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load existing config")?
    } else {
        let cfg = Config::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let gitignore = paths::switchboard_dir(root).join(".gitignore");
    if io::write_if_missing(&gitignore, GITIGNORE.as_bytes())? {
        println!("  created: {}/.gitignore", paths::SWITCHBOARD_DIR);
    }

    let db_path = config.event_log_path(root);
    let existed = db_path.exists();
    EventLog::open(&db_path).context("failed to create breadcrumb store")?;
    if existed {
        println!("  exists:  {}", db_path.display());
    } else {
        println!("  created: {}", db_path.display());
    }

    if config.channels.is_empty() {
        println!(
            "\nNo channels configured yet. Add them under `channels:` in {}.",
            paths::CONFIG_FILE
        );
    }
    Ok(())
}
