pub mod config;
pub mod crumbs;
pub mod init;
pub mod priority;
pub mod rotation;
pub mod signal;
pub mod status;

use anyhow::{bail, Context};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchboard_core::breadcrumbs::EventLog;
use switchboard_core::config::Config;
use switchboard_core::rotation::{ChannelRotationRouter, MarkerFileCheck, RotationSnapshot};
use switchboard_core::signal::Metadata;

/// Everything a command needs from an initialized project.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub log: EventLog,
    pub router: Arc<ChannelRotationRouter>,
}

impl Workspace {
    /// Load config, open the breadcrumb store and resume the saved rotation.
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = Config::load(root).context("failed to load config")?;
        let log = EventLog::open(&config.event_log_path(root))
            .context("failed to open breadcrumb store")?;

        let router = ChannelRotationRouter::from_config(&config)
            .context("invalid channel configuration")?
            .with_urgent_check(Arc::new(MarkerFileCheck::for_root(root)))
            .with_sink(Arc::new(log.clone()));
        if let Some(snapshot) =
            RotationSnapshot::load(root).context("failed to read rotation snapshot")?
        {
            router.restore(&snapshot);
        }

        Ok(Self {
            root: root.to_path_buf(),
            config,
            log,
            router: Arc::new(router),
        })
    }

    pub fn save_rotation(&self) -> anyhow::Result<()> {
        self.router
            .snapshot()
            .save(&self.root)
            .context("failed to save rotation snapshot")
    }
}

/// Parse repeated `key=value` arguments. Values that parse as JSON scalars
/// (numbers, booleans, null) keep their type; everything else is a string.
pub fn parse_pairs(pairs: &[String]) -> anyhow::Result<Metadata> {
    let mut out = Metadata::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got '{pair}'");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("empty key in '{pair}'");
        }
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
            _ => Value::String(raw.to_string()),
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}
