use crate::error::{Result, SwitchboardError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SWITCHBOARD_DIR: &str = ".switchboard";
pub const CONFIG_FILE: &str = ".switchboard/config.yaml";
pub const ROTATION_FILE: &str = ".switchboard/rotation.yaml";
pub const BREADCRUMBS_DB: &str = ".switchboard/breadcrumbs.db";
pub const URGENT_MARKER: &str = ".switchboard/urgent";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn switchboard_dir(root: &Path) -> PathBuf {
    root.join(SWITCHBOARD_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn rotation_path(root: &Path) -> PathBuf {
    root.join(ROTATION_FILE)
}

pub fn urgent_marker_path(root: &Path) -> PathBuf {
    root.join(URGENT_MARKER)
}

/// Resolve a configured store path: absolute paths are kept, relative ones
/// are anchored at `root`.
pub fn resolve_under(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

// ---------------------------------------------------------------------------
// Channel id validation
// ---------------------------------------------------------------------------

static CHANNEL_ID_RE: OnceLock<Regex> = OnceLock::new();

fn channel_id_re() -> &'static Regex {
    CHANNEL_ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex")
    })
}

pub fn validate_channel_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !channel_id_re().is_match(id) {
        return Err(SwitchboardError::InvalidChannelId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
