use crate::error::{Result, SwitchboardError};
use crate::paths;
use crate::signal;
use crate::types::{Phase, Priority};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    /// Browser or session identifier handed out as the recommended resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            resource: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

// ---------------------------------------------------------------------------
// PhaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseActivities {
    #[serde(default = "default_p1_activity")]
    pub p1: String,
    #[serde(default = "default_p2_activity")]
    pub p2: String,
    #[serde(default = "default_p3_activity")]
    pub p3: String,
}

fn default_p1_activity() -> String {
    "comment_engagement".to_string()
}

fn default_p2_activity() -> String {
    "video_scheduling".to_string()
}

fn default_p3_activity() -> String {
    "video_indexing".to_string()
}

impl Default for PhaseActivities {
    fn default() -> Self {
        Self {
            p1: default_p1_activity(),
            p2: default_p2_activity(),
            p3: default_p3_activity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default = "default_true")]
    pub p2_enabled: bool,
    #[serde(default = "default_true")]
    pub p3_enabled: bool,
    #[serde(default)]
    pub activities: PhaseActivities,
}

fn default_true() -> bool {
    true
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            p2_enabled: true,
            p3_enabled: true,
            activities: PhaseActivities::default(),
        }
    }
}

impl PhaseConfig {
    /// P1 always runs; `Complete` is a terminal marker, never a work item.
    pub fn is_enabled(&self, phase: Phase) -> bool {
        match phase {
            Phase::P1 => true,
            Phase::P2 => self.p2_enabled,
            Phase::P3 => self.p3_enabled,
            Phase::Complete => false,
        }
    }

    pub fn activity_for(&self, phase: Phase) -> Option<&str> {
        match phase {
            Phase::P1 => Some(&self.activities.p1),
            Phase::P2 => Some(&self.activities.p2),
            Phase::P3 => Some(&self.activities.p3),
            Phase::Complete => None,
        }
    }
}

// ---------------------------------------------------------------------------
// InterruptConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptConfig {
    #[serde(default = "default_interrupt_activity")]
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

fn default_interrupt_activity() -> String {
    "live_chat".to_string()
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            activity: default_interrupt_activity(),
            resource: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PriorityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// signal_type → tier, consulted before the built-in table.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, Priority>,
    /// Signal types routed to the advisory collaborator instead of admitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalate: Vec<String>,
}

impl PriorityConfig {
    pub fn resolve(&self, signal_type: &str) -> Priority {
        self.overrides
            .get(signal_type)
            .copied()
            .unwrap_or_else(|| signal::priority_for(signal_type))
    }

    pub fn escalates(&self, signal_type: &str) -> bool {
        self.escalate.iter().any(|t| t == signal_type)
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    /// Queued signals older than this are discarded at drain time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

fn default_max_len() -> usize {
    64
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_len: default_max_len(),
            ttl_seconds: None,
        }
    }
}

// ---------------------------------------------------------------------------
// EventLogConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(paths::BREADCRUMBS_DB)
}

fn default_retention_days() -> u32 {
    30
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: default_retention_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub phases: PhaseConfig,
    #[serde(default)]
    pub interrupt: InterruptConfig,
    #[serde(default)]
    pub priorities: PriorityConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Config {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self {
            version: 1,
            channels,
            phases: PhaseConfig::default(),
            interrupt: InterruptConfig::default(),
            priorities: PriorityConfig::default(),
            queue: QueueConfig::default(),
            event_log: EventLogConfig::default(),
        }
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn event_log_path(&self, root: &Path) -> PathBuf {
        paths::resolve_under(root, &self.event_log.path)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SwitchboardError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.channels.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no channels configured: rotation will always be idle".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if paths::validate_channel_id(&channel.id).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("invalid channel id '{}'", channel.id),
                });
            }
            if !seen.insert(channel.id.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("duplicate channel id '{}'", channel.id),
                });
            }
        }

        for signal_type in &self.priorities.escalate {
            if self.priorities.resolve(signal_type) == Priority::P0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "'{signal_type}' is listed under escalate but resolves to p0; \
                         critical signals always execute"
                    ),
                });
            }
        }

        if self.queue.ttl_seconds == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "queue.ttl_seconds is 0: every held signal expires immediately"
                    .to_string(),
            });
        }

        if self.queue.max_len == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "queue.max_len is 0: blocked signals are always dropped".to_string(),
            });
        }

        if self.event_log.retention_days == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "event_log.retention_days is 0: a purge deletes the whole history"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
