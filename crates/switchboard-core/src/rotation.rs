//! Channel rotation: pick which channel gets the next unit of work.
//!
//! Each channel walks `P1 → P2 → P3 → Complete`. The router stays on one
//! channel until it reaches `Complete`, then moves to the next channel that
//! is not complete. Once every channel is complete the whole rotation resets
//! to `P1` and that call reports `Idle`.
//!
//! An external urgent condition (see [`UrgentCheck`]) overrides all of this
//! and never touches channel state.

use crate::breadcrumbs::{EventSink, NewBreadcrumb, NoopSink};
use crate::config::{ChannelConfig, Config, InterruptConfig, PhaseConfig};
use crate::error::{Result, SwitchboardError};
use crate::io;
use crate::paths;
use crate::signal::Metadata;
use crate::types::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SOURCE: &str = "rotation_router";

// ---------------------------------------------------------------------------
// UrgentCheck
// ---------------------------------------------------------------------------

/// Side-effect-free check for a condition that preempts normal rotation
/// (for example, a live session becoming active).
pub trait UrgentCheck: Send + Sync {
    fn is_urgent_active(&self) -> bool;
}

impl<F> UrgentCheck for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_urgent_active(&self) -> bool {
        self()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverUrgent;

impl UrgentCheck for NeverUrgent {
    fn is_urgent_active(&self) -> bool {
        false
    }
}

/// Urgent while a marker file exists.
#[derive(Debug, Clone)]
pub struct MarkerFileCheck {
    path: PathBuf,
}

impl MarkerFileCheck {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_root(root: &Path) -> Self {
        Self::new(paths::urgent_marker_path(root))
    }
}

impl UrgentCheck for MarkerFileCheck {
    fn is_urgent_active(&self) -> bool {
        self.path.exists()
    }
}

// ---------------------------------------------------------------------------
// ChannelState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel_id: String,
    pub channel_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub phase: Phase,
    /// Progress counters merged from completion metadata
    /// (e.g. `comments_remaining`, `videos_scheduled`).
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub cycles_completed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl ChannelState {
    fn from_config(cfg: &ChannelConfig) -> Self {
        Self {
            channel_id: cfg.id.clone(),
            channel_name: cfg.name.clone(),
            resource: cfg.resource.clone(),
            phase: Phase::P1,
            counters: BTreeMap::new(),
            cycles_completed: 0,
            last_completed_at: None,
        }
    }

    fn merge_counters(&mut self, metadata: &Metadata) {
        for (key, value) in metadata {
            if let Some(n) = value.as_i64() {
                self.counters.insert(key.clone(), n);
            } else if let Some(f) = value.as_f64() {
                self.counters.insert(key.clone(), f as i64);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ActivityDecision / RotationStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "activity", rename_all = "snake_case")]
pub enum Activity {
    /// Urgent external condition; rotation is paused.
    Interrupt(String),
    /// Normal rotation work for a channel phase.
    Work(String),
    /// Nothing to do right now (no channels, or a full cycle just finished).
    Idle,
}

impl Activity {
    pub fn name(&self) -> &str {
        match self {
            Activity::Interrupt(a) | Activity::Work(a) => a,
            Activity::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDecision {
    pub next_activity: Activity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_resource: Option<String>,
    pub reason: String,
}

impl ActivityDecision {
    fn idle(reason: impl Into<String>) -> Self {
        Self {
            next_activity: Activity::Idle,
            channel_id: None,
            channel_name: None,
            phase: None,
            recommended_resource: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationStatus {
    pub channels: Vec<ChannelState>,
    pub current_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    pub cycles: u64,
    pub p2_enabled: bool,
    pub p3_enabled: bool,
    pub interrupt_active: bool,
}

// ---------------------------------------------------------------------------
// RotationSnapshot
// ---------------------------------------------------------------------------

/// Persisted rotation progress, so a new process resumes where the last one
/// stopped instead of starting the cycle over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationSnapshot {
    pub current_index: usize,
    pub cycles: u64,
    pub channels: Vec<ChannelState>,
    pub saved_at: DateTime<Utc>,
}

impl RotationSnapshot {
    /// Returns `None` when no snapshot has been saved yet.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = paths::rotation_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_yaml::from_str(&data)?))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&paths::rotation_path(root), data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// ChannelRotationRouter
// ---------------------------------------------------------------------------

struct RouterState {
    channels: Vec<ChannelState>,
    current_index: usize,
    cycles: u64,
}

pub struct ChannelRotationRouter {
    state: Mutex<RouterState>,
    phases: PhaseConfig,
    interrupt: InterruptConfig,
    urgent: Arc<dyn UrgentCheck>,
    sink: Arc<dyn EventSink>,
}

impl ChannelRotationRouter {
    /// Fails with `DuplicateChannel` when two channels share an id.
    pub fn new(channels: &[ChannelConfig], phases: PhaseConfig) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = channels.iter().find(|c| !seen.insert(c.id.as_str())) {
            return Err(SwitchboardError::DuplicateChannel(dup.id.clone()));
        }
        Ok(Self {
            state: Mutex::new(RouterState {
                channels: channels.iter().map(ChannelState::from_config).collect(),
                current_index: 0,
                cycles: 0,
            }),
            phases,
            interrupt: InterruptConfig::default(),
            urgent: Arc::new(NeverUrgent),
            sink: Arc::new(NoopSink),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(&cfg.channels, cfg.phases.clone())?.with_interrupt(cfg.interrupt.clone()))
    }

    pub fn with_interrupt(mut self, interrupt: InterruptConfig) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_urgent_check(mut self, check: Arc<dyn UrgentCheck>) -> Self {
        self.urgent = check;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    // A poisoned lock still holds consistent data: every mutation below is
    // a single field write.
    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn breadcrumb(&self, event_type: &str, message: String, phase: Phase, metadata: Value) {
        self.sink.record(
            NewBreadcrumb::new(SOURCE, event_type, message)
                .phase(phase.as_str())
                .metadata(metadata),
        );
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Decide what the shared resources should work on next.
    pub fn get_next_activity(&self) -> ActivityDecision {
        if self.urgent.is_urgent_active() {
            debug!(activity = %self.interrupt.activity, "rotation interrupted");
            return ActivityDecision {
                next_activity: Activity::Interrupt(self.interrupt.activity.clone()),
                channel_id: None,
                channel_name: None,
                phase: None,
                recommended_resource: self.interrupt.resource.clone(),
                reason: "urgent condition active: rotation paused".to_string(),
            };
        }

        let mut state = self.lock();
        let n = state.channels.len();
        if n == 0 {
            return ActivityDecision::idle("no channels configured");
        }
        if state.current_index >= n {
            state.current_index = 0;
        }

        // Each step either returns, skips one disabled phase, or moves past
        // one complete channel, so this bound always suffices.
        let max_steps = Phase::all().len() * n + n + 1;
        for _ in 0..max_steps {
            let idx = state.current_index;
            let phase = state.channels[idx].phase;

            if phase.is_complete() {
                match next_incomplete(&state.channels, idx) {
                    Some(next) => {
                        state.current_index = next;
                        continue;
                    }
                    None => {
                        self.reset_cycle(&mut state);
                        return ActivityDecision::idle(format!(
                            "rotation cycle {} complete: all channels reset to p1",
                            state.cycles
                        ));
                    }
                }
            }

            if !self.phases.is_enabled(phase) {
                let channel = &mut state.channels[idx];
                let next = phase.next().unwrap_or(Phase::Complete);
                channel.phase = next;
                if next.is_complete() {
                    channel.cycles_completed += 1;
                    channel.last_completed_at = Some(Utc::now());
                }
                let channel_id = channel.channel_id.clone();
                debug!(channel = %channel_id, skipped = %phase, "phase disabled, skipping");
                self.breadcrumb(
                    "phase_skipped",
                    format!("{channel_id}: {phase} disabled, advanced to {next}"),
                    phase,
                    json!({ "channel_id": channel_id }),
                );
                continue;
            }

            let channel = &state.channels[idx];
            let activity = self
                .phases
                .activity_for(phase)
                .unwrap_or_default()
                .to_string();
            return ActivityDecision {
                next_activity: Activity::Work(activity.clone()),
                channel_id: Some(channel.channel_id.clone()),
                channel_name: Some(channel.channel_name.clone()),
                phase: Some(phase),
                recommended_resource: channel.resource.clone(),
                reason: format!("{} is in {phase}: {activity}", channel.channel_name),
            };
        }

        warn!("rotation walk exceeded its step bound");
        ActivityDecision::idle("rotation walk exceeded its step bound")
    }

    fn reset_cycle(&self, state: &mut RouterState) {
        for channel in &mut state.channels {
            channel.phase = Phase::P1;
        }
        state.current_index = 0;
        state.cycles += 1;
        info!(cycle = state.cycles, "rotation cycle complete");
        self.breadcrumb(
            "rotation_reset",
            format!("cycle {} complete, all channels reset", state.cycles),
            Phase::P1,
            json!({ "cycle": state.cycles, "channels": state.channels.len() }),
        );
    }

    /// Advance `channel_id` by exactly one phase and merge the numeric values
    /// in `metadata` into its counters.
    ///
    /// Returns the channel's new phase, or `None` for an unknown channel.
    /// `reported` is what the caller believes it finished; it is recorded but
    /// does not gate advancement.
    pub fn signal_phase_complete(
        &self,
        channel_id: &str,
        reported: Phase,
        metadata: Option<&Metadata>,
    ) -> Option<Phase> {
        let mut state = self.lock();
        let Some(idx) = state
            .channels
            .iter()
            .position(|c| c.channel_id == channel_id)
        else {
            warn!(channel = %channel_id, "phase completion for unknown channel ignored");
            return None;
        };

        let channel = &mut state.channels[idx];
        let from = channel.phase;
        if from != reported {
            debug!(
                channel = %channel_id,
                current = %from,
                reported = %reported,
                "reported phase differs from current"
            );
        }
        if let Some(meta) = metadata {
            channel.merge_counters(meta);
        }
        let to = from.next().unwrap_or(Phase::Complete);
        channel.phase = to;
        if to.is_complete() && !from.is_complete() {
            channel.cycles_completed += 1;
            channel.last_completed_at = Some(Utc::now());
        }
        let counters = channel.counters.clone();

        if to.is_complete() && state.current_index == idx {
            if let Some(next) = next_incomplete(&state.channels, idx) {
                state.current_index = next;
            }
        }
        drop(state);

        info!(channel = %channel_id, from = %from, to = %to, "phase complete");
        self.breadcrumb(
            "phase_complete",
            format!("{channel_id}: {from} -> {to}"),
            from,
            json!({
                "channel_id": channel_id,
                "reported_phase": reported.as_str(),
                "new_phase": to.as_str(),
                "counters": counters,
            }),
        );
        Some(to)
    }

    /// Read-only resource hint: the named channel's resource, or the current
    /// channel's when no id is given.
    pub fn recommended_resource(&self, channel_id: Option<&str>) -> Option<String> {
        let state = self.lock();
        let channel = match channel_id {
            Some(id) => state.channels.iter().find(|c| c.channel_id == id),
            None => state.channels.get(state.current_index),
        };
        channel.and_then(|c| c.resource.clone())
    }

    pub fn get_status(&self) -> RotationStatus {
        let interrupt_active = self.urgent.is_urgent_active();
        let state = self.lock();
        RotationStatus {
            channels: state.channels.clone(),
            current_index: state.current_index,
            current_channel: state
                .channels
                .get(state.current_index)
                .map(|c| c.channel_id.clone()),
            cycles: state.cycles,
            p2_enabled: self.phases.p2_enabled,
            p3_enabled: self.phases.p3_enabled,
            interrupt_active,
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> RotationSnapshot {
        let state = self.lock();
        RotationSnapshot {
            current_index: state.current_index,
            cycles: state.cycles,
            channels: state.channels.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Adopt saved progress for channels that are still configured. Channels
    /// missing from the snapshot keep their fresh `P1` state; snapshot entries
    /// for channels no longer configured are ignored.
    pub fn restore(&self, snapshot: &RotationSnapshot) {
        let mut state = self.lock();
        let current_id = snapshot
            .channels
            .get(snapshot.current_index)
            .map(|c| c.channel_id.clone());

        for channel in &mut state.channels {
            if let Some(saved) = snapshot
                .channels
                .iter()
                .find(|s| s.channel_id == channel.channel_id)
            {
                channel.phase = saved.phase;
                channel.counters = saved.counters.clone();
                channel.cycles_completed = saved.cycles_completed;
                channel.last_completed_at = saved.last_completed_at;
            }
        }
        state.cycles = snapshot.cycles;
        state.current_index = current_id
            .and_then(|id| state.channels.iter().position(|c| c.channel_id == id))
            .unwrap_or(0);
    }

    /// Put every channel back to `P1` without counting a finished cycle.
    pub fn reset(&self) {
        let mut state = self.lock();
        for channel in &mut state.channels {
            channel.phase = Phase::P1;
        }
        state.current_index = 0;
    }
}

/// First channel after `from` (wrapping) that is not complete.
fn next_incomplete(channels: &[ChannelState], from: usize) -> Option<usize> {
    let n = channels.len();
    (1..=n)
        .map(|offset| (from + offset) % n)
        .find(|&i| !channels[i].phase.is_complete())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breadcrumbs::MemorySink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn channels(ids: &[&str]) -> Vec<ChannelConfig> {
        ids.iter()
            .map(|id| {
                ChannelConfig::new(*id, id.to_uppercase()).with_resource(format!("browser-{id}"))
            })
            .collect()
    }

    fn router(ids: &[&str]) -> ChannelRotationRouter {
        ChannelRotationRouter::new(&channels(ids), PhaseConfig::default()).unwrap()
    }

    fn work(decision: &ActivityDecision) -> (Option<&str>, Option<Phase>) {
        (decision.channel_id.as_deref(), decision.phase)
    }

    #[test]
    fn duplicate_channel_ids_are_rejected() {
        let err = ChannelRotationRouter::new(&channels(&["a", "b", "a"]), PhaseConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, SwitchboardError::DuplicateChannel(ref id) if id == "a"));

        let cfg = Config::new(vec![ChannelConfig::new("a", "A"), ChannelConfig::new("a", "A2")]);
        assert!(ChannelRotationRouter::from_config(&cfg).is_err());
    }

    #[test]
    fn every_cycle_reaches_idle() {
        let r = router(&["a", "b"]);
        let mut idles = 0;
        for _ in 0..16 {
            let d = r.get_next_activity();
            match d.channel_id {
                Some(id) => {
                    r.signal_phase_complete(&id, d.phase.unwrap(), None);
                }
                None => idles += 1,
            }
        }
        // Six completions per cycle plus the idle call that resets it.
        assert_eq!(idles, 2);
        assert_eq!(r.get_status().cycles, 2);
    }

    #[test]
    fn first_activity_is_first_channel_p1() {
        let r = router(&["a", "b"]);
        let d = r.get_next_activity();
        assert_eq!(work(&d), (Some("a"), Some(Phase::P1)));
        assert_eq!(d.next_activity, Activity::Work("comment_engagement".into()));
        assert_eq!(d.recommended_resource.as_deref(), Some("browser-a"));
    }

    #[test]
    fn finishing_a_moves_rotation_to_b() {
        let r = router(&["a", "b"]);
        assert_eq!(work(&r.get_next_activity()), (Some("a"), Some(Phase::P1)));
        assert_eq!(r.signal_phase_complete("a", Phase::P1, None), Some(Phase::P2));
        assert_eq!(r.signal_phase_complete("a", Phase::P1, None), Some(Phase::P3));
        assert_eq!(
            r.signal_phase_complete("a", Phase::P1, None),
            Some(Phase::Complete)
        );
        assert_eq!(work(&r.get_next_activity()), (Some("b"), Some(Phase::P1)));
    }

    #[test]
    fn stays_on_channel_until_complete() {
        let r = router(&["a", "b"]);
        r.signal_phase_complete("a", Phase::P1, None);
        assert_eq!(work(&r.get_next_activity()), (Some("a"), Some(Phase::P2)));
        r.signal_phase_complete("a", Phase::P2, None);
        assert_eq!(work(&r.get_next_activity()), (Some("a"), Some(Phase::P3)));
    }

    #[test]
    fn full_cycle_resets_and_reports_idle_once() {
        let r = router(&["a", "b"]);
        for id in ["a", "b"] {
            for phase in Phase::working() {
                r.signal_phase_complete(id, *phase, None);
            }
        }
        let d = r.get_next_activity();
        assert_eq!(d.next_activity, Activity::Idle);
        let status = r.get_status();
        assert_eq!(status.cycles, 1);
        assert!(status.channels.iter().all(|c| c.phase == Phase::P1));
        assert_eq!(work(&r.get_next_activity()), (Some("a"), Some(Phase::P1)));
    }

    #[test]
    fn each_channel_completes_once_per_cycle() {
        let r = router(&["a", "b", "c"]);
        let mut order = Vec::new();
        loop {
            let d = r.get_next_activity();
            let Some(id) = d.channel_id.clone() else {
                break;
            };
            let phase = d.phase.unwrap();
            if r.signal_phase_complete(&id, phase, None) == Some(Phase::Complete) {
                order.push(id);
            }
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(r
            .get_status()
            .channels
            .iter()
            .all(|c| c.cycles_completed == 1));
    }

    #[test]
    fn disabled_phases_are_skipped_with_breadcrumbs() {
        let sink = Arc::new(MemorySink::new());
        let phases = PhaseConfig {
            p2_enabled: false,
            p3_enabled: false,
            ..PhaseConfig::default()
        };
        let r = ChannelRotationRouter::new(&channels(&["a", "b"]), phases)
            .unwrap()
            .with_sink(sink.clone());
        r.signal_phase_complete("a", Phase::P1, None);
        // a skips P2 and P3, reaches Complete, rotation moves on to b.
        assert_eq!(work(&r.get_next_activity()), (Some("b"), Some(Phase::P1)));
        let types = sink.event_types();
        assert_eq!(
            types.iter().filter(|t| *t == "phase_skipped").count(),
            2,
            "events: {types:?}"
        );
    }

    #[test]
    fn phase_never_moves_backward_on_repeat_completion() {
        let r = router(&["a"]);
        for _ in 0..3 {
            r.signal_phase_complete("a", Phase::P1, None);
        }
        assert_eq!(
            r.signal_phase_complete("a", Phase::P1, None),
            Some(Phase::Complete)
        );
        assert_eq!(r.get_status().channels[0].cycles_completed, 1);
    }

    #[test]
    fn unknown_channel_is_a_noop() {
        let r = router(&["a"]);
        let before = r.get_status();
        assert_eq!(r.signal_phase_complete("zzz", Phase::P1, None), None);
        assert_eq!(r.get_status(), before);
    }

    #[test]
    fn metadata_counters_are_merged() {
        let r = router(&["a"]);
        let mut meta = Metadata::new();
        meta.insert("comments_remaining".into(), json!(12));
        meta.insert("note".into(), json!("not a number"));
        r.signal_phase_complete("a", Phase::P1, Some(&meta));
        meta.insert("comments_remaining".into(), json!(0));
        meta.insert("videos_scheduled".into(), json!(3));
        r.signal_phase_complete("a", Phase::P2, Some(&meta));

        let counters = &r.get_status().channels[0].counters;
        assert_eq!(counters.get("comments_remaining"), Some(&0));
        assert_eq!(counters.get("videos_scheduled"), Some(&3));
        assert!(!counters.contains_key("note"));
    }

    #[test]
    fn interrupt_overrides_without_mutating() {
        let urgent = Arc::new(AtomicBool::new(true));
        let flag = urgent.clone();
        let r = router(&["a", "b"])
            .with_interrupt(InterruptConfig {
                activity: "live_chat".into(),
                resource: Some("chrome-live".into()),
            })
            .with_urgent_check(Arc::new(move || flag.load(Ordering::SeqCst)));

        let before = r.get_status().channels;
        for _ in 0..3 {
            let d = r.get_next_activity();
            assert_eq!(d.next_activity, Activity::Interrupt("live_chat".into()));
            assert_eq!(d.recommended_resource.as_deref(), Some("chrome-live"));
        }
        assert_eq!(r.get_status().channels, before);

        urgent.store(false, Ordering::SeqCst);
        assert_eq!(work(&r.get_next_activity()), (Some("a"), Some(Phase::P1)));
    }

    #[test]
    fn no_channels_is_idle() {
        let r = router(&[]);
        assert_eq!(r.get_next_activity().next_activity, Activity::Idle);
        assert_eq!(r.get_status().cycles, 0);
    }

    #[test]
    fn recommended_resource_by_id_or_current() {
        let r = router(&["a", "b"]);
        assert_eq!(r.recommended_resource(None).as_deref(), Some("browser-a"));
        assert_eq!(r.recommended_resource(Some("b")).as_deref(), Some("browser-b"));
        assert_eq!(r.recommended_resource(Some("nope")), None);
    }

    #[test]
    fn marker_file_check_tracks_file() {
        let dir = TempDir::new().unwrap();
        let check = MarkerFileCheck::for_root(dir.path());
        assert!(!check.is_urgent_active());
        std::fs::create_dir_all(paths::switchboard_dir(dir.path())).unwrap();
        std::fs::write(paths::urgent_marker_path(dir.path()), b"").unwrap();
        assert!(check.is_urgent_active());
    }

    #[test]
    fn snapshot_save_load_restore() {
        let dir = TempDir::new().unwrap();
        let r = router(&["a", "b"]);
        for _ in 0..3 {
            r.signal_phase_complete("a", Phase::P1, None);
        }
        r.signal_phase_complete("b", Phase::P1, None);
        r.snapshot().save(dir.path()).unwrap();

        let loaded = RotationSnapshot::load(dir.path()).unwrap().unwrap();
        // "c" is new in config; "a" and "b" resume.
        let fresh = router(&["a", "b", "c"]);
        fresh.restore(&loaded);
        let status = fresh.get_status();
        assert_eq!(status.channels[0].phase, Phase::Complete);
        assert_eq!(status.channels[1].phase, Phase::P2);
        assert_eq!(status.channels[2].phase, Phase::P1);
        assert_eq!(status.current_channel.as_deref(), Some("b"));
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(RotationSnapshot::load(dir.path()).unwrap().is_none());
    }
}
