//! Activity executors: the work a signal stands for.
//!
//! The gate only cares about the shape `Signal -> Result<Outcome>`. How an
//! executor does its job (browser automation, an API call) is its own
//! business. Unregistered signal types go to [`GenericHandler`].

use crate::rotation::{Activity, ChannelRotationRouter};
use crate::signal::{Metadata, Signal};
use crate::types::Phase;
use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Structured result an executor hands back.
pub type Outcome = serde_json::Map<String, Value>;

pub trait ActivityExecutor: Send + Sync {
    fn execute(&self, signal: &Signal) -> anyhow::Result<Outcome>;
}

impl<F> ActivityExecutor for F
where
    F: Fn(&Signal) -> anyhow::Result<Outcome> + Send + Sync,
{
    fn execute(&self, signal: &Signal) -> anyhow::Result<Outcome> {
        self(signal)
    }
}

// ---------------------------------------------------------------------------
// Built-in executors
// ---------------------------------------------------------------------------

/// Fallback for signal types nobody registered: acknowledges the signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericHandler;

impl ActivityExecutor for GenericHandler {
    fn execute(&self, signal: &Signal) -> anyhow::Result<Outcome> {
        let mut outcome = Outcome::new();
        outcome.insert("handler".into(), json!("generic"));
        outcome.insert("signal_type".into(), json!(signal.signal_type));
        outcome.insert("source".into(), json!(signal.source));
        outcome.insert("acknowledged".into(), json!(true));
        Ok(outcome)
    }
}

/// Handles rotation bookkeeping signals against a router.
///
/// - `channel_phase_complete` requires `channel_id` and accepts `phase` in
///   metadata; remaining numeric metadata becomes progress counters.
/// - `rotation_complete` asks the router what comes next.
pub struct RotationHandler {
    router: Arc<ChannelRotationRouter>,
}

impl RotationHandler {
    pub const PHASE_COMPLETE: &'static str = "channel_phase_complete";
    pub const ROTATION_COMPLETE: &'static str = "rotation_complete";

    pub fn new(router: Arc<ChannelRotationRouter>) -> Self {
        Self { router }
    }

    fn phase_complete(&self, signal: &Signal) -> anyhow::Result<Outcome> {
        let channel_id = signal
            .meta_str("channel_id")
            .ok_or_else(|| anyhow!("channel_phase_complete requires metadata.channel_id"))?;
        let reported: Phase = match signal.meta_str("phase") {
            Some(p) => p.parse().context("metadata.phase")?,
            None => self
                .router
                .get_status()
                .channels
                .iter()
                .find(|c| c.channel_id == channel_id)
                .map(|c| c.phase)
                .unwrap_or(Phase::P1),
        };
        let counters: Metadata = signal
            .metadata
            .iter()
            .filter(|(k, _)| k.as_str() != "channel_id" && k.as_str() != "phase")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let new_phase = self
            .router
            .signal_phase_complete(channel_id, reported, Some(&counters))
            .ok_or_else(|| anyhow!("unknown channel '{channel_id}'"))?;

        let mut outcome = Outcome::new();
        outcome.insert("channel_id".into(), json!(channel_id));
        outcome.insert("new_phase".into(), json!(new_phase.as_str()));
        Ok(outcome)
    }

    fn rotation_complete(&self) -> anyhow::Result<Outcome> {
        let next = self.router.get_next_activity();
        let mut outcome = Outcome::new();
        outcome.insert("next_activity".into(), json!(next.next_activity.name()));
        outcome.insert(
            "idle".into(),
            json!(matches!(next.next_activity, Activity::Idle)),
        );
        if let Some(id) = next.channel_id {
            outcome.insert("channel_id".into(), json!(id));
        }
        if let Some(resource) = next.recommended_resource {
            outcome.insert("recommended_resource".into(), json!(resource));
        }
        outcome.insert("reason".into(), json!(next.reason));
        Ok(outcome)
    }
}

impl ActivityExecutor for RotationHandler {
    fn execute(&self, signal: &Signal) -> anyhow::Result<Outcome> {
        match signal.signal_type.as_str() {
            Self::PHASE_COMPLETE => self.phase_complete(signal),
            Self::ROTATION_COMPLETE => self.rotation_complete(),
            other => Err(anyhow!("rotation handler cannot run '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActivityExecutor>>,
    fallback: Arc<dyn ActivityExecutor>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(GenericHandler),
        }
    }

    /// Register `executor` for `signal_type`, replacing any previous one.
    pub fn register(
        &mut self,
        signal_type: impl Into<String>,
        executor: Arc<dyn ActivityExecutor>,
    ) {
        self.handlers.insert(signal_type.into(), executor);
    }

    pub fn with(
        mut self,
        signal_type: impl Into<String>,
        executor: Arc<dyn ActivityExecutor>,
    ) -> Self {
        self.register(signal_type, executor);
        self
    }

    pub fn set_fallback(&mut self, executor: Arc<dyn ActivityExecutor>) {
        self.fallback = executor;
    }

    /// Route both rotation signals to a [`RotationHandler`] over `router`.
    pub fn register_rotation(&mut self, router: Arc<ChannelRotationRouter>) {
        let handler: Arc<dyn ActivityExecutor> = Arc::new(RotationHandler::new(router));
        self.register(RotationHandler::PHASE_COMPLETE, handler.clone());
        self.register(RotationHandler::ROTATION_COMPLETE, handler);
    }

    pub fn is_registered(&self, signal_type: &str) -> bool {
        self.handlers.contains_key(signal_type)
    }

    pub fn resolve(&self, signal_type: &str) -> Arc<dyn ActivityExecutor> {
        self.handlers
            .get(signal_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
