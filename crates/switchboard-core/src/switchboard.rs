//! Priority admission gate.
//!
//! Every producer funnels its requests through [`Switchboard::receive`],
//! which answers EXECUTE, HOLD, ESCALATE or DROP. A signal waits while any
//! strictly more urgent tier is occupied; P0 never waits. Each tier tracks at
//! most one admitted signal: a newcomer on an occupied tier takes over the
//! slot, and the superseded signal keeps running untracked.
//!
//! [`Switchboard::execute`] runs the handler outside the gate lock, then in a
//! single critical section releases the tier, records the outcome and admits
//! the head of the wait queue if it is now eligible. The admitted successor
//! is executed by the same loop, so a burst of queued signals never deepens
//! the stack.

use crate::breadcrumbs::{EventSink, NewBreadcrumb, NoopSink};
use crate::config::{Config, PriorityConfig, QueueConfig};
use crate::handler::{ActivityExecutor, HandlerRegistry, Outcome, RotationHandler};
use crate::learning::{LearningStats, OutcomeRecord, PatternMemory};
use crate::rotation::ChannelRotationRouter;
use crate::signal::{self, Metadata, Signal, SwitchboardDecision};
use crate::types::{DecisionAction, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SOURCE: &str = "switchboard";

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub signal_type: String,
    pub priority: Priority,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Queued signals admitted and executed after this one, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drained: Vec<ExecutionResult>,
}

impl ExecutionResult {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

// ---------------------------------------------------------------------------
// Status snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTier {
    pub priority: Priority,
    pub signal_type: String,
    pub source: String,
    pub execution_id: Uuid,
    pub admitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEntry {
    pub position: usize,
    pub priority: Priority,
    pub signal_type: String,
    pub source: String,
    pub execution_id: Uuid,
    pub waiting_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCounters {
    pub received: u64,
    pub admitted: u64,
    pub held: u64,
    pub escalated: u64,
    pub dropped: u64,
    pub expired: u64,
    pub superseded: u64,
    pub executed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateStatus {
    pub active: Vec<ActiveTier>,
    pub queue: Vec<QueuedEntry>,
    pub counters: GateCounters,
    pub handlers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Admission {
    signal: Signal,
    admitted_at: DateTime<Utc>,
}

#[derive(Default)]
struct GateState {
    admitted: BTreeMap<Priority, Admission>,
    queue: Vec<Signal>,
    stats: LearningStats,
    counters: GateCounters,
}

impl GateState {
    /// Most urgent admitted signal on a tier strictly above `priority`.
    fn blocker_for(&self, priority: Priority) -> Option<&Signal> {
        self.admitted
            .range(..priority)
            .next()
            .map(|(_, a)| &a.signal)
    }

    /// Stable insert: after every queued signal of equal or higher urgency.
    fn enqueue(&mut self, signal: Signal) -> usize {
        let idx = self
            .queue
            .iter()
            .position(|q| signal.priority.is_more_urgent_than(q.priority))
            .unwrap_or(self.queue.len());
        self.queue.insert(idx, signal);
        idx + 1
    }

    /// Occupy the signal's tier. Returns the signal it superseded, if any.
    fn admit(&mut self, signal: Signal) -> Option<Signal> {
        self.counters.admitted += 1;
        let previous = self.admitted.insert(
            signal.priority,
            Admission {
                signal,
                admitted_at: Utc::now(),
            },
        );
        if previous.is_some() {
            self.counters.superseded += 1;
        }
        previous.map(|a| a.signal)
    }

    /// Free the tier only if this execution holds it. A superseded signal
    /// no longer does, so its completion leaves the tier to its successor.
    fn release(&mut self, signal: &Signal) -> bool {
        let held = self
            .admitted
            .get(&signal.priority)
            .is_some_and(|a| a.signal.execution_id == signal.execution_id);
        if held {
            self.admitted.remove(&signal.priority);
        }
        held
    }

    fn take_expired(&mut self, ttl: Option<Duration>, now: DateTime<Utc>) -> Vec<Signal> {
        let Some(ttl) = ttl.and_then(|t| chrono::Duration::from_std(t).ok()) else {
            return Vec::new();
        };
        let (expired, kept): (Vec<Signal>, Vec<Signal>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|s| s.age(now) >= ttl);
        self.queue = kept;
        self.counters.expired += expired.len() as u64;
        expired
    }

    /// Admit the queue head if no more urgent tier is active. Returns the
    /// admitted signal and the one it superseded.
    fn admit_head(&mut self) -> Option<(Signal, Option<Signal>)> {
        let head = self.queue.first()?;
        if let Some(blocker) = self.blocker_for(head.priority) {
            debug!(
                head = %head.signal_type,
                blocker = %blocker.signal_type,
                "queue head still blocked"
            );
            return None;
        }
        let signal = self.queue.remove(0);
        let superseded = self.admit(signal.clone());
        Some((signal, superseded))
    }
}

// ---------------------------------------------------------------------------
// Switchboard
// ---------------------------------------------------------------------------

pub struct Switchboard {
    state: Mutex<GateState>,
    priorities: PriorityConfig,
    queue: QueueConfig,
    registry: HandlerRegistry,
    sink: Arc<dyn EventSink>,
    router: Option<Arc<ChannelRotationRouter>>,
    memory: Option<Arc<dyn PatternMemory>>,
}

impl Switchboard {
    pub fn builder() -> SwitchboardBuilder {
        SwitchboardBuilder::default()
    }

    // Bookkeeping stays consistent across a panicking holder: handlers never
    // run under this lock.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn resolve_priority(&self, signal_type: &str) -> Priority {
        if !self.priorities.overrides.contains_key(signal_type)
            && signal::known_priority(signal_type).is_none()
        {
            debug!(signal_type, "unknown signal type, defaulting to p3");
        }
        self.priorities.resolve(signal_type)
    }

    fn audit(&self, event_type: &str, signal: &Signal, message: String) {
        self.sink.record(
            NewBreadcrumb::new(SOURCE, event_type, message)
                .metadata(json!({
                    "execution_id": signal.execution_id.to_string(),
                    "signal_type": signal.signal_type,
                    "source": signal.source,
                    "priority": signal.priority.as_str(),
                }))
                .session(signal.execution_id.to_string()),
        );
    }

    fn recommend(&self, signal: &Signal) -> Option<String> {
        let router = self.router.as_ref()?;
        router.recommended_resource(signal.meta_str("channel_id"))
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Arbitrate a new request. Never fails: unknown types get the default
    /// tier and log failures are absorbed by the sink.
    pub fn receive(
        &self,
        signal_type: &str,
        source: &str,
        metadata: Option<Metadata>,
    ) -> SwitchboardDecision {
        let priority = self.resolve_priority(signal_type);
        let signal = Signal::new(signal_type, source, priority, metadata.unwrap_or_default());
        self.audit(
            "signal_received",
            &signal,
            format!("{signal_type} from {source} ({priority})"),
        );

        if priority == Priority::P0 {
            let superseded = {
                let mut state = self.lock();
                state.counters.received += 1;
                state.admit(signal.clone())
            };
            info!(signal_type, source, "critical signal admitted");
            return self.execute_decision(
                signal,
                "critical signal bypasses admission control".to_string(),
                superseded,
            );
        }

        if self.priorities.escalates(signal_type) {
            {
                let mut state = self.lock();
                state.counters.received += 1;
                state.counters.escalated += 1;
            }
            info!(signal_type, source, "signal escalated");
            self.audit(
                "signal_escalated",
                &signal,
                format!("{signal_type} routed to advisory review"),
            );
            return SwitchboardDecision::new(
                DecisionAction::Escalate,
                signal,
                format!("{signal_type} requires advisory review"),
            );
        }

        let mut state = self.lock();
        state.counters.received += 1;
        let blocker = state
            .blocker_for(priority)
            .map(|b| (b.signal_type.clone(), b.priority));
        if let Some((blocker_type, blocker_priority)) = blocker {
            if state.queue.len() >= self.queue.max_len {
                state.counters.dropped += 1;
                drop(state);
                warn!(signal_type, source, "wait queue full, signal dropped");
                self.audit(
                    "signal_dropped",
                    &signal,
                    format!("queue full ({} waiting)", self.queue.max_len),
                );
                return SwitchboardDecision::new(
                    DecisionAction::Drop,
                    signal,
                    format!(
                        "blocked by {blocker_type} ({blocker_priority}) and wait queue is full"
                    ),
                );
            }

            state.counters.held += 1;
            let position = state.enqueue(signal.clone());
            drop(state);
            debug!(signal_type, position, blocker = %blocker_type, "signal held");
            self.audit(
                "signal_held",
                &signal,
                format!("held at position {position} behind {blocker_type}"),
            );
            return SwitchboardDecision::new(
                DecisionAction::Hold,
                signal,
                format!("blocked by active {blocker_type} ({blocker_priority})"),
            )
            .with_position(position);
        }

        let superseded = state.admit(signal.clone());
        drop(state);
        info!(signal_type, source, %priority, "signal admitted");
        let reason = match &superseded {
            Some(prev) => format!("tier {priority} taken over from {}", prev.signal_type),
            None => format!("tier {priority} is free"),
        };
        self.execute_decision(signal, reason, superseded)
    }

    fn execute_decision(
        &self,
        signal: Signal,
        reason: String,
        superseded: Option<Signal>,
    ) -> SwitchboardDecision {
        if let Some(prev) = &superseded {
            self.audit_superseded(prev, &signal);
        }
        let resource = self.recommend(&signal);
        let decision = SwitchboardDecision::new(DecisionAction::Execute, signal, reason)
            .with_resource(resource);
        match superseded {
            Some(prev) => decision.with_meta("supersedes", prev.execution_id.to_string()),
            None => decision,
        }
    }

    fn audit_superseded(&self, previous: &Signal, successor: &Signal) {
        debug!(
            previous = %previous.signal_type,
            successor = %successor.signal_type,
            "tier slot superseded"
        );
        self.audit(
            "signal_superseded",
            previous,
            format!(
                "{} tier slot taken over by {}",
                previous.signal_type, successor.signal_type
            ),
        );
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run `signal`'s handler, then release its tier and execute every queued
    /// signal that becomes eligible as a result.
    pub fn execute(&self, signal: Signal) -> ExecutionResult {
        // Executing a held signal directly takes it out of the queue.
        self.lock()
            .queue
            .retain(|q| q.execution_id != signal.execution_id);

        let mut results: Vec<ExecutionResult> = Vec::new();
        let mut next = Some(signal);

        while let Some(current) = next.take() {
            let result = self.run_handler(&current);
            let record = OutcomeRecord {
                execution_id: current.execution_id,
                signal_type: current.signal_type.clone(),
                source: current.source.clone(),
                priority: current.priority,
                success: result.success,
                duration_ms: result.duration_ms,
                error: result.error.clone(),
                finished_at: Utc::now(),
            };

            let (expired, superseded) = {
                let mut state = self.lock();
                state.release(&current);
                state.counters.executed += 1;
                state.stats.record(&record);
                let expired = state.take_expired(self.ttl(), Utc::now());
                let (admitted, superseded) = state.admit_head().unzip();
                next = admitted;
                (expired, superseded.flatten())
            };

            self.record_outcome(&record);
            for stale in &expired {
                self.audit_expired(stale);
            }
            if let (Some(previous), Some(admitted)) = (&superseded, &next) {
                self.audit_superseded(previous, admitted);
            }
            if let Some(admitted) = &next {
                info!(signal_type = %admitted.signal_type, "queued signal admitted");
                self.audit(
                    "signal_admitted",
                    admitted,
                    format!("{} admitted from queue", admitted.signal_type),
                );
            }
            results.push(result);
        }

        let mut first = results.remove(0);
        first.drained = results;
        first
    }

    fn run_handler(&self, signal: &Signal) -> ExecutionResult {
        let executor: Arc<dyn ActivityExecutor> = self.registry.resolve(&signal.signal_type);
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(signal)));
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (success, outcome, error) = match outcome {
            Ok(Ok(outcome)) => (true, Some(outcome), None),
            Ok(Err(e)) => (false, None, Some(format!("{e:#}"))),
            Err(payload) => {
                let message = panic_message(&*payload);
                (false, None, Some(format!("handler panicked: {message}")))
            }
        };
        if let Some(e) = &error {
            warn!(signal_type = %signal.signal_type, error = %e, "handler failed");
        }

        ExecutionResult {
            execution_id: signal.execution_id,
            signal_type: signal.signal_type.clone(),
            priority: signal.priority,
            success,
            outcome,
            error,
            duration_ms,
            drained: Vec::new(),
        }
    }

    fn record_outcome(&self, record: &OutcomeRecord) {
        let verdict = if record.success { "succeeded" } else { "failed" };
        self.sink.record(
            NewBreadcrumb::new(
                SOURCE,
                "signal_outcome",
                format!("{} {verdict} in {}ms", record.signal_type, record.duration_ms),
            )
            .metadata(json!({
                "execution_id": record.execution_id.to_string(),
                "signal_type": record.signal_type,
                "source": record.source,
                "priority": record.priority.as_str(),
                "success": record.success,
                "duration_ms": record.duration_ms,
                "error": record.error,
            }))
            .session(record.execution_id.to_string()),
        );
        if let Some(memory) = &self.memory {
            memory.record_outcome(record);
        }
    }

    fn audit_expired(&self, signal: &Signal) {
        info!(signal_type = %signal.signal_type, "queued signal expired");
        self.audit(
            "signal_expired",
            signal,
            format!("{} expired after waiting in queue", signal.signal_type),
        );
    }

    fn ttl(&self) -> Option<Duration> {
        self.queue.ttl_seconds.map(Duration::from_secs)
    }

    /// Drop every queued signal older than the configured TTL.
    pub fn expire_stale(&self) -> usize {
        let expired = self.lock().take_expired(self.ttl(), Utc::now());
        for stale in &expired {
            self.audit_expired(stale);
        }
        expired.len()
    }

    // -----------------------------------------------------------------------
    // Observability
    // -----------------------------------------------------------------------

    pub fn status(&self) -> GateStatus {
        let now = Utc::now();
        let state = self.lock();
        GateStatus {
            active: state
                .admitted
                .iter()
                .map(|(priority, a)| ActiveTier {
                    priority: *priority,
                    signal_type: a.signal.signal_type.clone(),
                    source: a.signal.source.clone(),
                    execution_id: a.signal.execution_id,
                    admitted_at: a.admitted_at,
                })
                .collect(),
            queue: state
                .queue
                .iter()
                .enumerate()
                .map(|(i, s)| QueuedEntry {
                    position: i + 1,
                    priority: s.priority,
                    signal_type: s.signal_type.clone(),
                    source: s.source.clone(),
                    execution_id: s.execution_id,
                    waiting_ms: s.age(now).num_milliseconds().max(0) as u64,
                })
                .collect(),
            counters: state.counters.clone(),
            handlers: self.registry.registered_types(),
        }
    }

    pub fn learning_stats(&self) -> LearningStats {
        self.lock().stats.clone()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// SwitchboardBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SwitchboardBuilder {
    priorities: PriorityConfig,
    queue: QueueConfig,
    registry: HandlerRegistry,
    sink: Option<Arc<dyn EventSink>>,
    router: Option<Arc<ChannelRotationRouter>>,
    memory: Option<Arc<dyn PatternMemory>>,
}

impl SwitchboardBuilder {
    pub fn config(mut self, cfg: &Config) -> Self {
        self.priorities = cfg.priorities.clone();
        self.queue = cfg.queue.clone();
        self
    }

    pub fn priorities(mut self, priorities: PriorityConfig) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a router for resource hints; rotation signals are routed to it
    /// unless a handler for them is registered explicitly.
    pub fn router(mut self, router: Arc<ChannelRotationRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn PatternMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn handler(
        mut self,
        signal_type: impl Into<String>,
        executor: Arc<dyn ActivityExecutor>,
    ) -> Self {
        self.registry.register(signal_type, executor);
        self
    }

    pub fn fallback(mut self, executor: Arc<dyn ActivityExecutor>) -> Self {
        self.registry.set_fallback(executor);
        self
    }

    pub fn build(self) -> Switchboard {
        let mut registry = self.registry;
        if let Some(router) = &self.router {
            let explicit = registry.is_registered(RotationHandler::PHASE_COMPLETE)
                || registry.is_registered(RotationHandler::ROTATION_COMPLETE);
            if !explicit {
                registry.register_rotation(router.clone());
            }
        }
        Switchboard {
            state: Mutex::new(GateState::default()),
            priorities: self.priorities,
            queue: self.queue,
            registry,
            sink: self.sink.unwrap_or_else(|| Arc::new(NoopSink)),
            router: self.router,
            memory: self.memory,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
