//! The highlight engine: a single worker task that owns the session state
//! and the timer queue, fed by a command channel.
//!
//! The engine translates each arriving unit's timing window into deferred
//! activate/deactivate actions and fires them against the wall clock.
//! Consumers observe it two ways: a broadcast stream of [`SessionEvent`]s
//! for live rendering, and a watch channel carrying the full
//! [`TranscriptSnapshot`] for late joiners and resyncs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

use crate::session::{Schedule, SessionState, TimedText};
use crate::timer::TimerQueue;

const DEFAULT_COMMAND_BUFFER: usize = 256;
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Fallback wake-up interval while the timer queue is empty.
const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Observable state change, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A unit joined the transcript (always emitted, highlighted or not).
    UnitAppended { index: usize, text: String },
    /// The highlighted index changed; `None` clears the highlight.
    HighlightChanged { index: Option<usize> },
    /// The session was reset; all accumulated state is gone.
    SessionReset,
}

/// Point-in-time view of the transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptSnapshot {
    pub units: Vec<TranscriptUnit>,
    pub highlighted: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptUnit {
    pub index: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

/// Scheduling counters, one per outcome of the arrival-time decision.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    received: AtomicU64,
    scheduled_ahead: AtomicU64,
    started_in_window: AtomicU64,
    skipped_elapsed: AtomicU64,
    missing_timing: AtomicU64,
    invalid_timing: AtomicU64,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            scheduled_ahead: self.scheduled_ahead.load(Ordering::Relaxed),
            started_in_window: self.started_in_window.load(Ordering::Relaxed),
            skipped_elapsed: self.skipped_elapsed.load(Ordering::Relaxed),
            missing_timing: self.missing_timing.load(Ordering::Relaxed),
            invalid_timing: self.invalid_timing.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatsSnapshot {
    pub received: u64,
    pub scheduled_ahead: u64,
    pub started_in_window: u64,
    pub skipped_elapsed: u64,
    pub missing_timing: u64,
    pub invalid_timing: u64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("highlight engine is no longer running")]
    Closed,
}

enum Command {
    Reset { done: oneshot::Sender<()> },
    Push { event: TimedText, reply: oneshot::Sender<usize> },
}

/// Deferred action, guarded at fire time (epoch + index checks), never
/// cancelled.
#[derive(Debug, Clone, Copy)]
enum TimerAction {
    Activate { epoch: u64, index: usize },
    Deactivate { epoch: u64, index: usize },
}

/// Handle to a running highlight engine. Cloneable; the worker stops when
/// the last handle is dropped.
#[derive(Clone)]
pub struct HighlightEngine {
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<TranscriptSnapshot>,
    stats: Arc<SchedulerStats>,
}

impl HighlightEngine {
    /// Spawn a worker with default channel capacities.
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_COMMAND_BUFFER, DEFAULT_EVENT_BUFFER)
    }

    pub fn with_capacity(command_buffer: usize, event_buffer: usize) -> Self {
        let (cmd_tx, commands) = mpsc::channel(command_buffer.max(1));
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let (snapshot_tx, snapshot) = watch::channel(TranscriptSnapshot::default());
        let stats = Arc::new(SchedulerStats::default());

        let worker = Worker {
            commands,
            events: events.clone(),
            snapshot: snapshot_tx,
            stats: stats.clone(),
            state: SessionState::new(),
            queue: TimerQueue::new(),
        };
        tokio::spawn(worker.run());

        Self {
            cmd_tx,
            events,
            snapshot,
            stats,
        }
    }

    /// Reset session state for a new utterance. Call before starting the
    /// external assistant so no stale highlight survives into the new
    /// session.
    pub async fn begin_session(&self) -> Result<(), EngineError> {
        self.reset().await
    }

    /// Reset session state when the assistant is deactivated. Snapshot the
    /// transcript first if it should be persisted.
    pub async fn end_session(&self) -> Result<(), EngineError> {
        self.reset().await
    }

    async fn reset(&self) -> Result<(), EngineError> {
        let (done, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Reset { done })
            .await
            .map_err(|_| EngineError::Closed)?;
        done_rx.await.map_err(|_| EngineError::Closed)
    }

    /// Feed one transcription event. Resolves once the unit is in the
    /// transcript and its scheduling decision has been made, returning the
    /// unit's sequence index.
    pub async fn push(&self, event: TimedText) -> Result<usize, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Push { event, reply })
            .await
            .map_err(|_| EngineError::Closed)?;
        reply_rx.await.map_err(|_| EngineError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The event feed as a `Stream`, for consumers that prefer combinators.
    pub fn event_stream(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub fn transcript(&self) -> TranscriptSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }
}

struct Worker {
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<TranscriptSnapshot>,
    stats: Arc<SchedulerStats>,
    state: SessionState,
    queue: TimerQueue<TimerAction>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let now = Instant::now();
            while let Some(action) = self.queue.pop_due(now) {
                self.fire(action);
            }

            let deadline = self.queue.next_deadline();
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or(now + IDLE_TICK)),
                    if deadline.is_some() => {}
            }
        }
        trace!("highlight engine worker stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Reset { done } => {
                self.state.reset();
                self.emit(SessionEvent::SessionReset);
                self.publish();
                let _ = done.send(());
            }
            Command::Push { event, reply } => {
                let index = self.push_unit(event);
                let _ = reply.send(index);
            }
        }
    }

    fn push_unit(&mut self, event: TimedText) -> usize {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let epoch = self.state.epoch();
        let (index, schedule) = self.state.push_unit(event, now);

        let text = self.state.units()[index].text.clone();
        self.emit(SessionEvent::UnitAppended { index, text });

        match schedule {
            Schedule::Ahead {
                activate_at,
                deactivate_at,
            } => {
                self.stats.scheduled_ahead.fetch_add(1, Ordering::Relaxed);
                self.queue.push(activate_at, TimerAction::Activate { epoch, index });
                self.queue
                    .push(deactivate_at, TimerAction::Deactivate { epoch, index });
            }
            Schedule::InWindow { deactivate_at } => {
                self.stats.started_in_window.fetch_add(1, Ordering::Relaxed);
                if self.state.activate(epoch, index) {
                    self.emit(SessionEvent::HighlightChanged { index: Some(index) });
                }
                self.queue
                    .push(deactivate_at, TimerAction::Deactivate { epoch, index });
            }
            Schedule::Elapsed => {
                self.stats.skipped_elapsed.fetch_add(1, Ordering::Relaxed);
                debug!(index, "speech window already elapsed, transcript only");
            }
            Schedule::Untimed => {
                self.stats.missing_timing.fetch_add(1, Ordering::Relaxed);
            }
            Schedule::Malformed => {
                self.stats.invalid_timing.fetch_add(1, Ordering::Relaxed);
                debug!(index, "unusable timing metadata, transcript only");
            }
        }

        self.publish();
        index
    }

    fn fire(&mut self, action: TimerAction) {
        match action {
            TimerAction::Activate { epoch, index } => {
                if self.state.activate(epoch, index) {
                    self.emit(SessionEvent::HighlightChanged { index: Some(index) });
                    self.publish();
                } else {
                    trace!(index, "stale activation ignored");
                }
            }
            TimerAction::Deactivate { epoch, index } => {
                if self.state.deactivate(epoch, index) {
                    self.emit(SessionEvent::HighlightChanged { index: None });
                    self.publish();
                } else {
                    trace!(index, "stale deactivation ignored");
                }
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the transcript snapshot still advances.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let units = self
            .state
            .units()
            .iter()
            .map(|u| TranscriptUnit {
                index: u.sequence_index,
                text: u.text.clone(),
                start_time: u.start_offset.map(|d| d.as_secs_f64()),
                end_time: u.end_offset.map(|d| d.as_secs_f64()),
            })
            .collect();
        self.snapshot.send_replace(TranscriptSnapshot {
            units,
            highlighted: self.state.highlighted(),
        });
    }
}
