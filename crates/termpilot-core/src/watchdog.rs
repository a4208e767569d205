//! Liveness watchdog, independent of the control loop.
//!
//! The controller is event-driven and can only react when an event arrives;
//! the watchdog exists to notice when no event arrives at all. It polls a
//! shared `ActivityMonitor` on a fixed timer and never blocks on, or reaches
//! into, the controller's state machine, so it can keep working even when the
//! loop itself is wedged.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{EventSender, SessionEvent};

/// Poll cadence of the watchdog task.
pub const WATCHDOG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A running command with no output for this long is suspect.
pub const COMMAND_STALL_THRESHOLD: Duration = Duration::from_secs(30);

/// A suspect command past this total runtime is cancelled.
pub const COMMAND_INTERVENTION_THRESHOLD: Duration = Duration::from_secs(35);

/// An in-flight model call taking longer than this is reported (never
/// cancelled; no abort primitive is assumed for the model call).
pub const THINKING_STALL_THRESHOLD: Duration = Duration::from_secs(45);

struct RunningCommand {
    id: Uuid,
    started: Instant,
    cancel: CancellationToken,
}

#[derive(Default)]
struct MonitorState {
    last_activity: Option<Instant>,
    running_command: Option<RunningCommand>,
    thinking_since: Option<Instant>,
    command_stall_reported: bool,
    thinking_stall_reported: bool,
    intervention_performed: bool,
}

/// Shared activity record observed by the watchdog and updated by whichever
/// component sees activity first: command start/finish, output lines, and
/// model-call start/finish.
#[derive(Clone)]
pub struct ActivityMonitor {
    inner: Arc<Mutex<MonitorState>>,
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorState::default())),
        }
    }

    /// Record inbound activity of any kind, resetting stall reports.
    pub fn touch(&self) {
        let mut state = self.inner.lock().unwrap();
        state.last_activity = Some(Instant::now());
        state.command_stall_reported = false;
        state.thinking_stall_reported = false;
    }

    /// Register a started command and get its cancellation token.
    pub fn command_started(&self, id: Uuid) -> CancellationToken {
        let cancel = CancellationToken::new();
        let mut state = self.inner.lock().unwrap();
        state.running_command = Some(RunningCommand {
            id,
            started: Instant::now(),
            cancel: cancel.clone(),
        });
        state.last_activity = Some(Instant::now());
        state.command_stall_reported = false;
        state.intervention_performed = false;
        cancel
    }

    pub fn command_finished(&self) {
        let mut state = self.inner.lock().unwrap();
        state.running_command = None;
        state.last_activity = Some(Instant::now());
        state.command_stall_reported = false;
    }

    pub fn thinking_started(&self) {
        let mut state = self.inner.lock().unwrap();
        state.thinking_since = Some(Instant::now());
        state.thinking_stall_reported = false;
    }

    pub fn thinking_finished(&self) {
        let mut state = self.inner.lock().unwrap();
        state.thinking_since = None;
        state.last_activity = Some(Instant::now());
        state.thinking_stall_reported = false;
    }

    /// Cancel the running command, if any. Used by both the user's cancel
    /// action and the watchdog's intervention.
    pub fn cancel_running_command(&self) -> bool {
        let state = self.inner.lock().unwrap();
        match &state.running_command {
            Some(cmd) => {
                info!("Cancelling running command {}", cmd.id);
                cmd.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running_command_id(&self) -> Option<Uuid> {
        self.inner.lock().unwrap().running_command.as_ref().map(|c| c.id)
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Watchdog;

impl Watchdog {
    /// Spawn the per-session watchdog task. Runs until `shutdown` fires.
    pub fn spawn(
        monitor: ActivityMonitor,
        events: EventSender,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCHDOG_POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Watchdog shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        Self::check(&monitor, &events);
                    }
                }
            }
        })
    }

    fn check(monitor: &ActivityMonitor, events: &EventSender) {
        let now = Instant::now();
        let mut to_emit: Vec<SessionEvent> = Vec::new();
        let mut cancel_command: Option<CancellationToken> = None;

        {
            let mut guard = monitor.inner.lock().unwrap();
            let state = &mut *guard;

            if let Some(cmd) = &state.running_command {
                let runtime = now.saturating_duration_since(cmd.started);
                let idle = state
                    .last_activity
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(runtime);

                let stalled =
                    runtime > COMMAND_STALL_THRESHOLD && idle > COMMAND_STALL_THRESHOLD;

                if stalled && !state.command_stall_reported {
                    state.command_stall_reported = true;
                    to_emit.push(SessionEvent::StallSuspected {
                        detail: format!(
                            "command has produced no output for {}s ({}s total runtime)",
                            idle.as_secs(),
                            runtime.as_secs()
                        ),
                    });
                }

                if stalled
                    && runtime > COMMAND_INTERVENTION_THRESHOLD
                    && !state.intervention_performed
                {
                    state.intervention_performed = true;
                    warn!(
                        "Watchdog cancelling stalled command {} after {}s",
                        cmd.id,
                        runtime.as_secs()
                    );
                    cancel_command = Some(cmd.cancel.clone());
                    to_emit.push(SessionEvent::InterventionPerformed {
                        detail: format!(
                            "cancelled stalled command after {}s without output",
                            idle.as_secs()
                        ),
                    });
                }
            }

            if let Some(since) = state.thinking_since {
                let elapsed = now.saturating_duration_since(since);
                if elapsed > THINKING_STALL_THRESHOLD && !state.thinking_stall_reported {
                    state.thinking_stall_reported = true;
                    to_emit.push(SessionEvent::StallSuspected {
                        detail: format!(
                            "model call has been in flight for {}s",
                            elapsed.as_secs()
                        ),
                    });
                }
            }
        }

        if let Some(token) = cancel_command {
            token.cancel();
        }
        for event in to_emit {
            events.emit(event);
        }
    }
}
