//! Typed per-session event stream.
//!
//! Every observable side effect of the control loop flows through one of
//! these notifications: the controller emits intents and status changes, the
//! watchdog emits liveness findings, and the host's UI renders them. Sends
//! are fire-and-forget: a departed receiver never blocks or fails the loop.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The controller wants this command executed by the host terminal.
    CommandDispatchRequest { command_id: Uuid, command: String },
    CommandStarted { command_id: Uuid, command: String },
    CommandFinished { command_id: Uuid, exit_code: i32 },
    StuckDetected {
        reason: String,
        suggestions: Vec<String>,
        failed_commands: Vec<String>,
    },
    BudgetExceeded { steps: u32 },
    SafetyCheckRequired { command: String, impact: String },
    StallSuspected { detail: String },
    InterventionPerformed { detail: String },
    /// User-facing notice that fits none of the structured kinds.
    StatusMessage { text: String },
}

/// Sending half of a session's event channel. Cheap to clone; one per
/// component that needs to publish.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event dropped: receiver is gone");
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        self.emit(SessionEvent::StatusMessage { text: text.into() });
    }
}
