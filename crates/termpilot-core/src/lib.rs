//! Core engine for the termpilot terminal agent.
//!
//! The centerpiece is [`AutoRunController`], a bounded, supervised control
//! loop over an unreliable trio of collaborators: a shell, a network-hosted
//! model, and the terminal UI's event stream. Around it sit the error
//! classifier, the command history, the stuck detector, the safety gate, the
//! tool dispatcher, and an independent liveness [`Watchdog`].
//!
//! All observable behavior flows through the typed per-session
//! [`SessionEvent`] channel; nothing here talks to the UI directly.

pub mod auto_run;
pub mod error;
pub mod error_patterns;
pub mod events;
pub mod history;
pub mod llm;
pub mod parser;
pub mod prompts;
pub mod safety;
pub mod session;
pub mod stuck;
pub mod tools;
pub mod watchdog;

pub use auto_run::{AutoRunController, AutoRunState, LoopPhase, StepOutcome, MAX_AUTO_STEPS};
pub use error::LoopError;
pub use error_patterns::{ErrorCategory, ErrorPatternMatcher};
pub use events::{EventSender, SessionEvent};
pub use history::{CommandHistoryEntry, CommandHistoryTracker, HISTORY_CAP};
pub use parser::{ResponseParser, ResponseSegment, SentinelKind, ToolInvocation, ToolVerb};
pub use safety::{AllowAllClassifier, ImpactClassifier, PendingSafetyCommand, SafetyGate};
pub use session::{generate_session_id, SessionController};
pub use stuck::{
    StuckDetector, StuckVerdict, MAX_CONSECUTIVE_FAILURES, MAX_SIMILAR_COMMANDS,
    STUCK_DETECTION_WINDOW,
};
pub use tools::{FileSystem, LocalFileSystem};
pub use watchdog::{
    ActivityMonitor, Watchdog, COMMAND_INTERVENTION_THRESHOLD, COMMAND_STALL_THRESHOLD,
    THINKING_STALL_THRESHOLD, WATCHDOG_POLL_INTERVAL,
};
