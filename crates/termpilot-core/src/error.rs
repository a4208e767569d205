//! Failure taxonomy for the autonomous loop.
//!
//! Every way the loop can stop short is one of these variants; the
//! propagation policy is that all of them are surfaced on the session event
//! stream and only execution and tool failures continue without a fresh user
//! action.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopError {
    /// A dispatched command exited nonzero. Fed back to the model.
    #[error("command exited with status {exit_code}")]
    ExecutionFailure { exit_code: i32 },

    /// A tool invocation failed. Reported as a synthetic message, the loop
    /// continues.
    #[error("tool {verb} failed: {message}")]
    ToolFailure { verb: String, message: String },

    /// The response contained no sentinel, tool call, or command.
    #[error("response contained no actionable content")]
    ParseFailure,

    /// The stuck detector halted autonomous progress.
    #[error("autonomous loop is stuck: {reason}")]
    StuckLoop { reason: String },

    /// The step budget was exhausted. Requires an explicit re-enable.
    #[error("step budget of {limit} commands exhausted")]
    BudgetExceeded { limit: u32 },

    /// The safety gate flagged the proposed command.
    #[error("command requires confirmation: {impact}")]
    SafetyBlocked { impact: String },

    /// The model call itself failed after retries.
    #[error("model request failed: {0}")]
    ProviderFailure(anyhow::Error),
}

impl LoopError {
    /// Whether the loop may continue automatically after this failure.
    /// Everything else requires a new user action (message, toggle, or
    /// confirmation).
    pub fn allows_auto_continue(&self) -> bool {
        matches!(
            self,
            LoopError::ExecutionFailure { .. }
                | LoopError::ToolFailure { .. }
                | LoopError::ParseFailure
        )
    }
}
