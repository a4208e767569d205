//! The auto-run controller: a bounded, supervised loop over model responses.
//!
//! One controller owns all mutable loop state for one session. It never
//! executes commands itself; it emits dispatch intents on the session event
//! stream and is advanced by `on_command_completed` when the host reports the
//! result. Model calls are the only external calls it makes directly.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use termpilot_config::AgentConfig;
use termpilot_providers::{CompletionRequest, LLMProvider, Message};

use crate::error::LoopError;
use crate::error_patterns::ErrorPatternMatcher;
use crate::events::{EventSender, SessionEvent};
use crate::history::CommandHistoryTracker;
use crate::llm::complete_with_retry;
use crate::parser::{
    contains_completion_phrase, ResponseParser, ResponseSegment, SentinelKind,
};
use crate::prompts::{AGENT_SYSTEM_PROMPT, STALL_NOTICE};
use crate::safety::{ImpactClassifier, PendingSafetyCommand, SafetyGate};
use crate::stuck::{suggestions_for_category, StuckDetector, STUCK_DETECTION_WINDOW};
use crate::tools::{dispatch_tool, truncate_output, FileSystem};
use crate::watchdog::ActivityMonitor;

/// Hard cap on commands dispatched per user turn.
pub const MAX_AUTO_STEPS: u32 = 10;

/// Cap on command output fed back into the conversation.
const MAX_FEEDBACK_CHARS: usize = 4000;

/// Loop phase for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
    WaitingForSafety,
    WaitingForUser,
    Stuck,
}

#[derive(Debug, Clone)]
pub struct AutoRunState {
    pub enabled: bool,
    pub step_count: u32,
    pub running_command_id: Option<Uuid>,
    pub stuck: bool,
    pub stuck_reason: Option<String>,
}

impl AutoRunState {
    fn new() -> Self {
        Self {
            enabled: false,
            step_count: 0,
            running_command_id: None,
            stuck: false,
            stuck_reason: None,
        }
    }
}

/// What a processing step decided.
#[derive(Debug)]
pub enum StepOutcome {
    /// More model turns are needed; the loop keeps going.
    Continue,
    /// A command was dispatched; the loop suspends until completion.
    Dispatched { command_id: Uuid },
    /// The model handed control back to the user.
    WaitingForUser,
    /// The model declared the task finished.
    Completed,
    /// The loop stopped for the given reason.
    Halted(LoopError),
}

pub struct AutoRunController {
    session_id: String,
    provider: Arc<dyn LLMProvider>,
    fs: Arc<dyn FileSystem>,
    gate: SafetyGate,
    parser: ResponseParser,
    matcher: ErrorPatternMatcher,
    history: CommandHistoryTracker,
    events: EventSender,
    monitor: ActivityMonitor,
    state: AutoRunState,
    phase: LoopPhase,
    conversation: Vec<Message>,
    pending_safety: Option<PendingSafetyCommand>,
    /// Command dispatched to the host, awaiting its completion signal.
    dispatched: Option<(Uuid, String)>,
    max_retry_attempts: u32,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl AutoRunController {
    pub fn new(
        session_id: String,
        provider: Arc<dyn LLMProvider>,
        fs: Arc<dyn FileSystem>,
        classifier: Arc<dyn ImpactClassifier>,
        events: EventSender,
        monitor: ActivityMonitor,
        agent: &AgentConfig,
    ) -> Result<Self> {
        Ok(Self {
            session_id,
            provider,
            fs,
            gate: SafetyGate::new(classifier),
            parser: ResponseParser::new()?,
            matcher: ErrorPatternMatcher::new()?,
            history: CommandHistoryTracker::new(),
            events,
            monitor,
            state: AutoRunState::new(),
            phase: LoopPhase::Idle,
            conversation: vec![Message::system(AGENT_SYSTEM_PROMPT)],
            pending_safety: None,
            dispatched: None,
            max_retry_attempts: agent.max_retry_attempts,
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }

    pub fn state(&self) -> &AutoRunState {
        &self.state
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn pending_safety(&self) -> Option<&PendingSafetyCommand> {
        self.pending_safety.as_ref()
    }

    /// The command most recently dispatched and not yet completed.
    pub fn current_dispatch(&self) -> Option<(Uuid, String)> {
        self.dispatched.clone()
    }

    /// Toggle auto-run. Disabling discards all loop state.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.state.enabled = true;
            self.events.status("🤖 auto-run enabled");
        } else {
            self.reset_turn_state();
            self.state = AutoRunState::new();
            self.phase = LoopPhase::Idle;
            self.conversation = vec![Message::system(AGENT_SYSTEM_PROMPT)];
            self.events.status("auto-run disabled");
        }
    }

    /// A new user message starts a fresh turn: counters and history reset,
    /// then the loop runs until it halts or dispatches a command.
    pub async fn user_message(&mut self, text: &str) -> Result<StepOutcome> {
        if !self.state.enabled {
            anyhow::bail!("auto-run is not enabled for session {}", self.session_id);
        }

        self.reset_turn_state();
        self.conversation.push(Message::user(text));
        self.phase = LoopPhase::Running;
        info!("Starting auto-run turn for session {}", self.session_id);
        self.run_loop().await
    }

    /// The user ran a command by hand; the loop's counters no longer
    /// describe the current situation.
    pub fn notify_manual_command(&mut self) {
        self.history.clear();
        self.state.step_count = 0;
        self.state.stuck = false;
        self.state.stuck_reason = None;
    }

    /// Drive model turns until something other than `Continue` happens.
    async fn run_loop(&mut self) -> Result<StepOutcome> {
        loop {
            let request = CompletionRequest {
                messages: self.conversation.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            self.monitor.thinking_started();
            let result =
                complete_with_retry(self.provider.as_ref(), request, self.max_retry_attempts)
                    .await;
            self.monitor.thinking_finished();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let err = LoopError::ProviderFailure(e);
                    self.events.status(format!("⚠️ {}", err));
                    // The auto-run flag stays set so the user can simply retry
                    self.phase = LoopPhase::Idle;
                    return Ok(StepOutcome::Halted(err));
                }
            };

            self.conversation
                .push(Message::assistant(response.content.clone()));

            match self.process_response(&response.content).await? {
                StepOutcome::Continue => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Decide what a model response means: halt, tools, command, completion,
    /// or a stall. Sentinels outrank tools, tools run before the command,
    /// and only the first non-empty code block is ever dispatched.
    pub async fn process_response(&mut self, text: &str) -> Result<StepOutcome> {
        let segments = self.parser.parse(text);

        if let Some(kind) = segments.iter().find_map(|s| match s {
            ResponseSegment::Sentinel(kind) => Some(*kind),
            _ => None,
        }) {
            return Ok(self.halt_for_user(kind));
        }

        let tools_ran = self.run_tool_segments(&segments).await;

        if let Some(command) = segments.iter().find_map(|s| match s {
            ResponseSegment::ShellCommand(command) => Some(command.clone()),
            _ => None,
        }) {
            if self.state.step_count >= MAX_AUTO_STEPS {
                return Ok(self.halt_for_budget());
            }

            if let Some(impact) = self.gate.check(&command).await {
                return Ok(self.halt_for_safety(command, impact));
            }

            return Ok(self.dispatch_command(command));
        }

        if contains_completion_phrase(text) {
            self.history.clear();
            self.state.step_count = 0;
            self.phase = LoopPhase::Idle;
            self.events.status("✅ task complete");
            return Ok(StepOutcome::Completed);
        }

        if tools_ran > 0 {
            // Tool outputs are already in the conversation; next turn reads them
            return Ok(StepOutcome::Continue);
        }

        // Nothing actionable: nudge the model and let it self-correct
        self.events.status(format!("⚠️ {}", LoopError::ParseFailure));
        self.conversation.push(Message::user(STALL_NOTICE));
        Ok(StepOutcome::Continue)
    }

    /// The host reports that a dispatched command finished (or was cancelled,
    /// which arrives as exit code 130 through the same path).
    pub async fn on_command_completed(
        &mut self,
        command_id: Uuid,
        exit_code: i32,
        output: &str,
    ) -> Result<StepOutcome> {
        let (_, command) = match self.dispatched.take() {
            Some((id, command)) if id == command_id => (id, command),
            Some(other) => {
                self.dispatched = Some(other);
                anyhow::bail!("completion for unknown command {}", command_id);
            }
            None => anyhow::bail!("no command in flight for session {}", self.session_id),
        };

        self.state.running_command_id = None;
        self.history
            .record(&self.matcher, &command, exit_code, output);
        self.events.emit(SessionEvent::CommandFinished {
            command_id,
            exit_code,
        });

        let window = self.history.window(STUCK_DETECTION_WINDOW);
        let verdict = StuckDetector::evaluate(&window);
        if verdict.is_stuck {
            self.state.stuck = true;
            self.state.stuck_reason = Some(verdict.reason.clone());
            self.phase = LoopPhase::Stuck;
            warn!("Session {} stuck: {}", self.session_id, verdict.reason);
            self.events.emit(SessionEvent::StuckDetected {
                reason: verdict.reason.clone(),
                suggestions: verdict.suggestions,
                failed_commands: verdict.failed_commands,
            });
            return Ok(StepOutcome::Halted(LoopError::StuckLoop {
                reason: verdict.reason,
            }));
        }

        if exit_code != 0 {
            self.events.status(format!(
                "⚠️ {}, asking the model to recover",
                LoopError::ExecutionFailure { exit_code }
            ));
        }

        let feedback = self.build_completion_feedback(&command, exit_code, output);
        self.conversation.push(Message::user(feedback));

        if !self.state.enabled {
            self.phase = LoopPhase::Idle;
            return Ok(StepOutcome::WaitingForUser);
        }

        self.run_loop().await
    }

    /// Approve the pending gated command: it dispatches exactly as flagged.
    pub async fn approve_pending_command(&mut self) -> Result<StepOutcome> {
        let pending = self
            .pending_safety
            .take()
            .ok_or_else(|| anyhow::anyhow!("no command awaiting confirmation"))?;

        self.events
            .status(format!("▶️ approved: {}", pending.command));

        if self.state.step_count >= MAX_AUTO_STEPS {
            return Ok(self.halt_for_budget());
        }

        self.phase = LoopPhase::Running;
        Ok(self.dispatch_command(pending.command))
    }

    /// Reject the pending gated command and hand control back to the user.
    pub fn reject_pending_command(&mut self) -> Result<()> {
        let pending = self
            .pending_safety
            .take()
            .ok_or_else(|| anyhow::anyhow!("no command awaiting confirmation"))?;

        self.phase = LoopPhase::WaitingForUser;
        self.events
            .status(format!("🚫 rejected: {}", pending.command));
        Ok(())
    }

    async fn run_tool_segments(&mut self, segments: &[ResponseSegment]) -> usize {
        let mut tools_ran = 0;
        for segment in segments {
            let invocation = match segment {
                ResponseSegment::ToolCall(invocation) => invocation,
                _ => continue,
            };
            tools_ran += 1;

            let verb = invocation.verb.as_str();
            match dispatch_tool(invocation, self.fs.as_ref()).await {
                Ok(output) => {
                    self.events
                        .status(format!("🔧 {} {}", verb, invocation.argument));
                    self.conversation.push(Message::user(format!(
                        "Tool output ({} {}):\n{}",
                        verb, invocation.argument, output
                    )));
                }
                Err(e) => {
                    let err = LoopError::ToolFailure {
                        verb: verb.to_string(),
                        message: e.to_string(),
                    };
                    self.events.status(format!("⚠️ {}", err));
                    self.conversation.push(Message::user(format!(
                        "Tool error ({} {}): {}",
                        verb, invocation.argument, e
                    )));
                }
            }
            self.monitor.touch();
        }
        tools_ran
    }

    fn dispatch_command(&mut self, command: String) -> StepOutcome {
        let command_id = Uuid::new_v4();
        self.state.step_count += 1;
        self.state.running_command_id = Some(command_id);
        self.dispatched = Some((command_id, command.clone()));
        self.phase = LoopPhase::Running;

        debug!(
            "Dispatching step {}/{}: {}",
            self.state.step_count, MAX_AUTO_STEPS, command
        );
        self.events.emit(SessionEvent::CommandDispatchRequest {
            command_id,
            command,
        });
        StepOutcome::Dispatched { command_id }
    }

    fn halt_for_user(&mut self, kind: SentinelKind) -> StepOutcome {
        self.phase = LoopPhase::WaitingForUser;
        self.events.status(format!(
            "⏸️ agent handed control back ({})",
            kind.token()
        ));
        StepOutcome::WaitingForUser
    }

    fn halt_for_budget(&mut self) -> StepOutcome {
        let err = LoopError::BudgetExceeded {
            limit: MAX_AUTO_STEPS,
        };
        self.events.emit(SessionEvent::BudgetExceeded {
            steps: self.state.step_count,
        });
        self.events
            .status(format!("⛔ {}. Re-enable auto-run to continue", err));
        self.state.enabled = false;
        self.phase = LoopPhase::Idle;
        StepOutcome::Halted(err)
    }

    fn halt_for_safety(&mut self, command: String, impact: String) -> StepOutcome {
        self.events.emit(SessionEvent::SafetyCheckRequired {
            command: command.clone(),
            impact: impact.clone(),
        });
        self.pending_safety = Some(PendingSafetyCommand {
            command,
            session_id: self.session_id.clone(),
            impact: impact.clone(),
        });
        self.phase = LoopPhase::WaitingForSafety;
        StepOutcome::Halted(LoopError::SafetyBlocked { impact })
    }

    fn build_completion_feedback(&self, command: &str, exit_code: i32, output: &str) -> String {
        let output = truncate_output(output, MAX_FEEDBACK_CHARS);

        if exit_code == 0 {
            return format!(
                "Command `{}` finished with exit code 0.\nOutput:\n{}",
                command, output
            );
        }

        let mut diagnosis = String::new();
        if let Some(category) = self.matcher.classify(&output) {
            diagnosis.push_str(&format!(
                " Detected error category: {}.",
                category.label()
            ));
            for (key, value) in self.matcher.extract_details(category, &output) {
                diagnosis.push_str(&format!(" {}: {}.", key, value));
            }
            for suggestion in suggestions_for_category(category) {
                diagnosis.push_str(&format!(" Consider: {}", suggestion));
            }
        }

        format!(
            "Command `{}` failed with exit code {}.\nOutput:\n{}\n\n\
             AUTO-RECOVERY PROTOCOL:\n\
             1. Diagnose the failure from the output above.{}\n\
             2. Propose exactly one corrective command in a fenced code block.\n\
             3. If recovery is not possible, reply with [NEED_HELP].",
            command, exit_code, output, diagnosis
        )
    }

    fn reset_turn_state(&mut self) {
        self.history.clear();
        self.state.step_count = 0;
        self.state.stuck = false;
        self.state.stuck_reason = None;
        self.state.running_command_id = None;
        self.pending_safety = None;
        self.dispatched = None;
    }
}
