//! Per-session bundle: controller, watchdog, executor wiring.
//!
//! Sessions are isolated by construction: each `SessionController` owns its
//! own state, event channel, and watchdog task, so concurrent sessions need
//! no coordination. The bundle also plays the host role: it services the
//! controller's dispatch intents with the shell executor and feeds
//! completions back, which is what the terminal front end does in production.

use anyhow::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use termpilot_config::Config;
use termpilot_execution::{OutputReceiver, ShellExecutor};
use termpilot_providers::LLMProvider;

use crate::auto_run::{AutoRunController, StepOutcome};
use crate::events::{EventSender, SessionEvent};
use crate::safety::ImpactClassifier;
use crate::tools::FileSystem;
use crate::watchdog::{ActivityMonitor, Watchdog};

/// Generate a session ID from the first words of the opening request plus a
/// hash for uniqueness.
pub fn generate_session_id(description: &str) -> String {
    let prefix = description
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .take(5)
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();

    let mut hasher = DefaultHasher::new();
    description.hash(&mut hasher);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    timestamp.hash(&mut hasher);
    let hash = hasher.finish();

    if prefix.is_empty() {
        format!("session_{:x}", hash)
    } else {
        format!("{}_{:x}", prefix, hash)
    }
}

/// Streams command output into the activity monitor so the watchdog sees
/// every line as liveness.
struct MonitorReceiver {
    monitor: ActivityMonitor,
}

impl OutputReceiver for MonitorReceiver {
    fn on_output_line(&self, _line: &str) {
        self.monitor.touch();
    }
}

pub struct SessionController {
    id: String,
    controller: AutoRunController,
    monitor: ActivityMonitor,
    events: EventSender,
    executor: ShellExecutor,
    config: Config,
    watchdog_shutdown: CancellationToken,
    watchdog: JoinHandle<()>,
}

impl SessionController {
    /// Build a session and return it with the receiving end of its event
    /// stream. The watchdog starts immediately.
    pub fn new(
        description: &str,
        provider: Arc<dyn LLMProvider>,
        fs: Arc<dyn FileSystem>,
        classifier: Arc<dyn ImpactClassifier>,
        config: Config,
    ) -> Result<(Self, UnboundedReceiver<SessionEvent>)> {
        let id = generate_session_id(description);
        let (events, events_rx) = EventSender::channel();
        let monitor = ActivityMonitor::new();

        let controller = AutoRunController::new(
            id.clone(),
            provider,
            fs,
            classifier,
            events.clone(),
            monitor.clone(),
            &config.agent,
        )?;

        let watchdog_shutdown = CancellationToken::new();
        let watchdog = Watchdog::spawn(
            monitor.clone(),
            events.clone(),
            watchdog_shutdown.clone(),
        );

        let executor = ShellExecutor::with_shell(&config.terminal.shell);
        info!("Session {} created", id);

        Ok((
            Self {
                id,
                controller,
                monitor,
                events,
                executor,
                config,
                watchdog_shutdown,
                watchdog,
            },
            events_rx,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn controller(&self) -> &AutoRunController {
        &self.controller
    }

    pub fn set_auto_run(&mut self, enabled: bool) {
        self.controller.set_enabled(enabled);
    }

    /// The user ran a command by hand in the terminal.
    pub fn notify_manual_command(&mut self) {
        self.controller.notify_manual_command();
    }

    /// Feed a user message into the loop and keep servicing command
    /// dispatches until the loop halts.
    pub async fn handle_user_message(&mut self, text: &str) -> Result<StepOutcome> {
        let outcome = self.controller.user_message(text).await?;
        self.service_dispatches(outcome).await
    }

    /// Approve the gated command and keep driving the loop.
    pub async fn approve_pending_command(&mut self) -> Result<StepOutcome> {
        let outcome = self.controller.approve_pending_command().await?;
        self.service_dispatches(outcome).await
    }

    pub fn reject_pending_command(&mut self) -> Result<()> {
        self.controller.reject_pending_command()
    }

    /// Cancel whatever command is currently running (user action). The
    /// executor reports exit 130 and the completion flows the normal path.
    pub fn cancel_running_command(&self) -> bool {
        let cancelled = self.monitor.cancel_running_command();
        if cancelled {
            self.events.status("🛑 command cancelled");
        }
        cancelled
    }

    /// Execute dispatched commands until the controller stops dispatching.
    async fn service_dispatches(&mut self, mut outcome: StepOutcome) -> Result<StepOutcome> {
        while let StepOutcome::Dispatched { .. } = outcome {
            let (command_id, command) = match self.controller.current_dispatch() {
                Some(dispatch) => dispatch,
                None => anyhow::bail!("dispatch outcome without a dispatched command"),
            };

            outcome = self.execute_and_report(command_id, &command).await?;
        }
        Ok(outcome)
    }

    async fn execute_and_report(
        &mut self,
        command_id: Uuid,
        command: &str,
    ) -> Result<StepOutcome> {
        let cancel = self.monitor.command_started(command_id);
        self.events.emit(SessionEvent::CommandStarted {
            command_id,
            command: command.to_string(),
        });

        let receiver = MonitorReceiver {
            monitor: self.monitor.clone(),
        };
        let timeout = Duration::from_secs(self.config.agent.command_timeout_seconds);
        let result = self
            .executor
            .execute(
                command,
                self.config.terminal.working_dir.as_deref(),
                timeout,
                &cancel,
                &receiver,
            )
            .await;
        self.monitor.command_finished();

        match result {
            Ok(res) => {
                debug!(
                    "Command {} finished with exit code {}",
                    command_id, res.exit_code
                );
                self.controller
                    .on_command_completed(command_id, res.exit_code, &res.combined_output())
                    .await
            }
            Err(e) => {
                // Spawn-level failure: surface it like a failed command
                self.controller
                    .on_command_completed(command_id, -1, &format!("execution error: {}", e))
                    .await
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.watchdog_shutdown.cancel();
        self.watchdog.abort();
    }
}
