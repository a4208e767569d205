//! Repeated failures must halt the loop until the user steps in.

use std::sync::Arc;

use termpilot_config::AgentConfig;
use termpilot_core::auto_run::{AutoRunController, LoopPhase, StepOutcome};
use termpilot_core::error::LoopError;
use termpilot_core::events::{EventSender, SessionEvent};
use termpilot_core::safety::AllowAllClassifier;
use termpilot_core::tools::LocalFileSystem;
use termpilot_core::watchdog::ActivityMonitor;
use termpilot_providers::MockProvider;
use tokio::sync::mpsc::UnboundedReceiver;

fn controller_with(
    provider: Arc<MockProvider>,
) -> (AutoRunController, UnboundedReceiver<SessionEvent>) {
    let (events, rx) = EventSender::channel();
    let controller = AutoRunController::new(
        "stuck-session".to_string(),
        provider,
        Arc::new(LocalFileSystem),
        Arc::new(AllowAllClassifier),
        events,
        ActivityMonitor::new(),
        &AgentConfig::default(),
    )
    .unwrap();
    (controller, rx)
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn three_failures_halt_the_loop() {
    // Distinct base commands so only the failure count can trip the detector
    let provider = Arc::new(
        MockProvider::new()
            .with_text("```bash\nnpm install\n```")
            .with_text("```bash\nyarn install\n```")
            .with_text("```bash\npnpm install\n```"),
    );
    let (mut controller, mut rx) = controller_with(provider.clone());
    controller.set_enabled(true);

    let mut outcome = controller.user_message("install dependencies").await.unwrap();
    let error_output = "npm ERR! could not resolve dependency tree";
    let mut completions = 0;
    while let StepOutcome::Dispatched { command_id } = outcome {
        completions += 1;
        outcome = controller
            .on_command_completed(command_id, 1, error_output)
            .await
            .unwrap();
    }

    assert_eq!(completions, 3);
    assert!(matches!(
        outcome,
        StepOutcome::Halted(LoopError::StuckLoop { .. })
    ));
    assert_eq!(controller.phase(), LoopPhase::Stuck);
    assert!(controller.state().stuck);
    assert!(controller
        .state()
        .stuck_reason
        .as_deref()
        .unwrap()
        .contains("3 consecutive command failures"));

    // Once stuck, the model is not consulted again
    assert_eq!(provider.call_count(), 3);

    let events = drain(&mut rx);
    let verdict = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::StuckDetected {
                reason,
                suggestions,
                failed_commands,
            } => Some((reason, suggestions, failed_commands)),
            _ => None,
        })
        .expect("stuck event");
    assert!(verdict.0.contains("consecutive command failures"));
    assert!(!verdict.1.is_empty());
    assert_eq!(verdict.2.len(), 3);
}

#[tokio::test]
async fn a_new_user_message_clears_the_stuck_state() {
    let provider = Arc::new(
        MockProvider::new()
            .with_text("```bash\nnpm install\n```")
            .with_text("```bash\nyarn install\n```")
            .with_text("```bash\npnpm install\n```")
            .with_text("task complete"),
    );
    let (mut controller, _rx) = controller_with(provider);
    controller.set_enabled(true);

    let mut outcome = controller.user_message("install dependencies").await.unwrap();
    while let StepOutcome::Dispatched { command_id } = outcome {
        outcome = controller
            .on_command_completed(command_id, 1, "npm ERR! could not resolve")
            .await
            .unwrap();
    }
    assert_eq!(controller.phase(), LoopPhase::Stuck);

    let outcome = controller
        .user_message("never mind, we are done")
        .await
        .unwrap();
    assert!(matches!(outcome, StepOutcome::Completed));
    assert!(!controller.state().stuck);
    assert!(controller.state().stuck_reason.is_none());
}

#[tokio::test]
async fn repeating_the_same_base_command_is_stuck_without_failures() {
    // Three git invocations, only one of them failing: the similar-command
    // check fires even though the failure count stays below its threshold
    let provider = Arc::new(
        MockProvider::new()
            .with_text("```bash\ngit fetch origin\n```")
            .with_text("```bash\ngit rebase origin/main\n```")
            .with_text("```bash\ngit status\n```"),
    );
    let (mut controller, mut rx) = controller_with(provider);
    controller.set_enabled(true);

    let mut outcome = controller.user_message("update the branch").await.unwrap();
    let mut step = 0;
    while let StepOutcome::Dispatched { command_id } = outcome {
        step += 1;
        let (exit_code, output) = if step == 2 {
            (1, "CONFLICT (content): Merge conflict in src/lib.rs")
        } else {
            (0, "")
        };
        outcome = controller
            .on_command_completed(command_id, exit_code, output)
            .await
            .unwrap();
    }

    assert!(matches!(
        outcome,
        StepOutcome::Halted(LoopError::StuckLoop { .. })
    ));
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::StuckDetected { reason, .. } if reason.contains("git")
    )));
}
