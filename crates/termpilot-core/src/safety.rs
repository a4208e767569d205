//! Gate between proposed commands and execution.
//!
//! Impact classification itself lives outside this crate; the gate only
//! delegates and enforces the suspend-until-decision contract. A command the
//! classifier flags is never auto-dispatched.

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// External judgment of how destructive a proposed command is.
#[async_trait::async_trait]
pub trait ImpactClassifier: Send + Sync {
    /// Returns a human-readable impact description for commands that need
    /// explicit confirmation, or `None` for commands safe to auto-run.
    async fn classify(&self, command: &str) -> Result<Option<String>>;
}

/// Classifier that never flags anything, for hosts running without one.
pub struct AllowAllClassifier;

#[async_trait::async_trait]
impl ImpactClassifier for AllowAllClassifier {
    async fn classify(&self, _command: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A flagged command awaiting an explicit user decision. While one exists,
/// the auto-run loop for its session is suspended.
#[derive(Debug, Clone)]
pub struct PendingSafetyCommand {
    pub command: String,
    pub session_id: String,
    pub impact: String,
}

pub struct SafetyGate {
    classifier: Arc<dyn ImpactClassifier>,
}

impl SafetyGate {
    pub fn new(classifier: Arc<dyn ImpactClassifier>) -> Self {
        Self { classifier }
    }

    /// Check a proposed command. `Some(impact)` means the loop must suspend
    /// and wait for confirmation. A classifier error is treated as a flag;
    /// an unclassifiable command is not auto-dispatched.
    pub async fn check(&self, command: &str) -> Option<String> {
        match self.classifier.classify(command).await {
            Ok(impact) => impact,
            Err(e) => {
                warn!("Impact classifier failed for '{}': {}", command, e);
                Some(format!("impact classification unavailable: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KeywordClassifier;

    #[async_trait::async_trait]
    impl ImpactClassifier for KeywordClassifier {
        async fn classify(&self, command: &str) -> Result<Option<String>> {
            if command.contains("rm -rf") {
                Ok(Some("deletes files recursively".to_string()))
            } else {
                Ok(None)
            }
        }
    }

    struct BrokenClassifier;

    #[async_trait::async_trait]
    impl ImpactClassifier for BrokenClassifier {
        async fn classify(&self, _command: &str) -> Result<Option<String>> {
            anyhow::bail!("classifier backend unreachable")
        }
    }

    #[tokio::test]
    async fn test_safe_command_passes() {
        let gate = SafetyGate::new(Arc::new(KeywordClassifier));
        assert!(gate.check("ls -la").await.is_none());
    }

    #[tokio::test]
    async fn test_flagged_command_returns_impact() {
        let gate = SafetyGate::new(Arc::new(KeywordClassifier));
        let impact = gate.check("rm -rf /tmp/build").await;
        assert_eq!(impact.as_deref(), Some("deletes files recursively"));
    }

    #[tokio::test]
    async fn test_classifier_failure_blocks_the_command() {
        let gate = SafetyGate::new(Arc::new(BrokenClassifier));
        assert!(gate.check("ls").await.is_some());
    }

    #[tokio::test]
    async fn test_allow_all_classifier_never_flags() {
        let gate = SafetyGate::new(Arc::new(AllowAllClassifier));
        assert!(gate.check("rm -rf /").await.is_none());
    }
}
