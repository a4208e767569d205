//! Mock LLM Provider for Testing
//!
//! A configurable provider that replays scripted turns so integration tests
//! can exercise the full agent loop without a network-hosted model.
//!
//! # Example
//!
//! ```rust,ignore
//! use termpilot_providers::{MockProvider, MockTurn};
//!
//! let provider = MockProvider::new()
//!     .with_text("Let me check the directory.\n```bash\nls\n```")
//!     .with_text("task complete");
//!
//! // Simulate a provider outage on the second call
//! let flaky = MockProvider::new()
//!     .with_text("```bash\nls\n```")
//!     .with_turn(MockTurn::error("HTTP 503 Service Unavailable"));
//! ```

use crate::{CompletionRequest, CompletionResponse, LLMProvider, Usage};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A single scripted turn: either a completion or an injected failure.
#[derive(Debug, Clone)]
pub enum MockTurn {
    Text(String),
    Error(String),
}

impl MockTurn {
    pub fn text(content: &str) -> Self {
        Self::Text(content.to_string())
    }

    pub fn error(message: &str) -> Self {
        Self::Error(message.to_string())
    }
}

/// Scripted LLM provider. Turns are consumed in order; running past the end
/// of the script is an error so tests fail loudly instead of looping forever.
pub struct MockProvider {
    turns: Mutex<VecDeque<MockTurn>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text completion.
    pub fn with_text(self, content: &str) -> Self {
        self.with_turn(MockTurn::text(content))
    }

    /// Queue an arbitrary turn.
    pub fn with_turn(self, turn: MockTurn) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    /// Number of scripted turns not yet consumed.
    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap().len()
    }

    /// Requests received so far, in order.
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of completion calls made against this provider.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);

        let turn = self.turns.lock().unwrap().pop_front();
        match turn {
            Some(MockTurn::Text(content)) => Ok(CompletionResponse {
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: content.len() as u32 / 4,
                    total_tokens: 100 + content.len() as u32 / 4,
                },
                model: self.model().to_string(),
                content,
            }),
            Some(MockTurn::Error(message)) => Err(anyhow::anyhow!("{}", message)),
            None => Err(anyhow::anyhow!(
                "mock provider script exhausted after {} calls",
                self.call_count()
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[tokio::test]
    async fn test_turns_consumed_in_order() {
        let provider = MockProvider::new().with_text("first").with_text("second");

        let request = CompletionRequest::new(vec![Message::user("go")]);
        let first = provider.complete(request.clone()).await.unwrap();
        let second = provider.complete(request).await.unwrap();

        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
        assert_eq!(provider.remaining_turns(), 0);
    }

    #[tokio::test]
    async fn test_error_turn_surfaces_as_error() {
        let provider = MockProvider::new().with_turn(MockTurn::error("HTTP 503"));

        let result = provider
            .complete(CompletionRequest::new(vec![Message::user("go")]))
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_exhausted_script_is_an_error() {
        let provider = MockProvider::new();
        let result = provider
            .complete(CompletionRequest::new(vec![Message::user("go")]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let provider = MockProvider::new().with_text("ok");
        provider
            .complete(CompletionRequest::new(vec![Message::user("hello")]))
            .await
            .unwrap();

        let recorded = provider.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].messages[0].content, "hello");
    }
}
