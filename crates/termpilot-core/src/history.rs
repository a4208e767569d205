//! Bounded per-session history of agent-dispatched commands.

use std::collections::VecDeque;
use std::time::Instant;

use crate::error_patterns::{ErrorCategory, ErrorPatternMatcher};

/// Maximum number of entries kept per session; oldest are evicted first.
pub const HISTORY_CAP: usize = 10;

#[derive(Debug, Clone)]
pub struct CommandHistoryEntry {
    pub command: String,
    pub exit_code: i32,
    pub timestamp: Instant,
    pub error_category: Option<ErrorCategory>,
}

/// Bounded ring of recent command completions. Appended only by the
/// controller after a command finishes.
pub struct CommandHistoryTracker {
    entries: VecDeque<CommandHistoryEntry>,
}

impl CommandHistoryTracker {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    /// Record a finished command. Output is classified only for failures.
    pub fn record(
        &mut self,
        matcher: &ErrorPatternMatcher,
        command: &str,
        exit_code: i32,
        output: &str,
    ) {
        let error_category = if exit_code != 0 {
            matcher.classify(output)
        } else {
            None
        };

        if self.entries.len() == HISTORY_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(CommandHistoryEntry {
            command: command.to_string(),
            exit_code,
            timestamp: Instant::now(),
            error_category,
        });
    }

    /// The most recent `n` entries in chronological order (oldest first).
    pub fn window(&self, n: usize) -> Vec<CommandHistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CommandHistoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> ErrorPatternMatcher {
        ErrorPatternMatcher::new().unwrap()
    }

    #[test]
    fn test_window_is_chronological_oldest_first() {
        let m = matcher();
        let mut tracker = CommandHistoryTracker::new();
        tracker.record(&m, "first", 0, "");
        tracker.record(&m, "second", 0, "");
        tracker.record(&m, "third", 0, "");

        let window = tracker.window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].command, "second");
        assert_eq!(window[1].command, "third");
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let m = matcher();
        let mut tracker = CommandHistoryTracker::new();
        for i in 0..15 {
            tracker.record(&m, &format!("cmd-{}", i), 0, "");
        }

        assert_eq!(tracker.len(), HISTORY_CAP);
        let window = tracker.window(HISTORY_CAP);
        assert_eq!(window[0].command, "cmd-5");
        assert_eq!(window[HISTORY_CAP - 1].command, "cmd-14");
    }

    #[test]
    fn test_successful_commands_are_not_classified() {
        let m = matcher();
        let mut tracker = CommandHistoryTracker::new();
        // Output looks like an error, but exit code 0 means no classification
        tracker.record(&m, "grep error log.txt", 0, "error: something");

        assert_eq!(tracker.window(1)[0].error_category, None);
    }

    #[test]
    fn test_failed_commands_are_classified() {
        let m = matcher();
        let mut tracker = CommandHistoryTracker::new();
        tracker.record(&m, "npm test", 127, "bash: npm: command not found");

        assert_eq!(
            tracker.window(1)[0].error_category,
            Some(ErrorCategory::CommandNotFound)
        );
    }

    #[test]
    fn test_clear_resets_the_window() {
        let m = matcher();
        let mut tracker = CommandHistoryTracker::new();
        tracker.record(&m, "ls", 0, "");
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
