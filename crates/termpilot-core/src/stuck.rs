//! Heuristic detection of an autonomous loop that is no longer making
//! progress.
//!
//! Three checks run in a fixed order with early return: consecutive command
//! failures, the same base command repeated, and the same error signature
//! recurring. The ordering is part of the contract: an earlier check wins
//! even when a later one would also fire.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error_patterns::ErrorCategory;
use crate::history::CommandHistoryEntry;

/// Number of recent entries the detector inspects.
pub const STUCK_DETECTION_WINDOW: usize = 5;

/// Failure count within the window that marks the loop as stuck.
pub const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Repetitions of the same base command that mark the loop as stuck.
pub const MAX_SIMILAR_COMMANDS: usize = 3;

/// Occurrences of the same error signature that mark the loop as stuck.
const MAX_RECURRING_ERRORS: usize = 3;

#[derive(Debug, Clone)]
pub struct StuckVerdict {
    pub is_stuck: bool,
    pub reason: String,
    pub suggestions: Vec<String>,
    pub failed_commands: Vec<String>,
}

impl StuckVerdict {
    fn not_stuck() -> Self {
        Self {
            is_stuck: false,
            reason: String::new(),
            suggestions: Vec::new(),
            failed_commands: Vec::new(),
        }
    }
}

pub struct StuckDetector;

impl StuckDetector {
    /// Evaluate the recent history window. Recomputed fresh on every command
    /// completion; never persisted.
    pub fn evaluate(window: &[CommandHistoryEntry]) -> StuckVerdict {
        if window.len() < 2 {
            return StuckVerdict::not_stuck();
        }

        if let Some(verdict) = Self::check_consecutive_failures(window) {
            debug!("Stuck: {}", verdict.reason);
            return verdict;
        }
        if let Some(verdict) = Self::check_similar_commands(window) {
            debug!("Stuck: {}", verdict.reason);
            return verdict;
        }
        if let Some(verdict) = Self::check_recurring_errors(window) {
            debug!("Stuck: {}", verdict.reason);
            return verdict;
        }

        StuckVerdict::not_stuck()
    }

    fn check_consecutive_failures(window: &[CommandHistoryEntry]) -> Option<StuckVerdict> {
        let failures: Vec<&CommandHistoryEntry> =
            window.iter().filter(|e| e.exit_code != 0).collect();

        if failures.len() < MAX_CONSECUTIVE_FAILURES {
            return None;
        }

        let categories: Vec<ErrorCategory> =
            failures.iter().filter_map(|e| e.error_category).collect();
        let mut suggestions = Vec::new();
        for category in &categories {
            suggestions.extend(suggestions_for_category(*category));
        }
        if suggestions.is_empty() {
            suggestions = generic_suggestions();
        }

        Some(StuckVerdict {
            is_stuck: true,
            reason: format!("{} consecutive command failures detected", failures.len()),
            suggestions: dedup_preserving_order(suggestions),
            failed_commands: failures.iter().map(|e| e.command.clone()).collect(),
        })
    }

    fn check_similar_commands(window: &[CommandHistoryEntry]) -> Option<StuckVerdict> {
        let mut groups: HashMap<&str, Vec<&CommandHistoryEntry>> = HashMap::new();
        for entry in window {
            let base = entry
                .command
                .split_whitespace()
                .next()
                .unwrap_or(entry.command.as_str());
            groups.entry(base).or_default().push(entry);
        }

        let (base, entries) = groups
            .into_iter()
            .filter(|(_, entries)| entries.len() >= MAX_SIMILAR_COMMANDS)
            .max_by_key(|(_, entries)| entries.len())?;

        Some(StuckVerdict {
            is_stuck: true,
            reason: format!(
                "command '{}' attempted {} times without progress",
                base,
                entries.len()
            ),
            suggestions: generic_suggestions(),
            failed_commands: entries
                .iter()
                .filter(|e| e.exit_code != 0)
                .map(|e| e.command.clone())
                .collect(),
        })
    }

    fn check_recurring_errors(window: &[CommandHistoryEntry]) -> Option<StuckVerdict> {
        let mut counts: HashMap<ErrorCategory, Vec<&CommandHistoryEntry>> = HashMap::new();
        for entry in window {
            if let Some(category) = entry.error_category {
                counts.entry(category).or_default().push(entry);
            }
        }

        let (category, entries) = counts
            .into_iter()
            .filter(|(_, entries)| entries.len() >= MAX_RECURRING_ERRORS)
            .max_by_key(|(_, entries)| entries.len())?;

        let mut suggestions = suggestions_for_category(category);
        if suggestions.is_empty() {
            suggestions = generic_suggestions();
        }

        Some(StuckVerdict {
            is_stuck: true,
            reason: format!(
                "the same error ({}) occurred {} times",
                category.label(),
                entries.len()
            ),
            suggestions: dedup_preserving_order(suggestions),
            failed_commands: entries.iter().map(|e| e.command.clone()).collect(),
        })
    }
}

/// Canned remediation questions per error category.
pub fn suggestions_for_category(category: ErrorCategory) -> Vec<String> {
    let suggestions: &[&str] = match category {
        ErrorCategory::PortInUse => &[
            "A process is blocking the port. Should I find and kill it?",
            "Should I try a different port?",
        ],
        ErrorCategory::PermissionDenied => &[
            "Permission was denied. Should I check file ownership?",
            "Should I retry with elevated privileges?",
        ],
        ErrorCategory::CommandNotFound => &[
            "The command is not installed. Should I install it?",
            "Should I check whether it is on PATH?",
        ],
        ErrorCategory::FileNotFound => &[
            "The file or directory does not exist. Should I create it?",
            "Should I verify the path first?",
        ],
        ErrorCategory::DependencyError => &[
            "A dependency is missing. Should I install the project dependencies?",
        ],
        ErrorCategory::GitConflict => &[
            "The merge has conflicts. Should I list the conflicted files?",
            "Should I abort the merge?",
        ],
        ErrorCategory::GenericError => &[],
    };
    suggestions.iter().map(|s| s.to_string()).collect()
}

/// Generic probing questions used when no category-specific suggestion applies.
fn generic_suggestions() -> Vec<String> {
    vec![
        "Should I try a different approach?".to_string(),
        "Should I check the prerequisites first?".to_string(),
        "Should I verify the environment setup?".to_string(),
    ]
}

fn dedup_preserving_order(suggestions: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_patterns::ErrorPatternMatcher;
    use crate::history::CommandHistoryTracker;

    fn window_from(commands: &[(&str, i32, &str)]) -> Vec<CommandHistoryEntry> {
        let matcher = ErrorPatternMatcher::new().unwrap();
        let mut tracker = CommandHistoryTracker::new();
        for (command, exit_code, output) in commands {
            tracker.record(&matcher, command, *exit_code, output);
        }
        tracker.window(STUCK_DETECTION_WINDOW)
    }

    #[test]
    fn test_not_stuck_with_fewer_than_two_entries() {
        let window = window_from(&[("ls", 1, "error")]);
        assert!(!StuckDetector::evaluate(&window).is_stuck);
    }

    #[test]
    fn test_three_failures_in_window_is_stuck() {
        let window = window_from(&[
            ("cargo build", 101, "error: expected one of"),
            ("cargo build", 101, "error: expected one of"),
            ("cargo test", 101, "error: expected one of"),
            ("ls", 0, ""),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        assert!(verdict.is_stuck);
        assert!(verdict.reason.contains("3 consecutive command failures"));
        assert_eq!(verdict.failed_commands.len(), 3);
    }

    #[test]
    fn test_failure_check_outranks_recurring_error_check() {
        // Both the failure-count check and the recurring-error check would
        // fire here; the failure check must win.
        let window = window_from(&[
            ("npm start", 1, "EADDRINUSE"),
            ("npm start", 1, "EADDRINUSE"),
            ("npm start", 1, "EADDRINUSE"),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        assert!(verdict.is_stuck);
        assert!(verdict.reason.contains("consecutive command failures"));
    }

    #[test]
    fn test_mixed_history_with_three_failures_is_stuck() {
        let window = window_from(&[
            ("ls", 0, ""),
            ("foo", 127, "bash: foo: command not found"),
            ("foo", 127, "bash: foo: command not found"),
            ("foo", 127, "bash: foo: command not found"),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        assert!(verdict.is_stuck);
        assert!(verdict.failed_commands.iter().all(|c| c == "foo"));
        assert!(!verdict.suggestions.is_empty());
    }

    #[test]
    fn test_similar_commands_without_failures_is_stuck() {
        // Only one failure, so the failure check stays quiet, but the same
        // base command was tried three times.
        let window = window_from(&[
            ("npm install", 1, "npm ERR! could not resolve"),
            ("npm test", 0, ""),
            ("npm run build", 0, ""),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        assert!(verdict.is_stuck);
        assert!(verdict.reason.contains("npm"));
        assert_eq!(verdict.suggestions.len(), 3);
    }

    #[test]
    fn test_two_matching_errors_are_not_enough() {
        // Two failures sharing a category, no base command repeated three
        // times: none of the checks fire.
        let window = window_from(&[
            ("curl localhost:3000", 7, "EADDRINUSE"),
            ("lsof -i :3000", 0, ""),
            ("nc -z localhost 3000", 1, "EADDRINUSE"),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        assert!(!verdict.is_stuck);
    }

    #[test]
    fn test_port_suggestions_mention_the_port_conflict() {
        let window = window_from(&[
            ("npm start", 1, "EADDRINUSE"),
            ("node server.js", 1, "EADDRINUSE"),
            ("yarn dev", 1, "EADDRINUSE"),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        assert!(verdict
            .suggestions
            .iter()
            .any(|s| s.contains("blocking the port")));
    }

    #[test]
    fn test_suggestions_are_deduplicated() {
        let window = window_from(&[
            ("npm start", 1, "EADDRINUSE"),
            ("npm start", 1, "EADDRINUSE"),
            ("npm start", 1, "EADDRINUSE"),
            ("npm start", 1, "EADDRINUSE"),
        ]);
        let verdict = StuckDetector::evaluate(&window);
        let mut sorted = verdict.suggestions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), verdict.suggestions.len());
    }

    #[test]
    fn test_healthy_history_is_not_stuck() {
        let window = window_from(&[
            ("ls", 0, ""),
            ("cat README.md", 0, "hello"),
            ("echo done", 0, "done"),
        ]);
        assert!(!StuckDetector::evaluate(&window).is_stuck);
    }
}
