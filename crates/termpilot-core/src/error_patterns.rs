//! Classification of failed command output into known error categories.
//!
//! Categories are tried in descending priority order; within a category an
//! ordered list of regexes is tested and the first category with any match
//! wins. Classification is pure and deterministic; the stuck detector relies
//! on identical output always producing the identical category.

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;

/// A known failure category, in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    PortInUse,
    PermissionDenied,
    CommandNotFound,
    FileNotFound,
    DependencyError,
    GitConflict,
    GenericError,
}

impl ErrorCategory {
    /// All categories in descending priority order.
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::PortInUse,
        ErrorCategory::PermissionDenied,
        ErrorCategory::CommandNotFound,
        ErrorCategory::FileNotFound,
        ErrorCategory::DependencyError,
        ErrorCategory::GitConflict,
        ErrorCategory::GenericError,
    ];

    pub fn priority(self) -> u8 {
        match self {
            ErrorCategory::PortInUse => 100,
            ErrorCategory::PermissionDenied => 90,
            ErrorCategory::CommandNotFound => 85,
            ErrorCategory::FileNotFound => 80,
            ErrorCategory::DependencyError => 75,
            ErrorCategory::GitConflict => 70,
            ErrorCategory::GenericError => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorCategory::PortInUse => "port_in_use",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::CommandNotFound => "command_not_found",
            ErrorCategory::FileNotFound => "file_not_found",
            ErrorCategory::DependencyError => "dependency_error",
            ErrorCategory::GitConflict => "git_conflict",
            ErrorCategory::GenericError => "generic_error",
        }
    }

    fn patterns(self) -> &'static [&'static str] {
        match self {
            ErrorCategory::PortInUse => &[
                r"EADDRINUSE",
                r"(?i)address already in use",
                r"(?i)port \d+ is (?:already )?in use",
                r"(?i)bind.*address.*in use",
            ],
            ErrorCategory::PermissionDenied => &[
                r"(?i)permission denied",
                r"EACCES",
                r"(?i)operation not permitted",
            ],
            ErrorCategory::CommandNotFound => &[
                r"(?i)command not found",
                r"(?i)not recognized as an internal or external command",
                r"(?i)no such command",
            ],
            ErrorCategory::FileNotFound => &[
                r"(?i)no such file or directory",
                r"ENOENT",
                r"(?i)cannot find the (?:file|path)",
            ],
            ErrorCategory::DependencyError => &[
                r"(?i)cannot find module",
                r"ModuleNotFoundError",
                r"(?i)npm ERR!.*(?:missing|could not resolve)",
                r"(?i)unresolved import",
                r"(?i)package .* not found",
            ],
            ErrorCategory::GitConflict => &[
                r"CONFLICT \(content\)",
                r"(?i)automatic merge failed",
                r"(?i)needs merge",
                r"(?i)fix conflicts and then commit",
            ],
            ErrorCategory::GenericError => &[r"(?i)\berror\b", r"(?i)\bfailed\b", r"(?i)\bfatal\b"],
        }
    }
}

/// Pattern used to pull a port number out of port-conflict output.
const PORT_EXTRACT_PATTERN: &str = r"(?:port[:\s]?|:)(\d{2,5})";

struct CategoryRule {
    category: ErrorCategory,
    regexes: Vec<Regex>,
}

/// Compiled classification table. Build once per session.
pub struct ErrorPatternMatcher {
    rules: Vec<CategoryRule>,
    port_extract: Regex,
}

impl ErrorPatternMatcher {
    pub fn new() -> Result<Self> {
        let mut rules = Vec::with_capacity(ErrorCategory::ALL.len());
        for category in ErrorCategory::ALL {
            let mut regexes = Vec::new();
            for pattern in category.patterns() {
                regexes.push(Regex::new(pattern)?);
            }
            rules.push(CategoryRule { category, regexes });
        }

        Ok(Self {
            rules,
            port_extract: Regex::new(PORT_EXTRACT_PATTERN)?,
        })
    }

    /// Classify raw command output. Returns the highest-priority matching
    /// category, or `None` when no pattern matches.
    pub fn classify(&self, output: &str) -> Option<ErrorCategory> {
        for rule in &self.rules {
            if rule.regexes.iter().any(|re| re.is_match(output)) {
                return Some(rule.category);
            }
        }
        None
    }

    /// Extract structured fields for a classified failure (e.g. the blocked
    /// port for `PortInUse`). Missing fields default to "unknown".
    pub fn extract_details(
        &self,
        category: ErrorCategory,
        output: &str,
    ) -> HashMap<String, String> {
        let mut details = HashMap::new();

        if category == ErrorCategory::PortInUse {
            let port = self
                .port_extract
                .captures(output)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            details.insert("port".to_string(), port);
        }

        details
    }
}
