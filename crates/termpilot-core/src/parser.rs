//! Tokenizer for model responses.
//!
//! A response is broken into an ordered list of tagged segments: sentinels,
//! bracketed tool invocations, fenced shell commands, and plain text. The
//! controller consumes them in a fixed priority order. A `WRITE_FILE`
//! invocation claims the fenced block immediately following it as its content
//! so that block is never mistaken for a shell command.

use anyhow::Result;
use regex::Regex;

/// Explicit halt markers the model can emit to hand control back to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelKind {
    Wait,
    AskUser,
    NeedHelp,
}

impl SentinelKind {
    pub fn token(self) -> &'static str {
        match self {
            SentinelKind::Wait => "[WAIT]",
            SentinelKind::AskUser => "[ASK_USER]",
            SentinelKind::NeedHelp => "[NEED_HELP]",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "WAIT" => Some(SentinelKind::Wait),
            "ASK_USER" => Some(SentinelKind::AskUser),
            "NEED_HELP" => Some(SentinelKind::NeedHelp),
            _ => None,
        }
    }
}

/// File-system verbs the model can invoke without going through the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolVerb {
    ReadFile,
    WriteFile,
    ListFiles,
    Mkdir,
}

impl ToolVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolVerb::ReadFile => "READ_FILE",
            ToolVerb::WriteFile => "WRITE_FILE",
            ToolVerb::ListFiles => "LIST_FILES",
            ToolVerb::Mkdir => "MKDIR",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "READ_FILE" => Some(ToolVerb::ReadFile),
            "WRITE_FILE" => Some(ToolVerb::WriteFile),
            "LIST_FILES" => Some(ToolVerb::ListFiles),
            "MKDIR" => Some(ToolVerb::Mkdir),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub verb: ToolVerb,
    pub argument: String,
    /// Fenced block immediately following a WRITE_FILE invocation.
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSegment {
    Sentinel(SentinelKind),
    ToolCall(ToolInvocation),
    ShellCommand(String),
    PlainText(String),
}

/// Phrase that marks the task as finished when no command is present.
const COMPLETION_PHRASE: &str = "task complete";

pub fn contains_completion_phrase(text: &str) -> bool {
    text.to_lowercase().contains(COMPLETION_PHRASE)
}

pub struct ResponseParser {
    marker_re: Regex,
    fence_re: Regex,
}

#[derive(Debug)]
enum RawMarker {
    Sentinel(SentinelKind),
    Tool { verb: ToolVerb, argument: String },
    Fence { content: String },
}

impl ResponseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            marker_re: Regex::new(
                r"\[(WAIT|ASK_USER|NEED_HELP)\]|\[(READ_FILE|WRITE_FILE|LIST_FILES|MKDIR):\s*([^\]]+)\]",
            )?,
            fence_re: Regex::new(r"(?s)```(\w+)?\n(.*?)```")?,
        })
    }

    /// Tokenize a response into ordered segments.
    pub fn parse(&self, text: &str) -> Vec<ResponseSegment> {
        // Collect all markers with their byte spans, in order of occurrence
        let mut markers: Vec<(usize, usize, RawMarker)> = Vec::new();

        for cap in self.fence_re.captures_iter(text) {
            let whole = cap.get(0).map(|m| (m.start(), m.end()));
            let content = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            if let Some((start, end)) = whole {
                markers.push((
                    start,
                    end,
                    RawMarker::Fence {
                        content: content.to_string(),
                    },
                ));
            }
        }

        for cap in self.marker_re.captures_iter(text) {
            let whole = match cap.get(0) {
                Some(m) => m,
                None => continue,
            };
            // Bracket tokens inside a fenced block belong to that block
            if markers
                .iter()
                .any(|(s, e, m)| matches!(m, RawMarker::Fence { .. }) && whole.start() >= *s && whole.end() <= *e)
            {
                continue;
            }

            if let Some(name) = cap.get(1) {
                if let Some(kind) = SentinelKind::from_name(name.as_str()) {
                    markers.push((whole.start(), whole.end(), RawMarker::Sentinel(kind)));
                }
            } else if let (Some(verb), Some(arg)) = (cap.get(2), cap.get(3)) {
                if let Some(verb) = ToolVerb::from_name(verb.as_str()) {
                    markers.push((
                        whole.start(),
                        whole.end(),
                        RawMarker::Tool {
                            verb,
                            argument: arg.as_str().trim().to_string(),
                        },
                    ));
                }
            }
        }

        markers.sort_by_key(|(start, _, _)| *start);

        // Attach each WRITE_FILE's content block: the fence that follows it
        // with nothing but whitespace in between
        let mut consumed_fences: Vec<usize> = Vec::new();
        let mut segments: Vec<ResponseSegment> = Vec::new();
        let mut cursor = 0usize;

        for i in 0..markers.len() {
            let (start, end) = (markers[i].0, markers[i].1);
            if consumed_fences.contains(&i) {
                cursor = cursor.max(end);
                continue;
            }

            push_plain_text(&mut segments, &text[cursor..start]);
            cursor = end;

            match &markers[i].2 {
                RawMarker::Sentinel(kind) => segments.push(ResponseSegment::Sentinel(*kind)),
                RawMarker::Fence { content } => {
                    if !content.is_empty() {
                        segments.push(ResponseSegment::ShellCommand(content.clone()));
                    }
                }
                RawMarker::Tool { verb, argument } => {
                    let mut content = None;
                    if *verb == ToolVerb::WriteFile {
                        if let Some((j, fence_content, fence_end)) =
                            next_adjacent_fence(&markers, i, text)
                        {
                            consumed_fences.push(j);
                            content = Some(fence_content);
                            cursor = cursor.max(fence_end);
                        }
                    }
                    segments.push(ResponseSegment::ToolCall(ToolInvocation {
                        verb: *verb,
                        argument: argument.clone(),
                        content,
                    }));
                }
            }
        }

        push_plain_text(&mut segments, &text[cursor..]);
        segments
    }
}

/// Find the fence marker directly after marker `i` (only whitespace between).
fn next_adjacent_fence(
    markers: &[(usize, usize, RawMarker)],
    i: usize,
    text: &str,
) -> Option<(usize, String, usize)> {
    let end = markers[i].1;
    if let Some((j, (start, fence_end, marker))) = markers.iter().enumerate().nth(i + 1) {
        if let RawMarker::Fence { content } = marker {
            if text[end..*start].chars().all(char::is_whitespace) {
                return Some((j, content.clone(), *fence_end));
            }
        }
        // Anything else directly after the invocation breaks adjacency
    }
    None
}

fn push_plain_text(segments: &mut Vec<ResponseSegment>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        segments.push(ResponseSegment::PlainText(trimmed.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ResponseSegment> {
        ResponseParser::new().unwrap().parse(text)
    }

    #[test]
    fn test_plain_text_only() {
        let segments = parse("Let me look at the project first.");
        assert_eq!(segments.len(), 1);
        assert!(matches!(segments[0], ResponseSegment::PlainText(_)));
    }

    #[test]
    fn test_wait_sentinel() {
        let segments = parse("[WAIT] need clarification");
        assert_eq!(segments[0], ResponseSegment::Sentinel(SentinelKind::Wait));
        assert_eq!(
            segments[1],
            ResponseSegment::PlainText("need clarification".to_string())
        );
    }

    #[test]
    fn test_shell_command_from_fenced_block() {
        let segments = parse("Run this:\n```bash\nls -la\n```\ndone");
        assert!(segments
            .iter()
            .any(|s| *s == ResponseSegment::ShellCommand("ls -la".to_string())));
    }

    #[test]
    fn test_fenced_block_without_language_tag() {
        let segments = parse("```\necho hi\n```");
        assert_eq!(
            segments,
            vec![ResponseSegment::ShellCommand("echo hi".to_string())]
        );
    }

    #[test]
    fn test_empty_fenced_block_is_skipped() {
        let segments = parse("```bash\n\n```");
        assert!(segments.is_empty());
    }

    #[test]
    fn test_tool_invocations_in_order() {
        let segments = parse("[READ_FILE: src/main.rs]\n[LIST_FILES: src]");
        let verbs: Vec<ToolVerb> = segments
            .iter()
            .filter_map(|s| match s {
                ResponseSegment::ToolCall(t) => Some(t.verb),
                _ => None,
            })
            .collect();
        assert_eq!(verbs, vec![ToolVerb::ReadFile, ToolVerb::ListFiles]);
    }

    #[test]
    fn test_tool_argument_is_trimmed() {
        let segments = parse("[READ_FILE:   notes.txt  ]");
        match &segments[0] {
            ResponseSegment::ToolCall(t) => assert_eq!(t.argument, "notes.txt"),
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_write_file_claims_following_fence() {
        let text = "[WRITE_FILE: hello.txt]\n```\nhello world\n```\n```bash\ncat hello.txt\n```";
        let segments = parse(text);

        let tool = segments
            .iter()
            .find_map(|s| match s {
                ResponseSegment::ToolCall(t) => Some(t),
                _ => None,
            })
            .expect("tool call present");
        assert_eq!(tool.verb, ToolVerb::WriteFile);
        assert_eq!(tool.content.as_deref(), Some("hello world"));

        // The second fence is still a shell command
        let commands: Vec<&str> = segments
            .iter()
            .filter_map(|s| match s {
                ResponseSegment::ShellCommand(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(commands, vec!["cat hello.txt"]);
    }

    #[test]
    fn test_write_file_without_content_block() {
        let segments = parse("[WRITE_FILE: hello.txt]\nno fence here");
        match &segments[0] {
            ResponseSegment::ToolCall(t) => assert!(t.content.is_none()),
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_write_file_with_prose_before_fence_gets_no_content() {
        let text = "[WRITE_FILE: hello.txt]\nHere is the file:\n```\ncontent\n```";
        let segments = parse(text);
        let tool = segments
            .iter()
            .find_map(|s| match s {
                ResponseSegment::ToolCall(t) => Some(t),
                _ => None,
            })
            .expect("tool call present");
        assert!(tool.content.is_none());
        // The unclaimed fence remains a shell command candidate
        assert!(segments
            .iter()
            .any(|s| matches!(s, ResponseSegment::ShellCommand(_))));
    }

    #[test]
    fn test_bracket_tokens_inside_fences_are_not_tools() {
        let segments = parse("```bash\necho '[READ_FILE: x]'\n```");
        assert_eq!(
            segments,
            vec![ResponseSegment::ShellCommand(
                "echo '[READ_FILE: x]'".to_string()
            )]
        );
    }

    #[test]
    fn test_mixed_response_preserves_order() {
        let text = "First\n[READ_FILE: a.txt]\n```bash\nls\n```\n[WAIT]";
        let segments = parse(text);
        assert!(matches!(segments[0], ResponseSegment::PlainText(_)));
        assert!(matches!(segments[1], ResponseSegment::ToolCall(_)));
        assert!(matches!(segments[2], ResponseSegment::ShellCommand(_)));
        assert!(matches!(segments[3], ResponseSegment::Sentinel(_)));
    }

    #[test]
    fn test_completion_phrase_detection() {
        assert!(contains_completion_phrase("Task complete."));
        assert!(contains_completion_phrase("The task Complete now"));
        assert!(!contains_completion_phrase("the task is nearly done"));
    }

    #[test]
    fn test_unknown_bracket_token_is_plain_text() {
        let segments = parse("[SOMETHING_ELSE: arg]");
        assert_eq!(segments.len(), 1);
        assert!(matches!(segments[0], ResponseSegment::PlainText(_)));
    }
}
