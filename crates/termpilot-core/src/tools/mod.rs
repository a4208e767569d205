//! Tool dispatch - routes bracketed tool invocations to their implementations.

pub mod file_ops;
pub mod fs;

pub use fs::{FileSystem, LocalFileSystem};

use anyhow::Result;
use tracing::debug;

use crate::parser::{ToolInvocation, ToolVerb};

/// Cap on tool output entering the conversation.
const MAX_TOOL_OUTPUT_CHARS: usize = 4000;

/// Dispatch a tool invocation to the appropriate handler.
///
/// Returns the synthetic tool output destined for the conversation; an `Err`
/// is a tool failure the caller reports and recovers from.
pub async fn dispatch_tool(invocation: &ToolInvocation, fs: &dyn FileSystem) -> Result<String> {
    debug!(
        "Dispatching tool: {} {}",
        invocation.verb.as_str(),
        invocation.argument
    );

    let output = match invocation.verb {
        ToolVerb::ReadFile => file_ops::execute_read_file(invocation, fs).await?,
        ToolVerb::WriteFile => file_ops::execute_write_file(invocation, fs).await?,
        ToolVerb::ListFiles => file_ops::execute_list_files(invocation, fs).await?,
        ToolVerb::Mkdir => file_ops::execute_mkdir(invocation, fs).await?,
    };

    Ok(truncate_output(&output, MAX_TOOL_OUTPUT_CHARS))
}

/// Truncate a string at a UTF-8 boundary, noting how much was dropped.
pub fn truncate_output(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    // Walk backwards from max_len to find a character boundary
    let mut truncate_at = max_len;
    while truncate_at > 0 && !s.is_char_boundary(truncate_at) {
        truncate_at -= 1;
    }

    format!(
        "{}... (truncated, {} total bytes)",
        &s[..truncate_at],
        s.len()
    )
}
