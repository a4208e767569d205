//! File operation tools: READ_FILE, WRITE_FILE, LIST_FILES, MKDIR.

use anyhow::Result;
use tracing::debug;

use crate::parser::ToolInvocation;

use super::fs::FileSystem;

pub async fn execute_read_file(
    invocation: &ToolInvocation,
    fs: &dyn FileSystem,
) -> Result<String> {
    debug!("Reading file: {}", invocation.argument);
    let content = fs.read(&invocation.argument).await?;
    let line_count = content.lines().count();
    Ok(format!(
        "Contents of {} ({} lines):\n{}",
        invocation.argument, line_count, content
    ))
}

pub async fn execute_write_file(
    invocation: &ToolInvocation,
    fs: &dyn FileSystem,
) -> Result<String> {
    let content = invocation.content.as_deref().ok_or_else(|| {
        anyhow::anyhow!(
            "WRITE_FILE for '{}' is missing its fenced content block",
            invocation.argument
        )
    })?;

    debug!(
        "Writing {} bytes to {}",
        content.len(),
        invocation.argument
    );
    fs.write(&invocation.argument, content).await?;
    Ok(format!(
        "Wrote {} bytes to {}",
        content.len(),
        invocation.argument
    ))
}

pub async fn execute_list_files(
    invocation: &ToolInvocation,
    fs: &dyn FileSystem,
) -> Result<String> {
    debug!("Listing directory: {}", invocation.argument);
    let entries = fs.list(&invocation.argument).await?;
    if entries.is_empty() {
        return Ok(format!("Directory {} is empty", invocation.argument));
    }
    Ok(format!(
        "Contents of {}:\n{}",
        invocation.argument,
        entries.join("\n")
    ))
}

pub async fn execute_mkdir(invocation: &ToolInvocation, fs: &dyn FileSystem) -> Result<String> {
    debug!("Creating directory: {}", invocation.argument);
    fs.mkdir(&invocation.argument).await?;
    Ok(format!("Created directory {}", invocation.argument))
}
