//! File-system collaborator interface.
//!
//! The dispatcher only ever talks to this trait; hosts may back it with the
//! local disk or a remote file-browser service.

use anyhow::Result;

#[async_trait::async_trait]
pub trait FileSystem: Send + Sync {
    async fn read(&self, path: &str) -> Result<String>;
    async fn write(&self, path: &str, content: &str) -> Result<()>;
    /// Directory entries, directories suffixed with '/'.
    async fn list(&self, path: &str) -> Result<Vec<String>>;
    async fn mkdir(&self, path: &str) -> Result<()>;
}

/// Local-disk implementation used by tests and simple hosts.
pub struct LocalFileSystem;

fn expand(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

#[async_trait::async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(expand(path)).await?)
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        tokio::fs::write(expand(path), content).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(expand(path)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();
        Ok(entries)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        tokio::fs::create_dir_all(expand(path)).await?;
        Ok(())
    }
}
