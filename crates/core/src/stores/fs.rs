use crate::traits::TextStore;
use async_trait::async_trait;
use std::path::PathBuf;

/// Keeps extracted text as `.txt` files in one directory. The returned
/// source identifier is the file path.
#[derive(Debug, Clone)]
pub struct FsTextStore {
    root: PathBuf,
}

impl FsTextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TextStore for FsTextStore {
    async fn write(&self, name: &str, text: &str) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, text).await?;
        Ok(path.to_string_lossy().to_string())
    }

    async fn read(&self, source: &str) -> std::io::Result<String> {
        tokio::fs::read_to_string(source).await
    }
}
