//! Directory-based document storage

use crate::batch::WriteTask;
use crate::etl::Loader;
use async_trait::async_trait;
use eyre::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Writes each document to `{root}/{uri}`
///
/// Useful for inspecting a load locally before pointing it at a store.
/// Collection tags are not persisted.
pub struct DirectorySink {
    path: PathBuf,
}

impl DirectorySink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create output directory: {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn root(&self) -> &Path {
        &self.path
    }

    /// Resolve a URI to a file below the root
    ///
    /// # Errors
    /// Rejects URIs that would escape the root (`..` segments).
    pub fn file_for(&self, uri: &str) -> Result<PathBuf> {
        let relative = Path::new(uri.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            eyre::bail!("Refusing to write outside output directory: {}", uri);
        }
        Ok(self.path.join(relative))
    }

    async fn write_task(&self, task: &WriteTask) -> Result<()> {
        let file = self.file_for(&task.uri)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        tokio::fs::write(&file, task.document.content())
            .await
            .with_context(|| format!("Failed to write document: {}", file.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Loader for DirectorySink {
    type Item = WriteTask;

    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        for task in &items {
            self.write_task(task).await?;
        }
        log::debug!(
            "Wrote {} document(s) under {}",
            items.len(),
            self.path.display()
        );
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Document, DocumentFormat};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn task(uri: &str, content: &str) -> WriteTask {
        WriteTask::new(
            uri,
            Arc::from(Vec::<String>::new()),
            Document::new(DocumentFormat::Xml, content),
        )
    }

    #[tokio::test]
    async fn test_writes_nested_paths() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path()).unwrap();

        let count = sink
            .load(vec![
                task("/hr/public/emp/1.xml", "<a/>"),
                task("hr/public/emp/2.xml", "<b/>"),
            ])
            .await
            .unwrap();

        assert_eq!(count, 2);
        let first = std::fs::read_to_string(temp.path().join("hr/public/emp/1.xml")).unwrap();
        assert_eq!(first, "<a/>");
        assert!(temp.path().join("hr/public/emp/2.xml").exists());
    }

    #[test]
    fn test_rejects_parent_segments() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path()).unwrap();
        assert!(sink.file_for("/a/../../etc/passwd").is_err());
        assert!(sink.file_for("/a/b/c.xml").is_ok());
    }
}
