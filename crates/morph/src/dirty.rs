//! Dirty-entity signal implementations.
//!
//! The signal holds at most one pending entity name. Marking again overwrites
//! it; `take` reads and clears.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use morph_core::{DirtySignal, Result};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryDirtySignal {
    pending: Mutex<Option<String>>,
}

impl MemoryDirtySignal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirtySignal for MemoryDirtySignal {
    async fn mark(&self, entity: &str) -> Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = Some(entity.to_string());
        Ok(())
    }

    async fn take(&self) -> Result<Option<String>> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        Ok(pending.take())
    }
}

/// Marker file shared between processes: its content is the entity name.
#[derive(Debug, Clone)]
pub struct FileDirtySignal {
    path: PathBuf,
}

impl FileDirtySignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Unique sibling of the marker, so renames stay on one filesystem.
    fn scratch_path(&self, purpose: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}", Uuid::new_v4().simple(), purpose));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DirtySignal for FileDirtySignal {
    async fn mark(&self, entity: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers see either the previous marker or the complete new one.
        let tmp = self.scratch_path("tmp");
        tokio::fs::write(&tmp, entity.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("[FileDirtySignal] Marked '{}'", entity);
        Ok(())
    }

    async fn take(&self) -> Result<Option<String>> {
        // Exactly one taker wins the rename; a later mark creates a new marker.
        let claimed = self.scratch_path("taking");
        match tokio::fs::rename(&self.path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let contents = tokio::fs::read_to_string(&claimed).await;
        if let Err(e) = tokio::fs::remove_file(&claimed).await {
            warn!("[FileDirtySignal] Failed to remove {}: {}", claimed.display(), e);
        }
        let contents = contents?;
        let name = contents.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    async fn memory_signal_holds_one_name() {
        let signal = MemoryDirtySignal::new();
        assert_eq!(signal.take().await.unwrap(), None);
        signal.mark("post").await.unwrap();
        signal.mark("author").await.unwrap();
        assert_eq!(signal.take().await.unwrap().as_deref(), Some("author"));
        assert_eq!(signal.take().await.unwrap(), None);
    }

    #[tokio::test]
    #[serial]
    async fn file_signal_read_and_clear() {
        let dir = TempDir::new().unwrap();
        let signal = FileDirtySignal::new(dir.path().join("state").join("dirty"));

        assert_eq!(signal.take().await.unwrap(), None);
        signal.mark("post").await.unwrap();

        let other_process = FileDirtySignal::new(dir.path().join("state").join("dirty"));
        assert_eq!(other_process.take().await.unwrap().as_deref(), Some("post"));
        assert_eq!(signal.take().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn file_signal_is_taken_exactly_once() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("dirty");

        for round in 0..10 {
            let name = format!("type_{}", round);
            FileDirtySignal::new(&marker).mark(&name).await.unwrap();

            let takers: Vec<_> = (0..8)
                .map(|_| {
                    let signal = FileDirtySignal::new(&marker);
                    tokio::spawn(async move { signal.take().await.unwrap() })
                })
                .collect();
            let taken: Vec<String> = futures::future::join_all(takers)
                .await
                .into_iter()
                .filter_map(|result| result.unwrap())
                .collect();
            assert_eq!(taken, vec![name]);
        }

        // Claimed markers are cleaned up.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn mark_after_take_is_not_lost() {
        let dir = TempDir::new().unwrap();
        let signal = FileDirtySignal::new(dir.path().join("dirty"));
        signal.mark("post").await.unwrap();
        assert_eq!(signal.take().await.unwrap().as_deref(), Some("post"));
        signal.mark("author").await.unwrap();
        assert_eq!(signal.take().await.unwrap().as_deref(), Some("author"));
    }
}
