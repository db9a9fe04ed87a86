//! JSON file definition store
//!
//! One `<name>.json` per definition plus a `.revision` counter file, all in a
//! single directory. Writes go to a temporary file first and are renamed into
//! place, so readers in other processes never observe a half-written file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use morph_api::EntityTypeDefinition;
use morph_core::{DefinitionStore, Result, StorageError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::compiler;

const REVISION_FILE: &str = ".revision";

pub struct JsonFileDefinitionStore {
    dir: PathBuf,
    revision_lock: Mutex<()>,
}

impl JsonFileDefinitionStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!("[JsonFileDefinitionStore] Opened {}", dir.display());
        Ok(Self {
            dir,
            revision_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File of a definition; names that could leave the directory have none.
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        compiler::is_identifier(name).then(|| self.dir.join(format!("{}.json", name)))
    }

    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_definition(path: &Path) -> Result<Option<EntityTypeDefinition>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DefinitionStore for JsonFileDefinitionStore {
    async fn load(&self, name: &str) -> Result<Option<EntityTypeDefinition>> {
        match self.path_for(name) {
            Some(path) => Self::read_definition(&path).await,
            None => Ok(None),
        }
    }

    async fn load_all(&self) -> Result<Vec<EntityTypeDefinition>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut all = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_definition(&path).await {
                Ok(Some(definition)) => all.push(definition),
                Ok(None) => {}
                Err(StorageError::SerializationError(e)) => {
                    warn!(
                        "[JsonFileDefinitionStore] Skipping unreadable {}: {}",
                        path.display(),
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save(&self, definition: &EntityTypeDefinition) -> Result<()> {
        let path = self.path_for(&definition.name).ok_or_else(|| {
            StorageError::QueryError(format!("invalid definition name '{}'", definition.name))
        })?;
        let json = serde_json::to_vec_pretty(definition)?;
        self.write_atomic(&path, &json).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let Some(path) = self.path_for(name) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn next_revision(&self) -> Result<u64> {
        let _guard = self.revision_lock.lock().await;
        let path = self.dir.join(REVISION_FILE);

        let previous = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| {
                StorageError::BackendError(format!("corrupt revision file: {}", e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        // Wall-clock floor keeps revisions growing if the counter file is lost.
        let now = Utc::now().timestamp_micros().max(0) as u64;
        let next = (previous + 1).max(now);
        self.write_atomic(&path, next.to_string().as_bytes()).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_api::FieldDescriptor;
    use tempfile::TempDir;

    fn definition(name: &str, revision: u64) -> EntityTypeDefinition {
        let now = Utc::now();
        EntityTypeDefinition {
            name: name.to_string(),
            fields: vec![FieldDescriptor::string("name").required()],
            created_at: now,
            updated_at: now,
            revision,
        }
    }

    #[tokio::test]
    async fn save_load_delete() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDefinitionStore::open(dir.path()).await.unwrap();

        store.save(&definition("author", 1)).await.unwrap();
        store.save(&definition("post", 2)).await.unwrap();

        let author = store.load("author").await.unwrap().unwrap();
        assert_eq!(author.fields[0].name, "name");

        let names: Vec<_> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["author", "post"]);

        assert!(store.delete("author").await.unwrap());
        assert!(!store.delete("author").await.unwrap());
        assert!(store.load("author").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn traversing_names_resolve_to_no_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDefinitionStore::open(dir.path().join("defs"))
            .await
            .unwrap();
        let outside = JsonFileDefinitionStore::open(dir.path()).await.unwrap();
        outside.save(&definition("secret", 1)).await.unwrap();

        assert!(store.load("../secret").await.unwrap().is_none());
        assert!(!store.delete("../secret").await.unwrap());
        assert!(store.save(&definition("../secret", 2)).await.is_err());
        assert!(dir.path().join("secret.json").exists());
    }

    #[tokio::test]
    async fn revisions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let first = {
            let store = JsonFileDefinitionStore::open(dir.path()).await.unwrap();
            let a = store.next_revision().await.unwrap();
            let b = store.next_revision().await.unwrap();
            assert!(b > a);
            b
        };
        let store = JsonFileDefinitionStore::open(dir.path()).await.unwrap();
        assert!(store.next_revision().await.unwrap() > first);
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileDefinitionStore::open(dir.path()).await.unwrap();
        store.save(&definition("author", 1)).await.unwrap();
        tokio::fs::write(dir.path().join("broken.json"), b"{not json")
            .await
            .unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
