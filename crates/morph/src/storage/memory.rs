use std::collections::HashMap;

use async_trait::async_trait;
use morph_api::{Document, ID_FIELD, document_id};
use morph_core::{
    EntityStore, Filter, FindOptions, FindResult, Result, StorageError, Update, UpdatedDocument,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{apply_update, compare_docs, matches};

#[derive(Debug, Default)]
struct Collection {
    /// id -> (insertion sequence, document)
    docs: HashMap<String, (u64, Document)>,
    next_seq: u64,
}

/// In-memory entity store.
///
/// Reference implementation of [`EntityStore`]; unsorted results come back in
/// insertion order.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn create(&self, entity: &str, mut doc: Document) -> Result<String> {
        let id = match document_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut collections = self.collections.write().await;
        let collection = collections.entry(entity.to_string()).or_default();
        if collection.docs.contains_key(&id) {
            return Err(StorageError::BackendError(format!(
                "duplicate id {} in {}",
                id, entity
            )));
        }
        let seq = collection.next_seq;
        collection.next_seq += 1;
        collection.docs.insert(id.clone(), (seq, doc));
        Ok(id)
    }

    async fn find_by_id(&self, entity: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .await
            .get(entity)
            .and_then(|c| c.docs.get(id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn find(
        &self,
        entity: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<FindResult> {
        let collections = self.collections.read().await;
        let Some(collection) = collections.get(entity) else {
            return Ok(FindResult::default());
        };

        let mut hits: Vec<&(u64, Document)> = collection
            .docs
            .values()
            .filter(|(_, doc)| matches(doc, filter))
            .collect();
        hits.sort_by(|(seq_a, a), (seq_b, b)| {
            compare_docs(a, b, &options.sort).then(seq_a.cmp(seq_b))
        });

        let total = hits.len();
        let docs = hits
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|(_, doc)| doc.clone())
            .collect();
        Ok(FindResult { docs, total })
    }

    async fn count(&self, entity: &str, filter: &Filter) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .await
            .get(entity)
            .map(|c| c.docs.values().filter(|(_, doc)| matches(doc, filter)).count())
            .unwrap_or(0))
    }

    async fn update_one(
        &self,
        entity: &str,
        id: &str,
        update: &Update,
    ) -> Result<Option<UpdatedDocument>> {
        let mut collections = self.collections.write().await;
        let Some((_, doc)) = collections
            .get_mut(entity)
            .and_then(|c| c.docs.get_mut(id))
        else {
            return Ok(None);
        };
        let before = doc.clone();
        apply_update(doc, update);
        Ok(Some(UpdatedDocument {
            before,
            after: doc.clone(),
        }))
    }

    async fn delete_one(&self, entity: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(entity)
            .and_then(|c| c.docs.remove(id))
            .map(|(_, doc)| doc))
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.get(to).is_some_and(|c| !c.docs.is_empty()) {
            return Err(StorageError::BackendError(format!(
                "cannot rename {} to {}: target collection is not empty",
                from, to
            )));
        }
        if let Some(collection) = collections.remove(from) {
            debug!(
                "[MemoryEntityStore] Renamed collection {} -> {} ({} documents)",
                from,
                to,
                collection.docs.len()
            );
            collections.insert(to.to_string(), collection);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::SortKey;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_assigns_ids_and_rejects_duplicates() {
        let store = MemoryEntityStore::new();
        let id = store.create("author", doc(json!({"name": "Alice"}))).await.unwrap();
        let stored = store.find_by_id("author", &id).await.unwrap().unwrap();
        assert_eq!(stored[ID_FIELD], json!(id));

        let explicit = store
            .create("author", doc(json!({"_id": "a1", "name": "Bob"})))
            .await
            .unwrap();
        assert_eq!(explicit, "a1");
        assert!(store
            .create("author", doc(json!({"_id": "a1"})))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn find_sorts_skips_and_counts() {
        let store = MemoryEntityStore::new();
        for (id, n) in [("a", 3), ("b", 1), ("c", 2)] {
            store
                .create("item", doc(json!({"_id": id, "n": n})))
                .await
                .unwrap();
        }

        let options = FindOptions {
            sort: vec![SortKey::asc("n")],
            skip: 1,
            limit: Some(1),
        };
        let result = store.find("item", &Filter::all(), &options).await.unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.docs[0]["_id"], json!("c"));

        let unsorted = store
            .find("item", &Filter::all(), &FindOptions::default())
            .await
            .unwrap();
        let ids: Vec<_> = unsorted.docs.iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b"), json!("c")]);

        assert_eq!(store.count("item", &Filter::eq("n", 2)).await.unwrap(), 1);
        assert_eq!(store.count("missing", &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_delete_and_rename() {
        let store = MemoryEntityStore::new();
        store
            .create("author", doc(json!({"_id": "a1", "name": "Alice"})))
            .await
            .unwrap();

        let updated = store
            .update_one(
                "author",
                "a1",
                &Update::new().set("name", "Alicia").add_to_set("posts", "p1"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.before["name"], json!("Alice"));
        assert!(!updated.before.contains_key("posts"));
        assert_eq!(updated.after["name"], json!("Alicia"));
        assert_eq!(updated.after["posts"], json!(["p1"]));
        assert!(store
            .update_one("author", "nope", &Update::new())
            .await
            .unwrap()
            .is_none());

        store.rename_collection("author", "writer").await.unwrap();
        assert!(store.find_by_id("author", "a1").await.unwrap().is_none());
        assert!(store.delete_one("writer", "a1").await.unwrap().is_some());
        assert!(store.delete_one("writer", "a1").await.unwrap().is_none());
    }
}
