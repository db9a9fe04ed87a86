//! Relation integrity maintainer
//!
//! Keeps reverse-relation fields in step with forward relation fields after an
//! instance is created, updated or deleted. Every per-id write is an
//! idempotent `$addToSet`/`$pull` through the entity store and runs
//! concurrently with its siblings. A failed write is reported back and logged
//! but never undoes the primary write.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use morph_api::{Document, RelationSyncFailure, id_list};
use morph_core::{EntityStore, Update};
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::IncomingRelation;
use crate::compiler::ReverseRelationPlan;

/// Outcome of one synchronisation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied: usize,
    pub failures: Vec<RelationSyncFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: SyncReport) {
        self.applied += other.applied;
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Remove,
}

struct ReverseWrite {
    entity: String,
    id: String,
    field: String,
    value: String,
    op: Op,
}

pub struct RelationMaintainer {
    store: Arc<dyn EntityStore>,
}

/// Ids referenced per (target entity, reverse field), across every relation
/// field pointing at that target.
fn referenced(plan: &ReverseRelationPlan, doc: &Document) -> Vec<(String, String, BTreeSet<String>)> {
    let mut groups: Vec<(String, String, BTreeSet<String>)> = Vec::new();
    for entry in &plan.entries {
        let ids = id_list(doc.get(&entry.source_field));
        let existing = groups.iter_mut().find(|(target, reverse, _)| {
            *target == entry.target_entity && *reverse == entry.reverse_field
        });
        match existing {
            Some((_, _, set)) => set.extend(ids),
            None => groups.push((
                entry.target_entity.clone(),
                entry.reverse_field.clone(),
                ids.into_iter().collect(),
            )),
        }
    }
    groups
}

impl RelationMaintainer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Add `id` to the reverse field of every referenced instance.
    pub async fn on_create(
        &self,
        entity: &str,
        id: &str,
        plan: &ReverseRelationPlan,
        doc: &Document,
    ) -> SyncReport {
        let writes = referenced(plan, doc)
            .into_iter()
            .flat_map(|(target, reverse, ids)| {
                ids.into_iter().map(move |target_id| ReverseWrite {
                    entity: target.clone(),
                    id: target_id,
                    field: reverse.clone(),
                    value: id.to_string(),
                    op: Op::Add,
                })
            })
            .collect();
        self.run(entity, id, writes).await
    }

    /// Apply the symmetric difference between the old and new references.
    pub async fn on_update(
        &self,
        entity: &str,
        id: &str,
        plan: &ReverseRelationPlan,
        before: &Document,
        after: &Document,
    ) -> SyncReport {
        let old = referenced(plan, before);
        let new = referenced(plan, after);

        let mut writes = Vec::new();
        for ((target, reverse, old_ids), (_, _, new_ids)) in old.into_iter().zip(new) {
            for removed in old_ids.difference(&new_ids) {
                writes.push(ReverseWrite {
                    entity: target.clone(),
                    id: removed.clone(),
                    field: reverse.clone(),
                    value: id.to_string(),
                    op: Op::Remove,
                });
            }
            for added in new_ids.difference(&old_ids) {
                writes.push(ReverseWrite {
                    entity: target.clone(),
                    id: added.clone(),
                    field: reverse.clone(),
                    value: id.to_string(),
                    op: Op::Add,
                });
            }
        }
        self.run(entity, id, writes).await
    }

    /// Remove `id` from the reverse field of every instance it referenced.
    pub async fn on_delete(
        &self,
        entity: &str,
        id: &str,
        plan: &ReverseRelationPlan,
        doc: &Document,
    ) -> SyncReport {
        let writes = referenced(plan, doc)
            .into_iter()
            .flat_map(|(target, reverse, ids)| {
                ids.into_iter().map(move |target_id| ReverseWrite {
                    entity: target.clone(),
                    id: target_id,
                    field: reverse.clone(),
                    value: id.to_string(),
                    op: Op::Remove,
                })
            })
            .collect();
        self.run(entity, id, writes).await
    }

    /// Pull a deleted instance's id out of the forward relation fields of the
    /// instances that referenced it (listed in its own reverse fields).
    pub async fn detach_incoming(
        &self,
        entity: &str,
        id: &str,
        incoming: &[IncomingRelation],
        doc: &Document,
    ) -> SyncReport {
        let mut writes = Vec::new();
        for relation in incoming {
            for source_id in id_list(doc.get(&relation.reverse_field)) {
                writes.push(ReverseWrite {
                    entity: relation.source_entity.clone(),
                    id: source_id,
                    field: relation.source_field.clone(),
                    value: id.to_string(),
                    op: Op::Remove,
                });
            }
        }
        self.run(entity, id, writes).await
    }

    async fn run(&self, entity: &str, id: &str, writes: Vec<ReverseWrite>) -> SyncReport {
        if writes.is_empty() {
            return SyncReport::default();
        }
        debug!(
            "[RelationMaintainer] {} reverse update(s) for {}/{}",
            writes.len(),
            entity,
            id
        );

        let results = join_all(writes.iter().map(|write| self.apply(write))).await;

        let mut report = SyncReport::default();
        for (write, result) in writes.iter().zip(results) {
            match result {
                Ok(()) => report.applied += 1,
                Err(reason) => {
                    let failure = RelationSyncFailure {
                        source_entity: entity.to_string(),
                        source_id: id.to_string(),
                        target_entity: write.entity.clone(),
                        target_id: write.id.clone(),
                        reverse_field: write.field.clone(),
                        reason,
                    };
                    warn!("[RelationMaintainer] {}", failure);
                    report.failures.push(failure);
                }
            }
        }
        report
    }

    async fn apply(&self, write: &ReverseWrite) -> Result<(), String> {
        let update = match write.op {
            Op::Add => Update::new().add_to_set(write.field.clone(), write.value.clone()),
            Op::Remove => Update::new().pull(write.field.clone(), write.value.clone()),
        };
        match self.store.update_one(&write.entity, &write.id, &update).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err("target instance not found".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Combine reports from several passes of one operation.
pub fn combine(reports: impl IntoIterator<Item = SyncReport>) -> SyncReport {
    let mut total = SyncReport::default();
    for report in reports {
        total.merge(report);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::storage::MemoryEntityStore;
    use morph_api::FieldDescriptor;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn setup() -> (Arc<MemoryEntityStore>, RelationMaintainer, ReverseRelationPlan) {
        let store = Arc::new(MemoryEntityStore::new());
        for id in ["a1", "a2", "a3"] {
            store
                .create("author", doc(json!({"_id": id, "posts": []})))
                .await
                .unwrap();
        }
        let plan = compile("post", &[FieldDescriptor::relation("authors", "author")])
            .unwrap()
            .reverse_relation_plan;
        (store.clone(), RelationMaintainer::new(store), plan)
    }

    async fn posts_of(store: &MemoryEntityStore, author: &str) -> Value {
        store.find_by_id("author", author).await.unwrap().unwrap()["posts"].clone()
    }

    #[tokio::test]
    async fn create_update_delete_keep_reverse_field_in_step() {
        let (store, maintainer, plan) = setup().await;

        let created = doc(json!({"_id": "p1", "authors": ["a1", "a2"]}));
        let report = maintainer.on_create("post", "p1", &plan, &created).await;
        assert_eq!(report.applied, 2);
        assert_eq!(posts_of(&store, "a1").await, json!(["p1"]));

        let updated = doc(json!({"_id": "p1", "authors": ["a2", "a3"]}));
        let report = maintainer
            .on_update("post", "p1", &plan, &created, &updated)
            .await;
        assert_eq!(report.applied, 2);
        assert_eq!(posts_of(&store, "a1").await, json!([]));
        assert_eq!(posts_of(&store, "a2").await, json!(["p1"]));
        assert_eq!(posts_of(&store, "a3").await, json!(["p1"]));

        maintainer.on_delete("post", "p1", &plan, &updated).await;
        assert_eq!(posts_of(&store, "a2").await, json!([]));
        assert_eq!(posts_of(&store, "a3").await, json!([]));
    }

    #[tokio::test]
    async fn missing_targets_are_reported_not_raised() {
        let (store, maintainer, plan) = setup().await;
        let created = doc(json!({"_id": "p1", "authors": ["a1", "ghost"]}));

        let report = maintainer.on_create("post", "p1", &plan, &created).await;
        assert_eq!(report.applied, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target_id, "ghost");
        assert_eq!(posts_of(&store, "a1").await, json!(["p1"]));
    }

    #[tokio::test]
    async fn detach_incoming_pulls_forward_references() {
        let store = Arc::new(MemoryEntityStore::new());
        store
            .create("post", doc(json!({"_id": "p1", "authors": ["a1", "a2"]})))
            .await
            .unwrap();
        let maintainer = RelationMaintainer::new(store.clone());
        let incoming = vec![IncomingRelation {
            source_entity: "post".into(),
            source_field: "authors".into(),
            reverse_field: "posts".into(),
        }];

        let deleted_author = doc(json!({"_id": "a1", "posts": ["p1"]}));
        let report = maintainer
            .detach_incoming("author", "a1", &incoming, &deleted_author)
            .await;
        assert!(report.is_clean());

        let post = store.find_by_id("post", "p1").await.unwrap().unwrap();
        assert_eq!(post["authors"], json!(["a2"]));
    }
}
