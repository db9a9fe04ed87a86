//! Query and update language understood by entity stores.
//!
//! Deliberately small: equality, case-insensitive "contains", membership,
//! ranges, null checks and `And`/`Or` composition. Updates cover `$set`,
//! `$unset`, `$addToSet` and `$pull` semantics.

use morph_api::Document;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value; for array fields, the array contains the value
    Eq(String, Value),
    In(String, Vec<Value>),
    /// Case-insensitive substring match on string (or string array) fields
    Contains(String, String),
    Range {
        field: String,
        gt: Option<Value>,
        gte: Option<Value>,
        lt: Option<Value>,
        lte: Option<Value>,
    },
    /// Matches when every member matches; `And(vec![])` matches everything
    And(Vec<Filter>),
    /// Matches when any member matches; `Or(vec![])` matches nothing
    Or(Vec<Filter>),
    IsNull(String),
    IsNotNull(String),
}

impl Filter {
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// Combine with another filter, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: usize,
    /// `None` returns every match after `skip`
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindResult {
    pub docs: Vec<Document>,
    /// Number of matches before skip/limit were applied
    pub total: usize,
}

/// Pre- and post-image of one applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedDocument {
    pub before: Document,
    pub after: Document,
}

/// Single-document update.
///
/// Applied in order: set, unset, add-to-set, pull. `add_to_set` and `pull`
/// are idempotent, which is what makes relation sync safe to retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
    pub add_to_set: Vec<(String, Value)>,
    pub pull: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn add_to_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_to_set.push((field.into(), value.into()));
        self
    }

    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pull.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.add_to_set.is_empty()
            && self.pull.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens() {
        let filter = Filter::eq("a", 1)
            .and(Filter::eq("b", 2))
            .and(Filter::all());
        assert_eq!(
            filter,
            Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)])
        );
    }

    #[test]
    fn update_builder_collects_operations() {
        let update = Update::new()
            .set("title", "x")
            .unset("old")
            .add_to_set("posts", "p1")
            .pull("posts", "p0");
        assert!(!update.is_empty());
        assert_eq!(update.unset, vec!["old"]);
        assert_eq!(update.add_to_set.len(), 1);
        assert_eq!(update.pull.len(), 1);
        assert!(Update::new().is_empty());
    }
}
