//! Read surface of the generated CRUD plan.

use serde::{Deserialize, Serialize};

use crate::Document;

/// Query parameters accepted by a generated read operation.
///
/// Mirrors the HTTP surface one-to-one: every member is optional and kept in
/// its raw textual form until the executor interprets it against a compiled
/// handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadQuery {
    /// Fetch a single instance by id; all other parameters except `fields`
    /// and `populate` are ignored
    pub id: Option<String>,
    /// 1-based page number
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Free-text term matched against the searchable field set
    pub search: Option<String>,
    /// Comma-separated field names, leading `-` for descending
    pub sort: Option<String>,
    /// Comma-separated projection
    pub fields: Option<String>,
    /// JSON object of field -> value (or range object)
    pub filter: Option<String>,
    /// Comma-separated relation field names to expand
    pub populate: Option<String>,
}

impl ReadQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Document>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadResult {
    One(Document),
    Page(Page),
}

impl ReadResult {
    pub fn into_page(self) -> Option<Page> {
        match self {
            ReadResult::Page(page) => Some(page),
            ReadResult::One(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            ReadResult::One(doc) => Some(doc),
            ReadResult::Page(_) => None,
        }
    }
}
