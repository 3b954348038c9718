//! Document persistence trait and the in-memory implementation
//!
//! Change records, approval requests, recommendations and query history are
//! persisted as JSON documents in named collections. The store is treated
//! as eventually-consistent keyed storage; no transactions are assumed.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::utils::{AdvisorError, AdvisorResult};

/// Equality filter on a top-level document field.
pub type FieldFilter = (String, serde_json::Value);

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> AdvisorResult<()>;

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> AdvisorResult<Option<serde_json::Value>>;

    /// Replace an existing document. Errors when the document is missing.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> AdvisorResult<()>;

    async fn delete_document(&self, collection: &str, id: &str) -> AdvisorResult<()>;

    /// All documents in a collection matching every filter.
    async fn query_documents(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> AdvisorResult<Vec<serde_json::Value>>;
}

pub(crate) fn matches_filters(doc: &serde_json::Value, filters: &[FieldFilter]) -> bool {
    filters
        .iter()
        .all(|(field, expected)| doc.get(field) == Some(expected))
}

/// Dashmap-backed store used by tests and single-process embedders.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> AdvisorResult<()> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body);
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> AdvisorResult<Option<serde_json::Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).map(|doc| doc.clone())))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> AdvisorResult<()> {
        let coll = self
            .collections
            .get(collection)
            .ok_or_else(|| AdvisorError::not_found(format!("collection {}", collection)))?;
        if !coll.contains_key(id) {
            return Err(AdvisorError::not_found(format!("document {}/{}", collection, id)));
        }
        coll.insert(id.to_string(), body);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> AdvisorResult<()> {
        if let Some(coll) = self.collections.get(collection) {
            coll.remove(id);
        }
        Ok(())
    }

    async fn query_documents(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> AdvisorResult<Vec<serde_json::Value>> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(coll
            .iter()
            .filter(|entry| matches_filters(entry.value(), filters))
            .map(|entry| entry.value().clone())
            .collect())
    }
}
