//! Document store collaborator interface.
//!
//! The engine only needs three primitives from its store: read a versioned
//! document, insert a brand-new one, and compare-and-swap an existing one.
//! Everything else (trimming, retries, lazy creation) lives in the
//! repository layer on top.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::StoreError;

/// Collection holding one profile document per user
pub const PROFILES_COLLECTION: &str = "profiles";
/// Collection holding one append-only record per scored session
pub const SESSIONS_COLLECTION: &str = "sessions";

#[derive(Clone, Debug)]
pub struct VersionedDocument {
    pub body: Value,
    pub version: u64,
}

// Generic get/insert/compare-and-swap key-value collaborator
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str)
        -> Result<Option<VersionedDocument>, StoreError>;

    /// Insert a document that must not exist yet. Fails with
    /// `StoreError::Duplicate` if it does.
    async fn insert_new(
        &self,
        collection: &str,
        key: &str,
        body: Value,
    ) -> Result<(), StoreError>;

    /// Replace a document only if its stored version still matches
    /// `expected_version`. Fails with `StoreError::Conflict` otherwise.
    /// Returns the new version.
    async fn put_versioned(
        &self,
        collection: &str,
        key: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError>;
}

// In-memory store used by tests and the demo CLI
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<(String, String), (Value, u64)>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<VersionedDocument>, StoreError> {
        let documents = self.documents.read();
        Ok(documents
            .get(&(collection.to_string(), key.to_string()))
            .map(|(body, version)| VersionedDocument {
                body: body.clone(),
                version: *version,
            }))
    }

    async fn insert_new(
        &self,
        collection: &str,
        key: &str,
        body: Value,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write();
        let id = (collection.to_string(), key.to_string());
        if documents.contains_key(&id) {
            return Err(StoreError::Duplicate {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        documents.insert(id, (body, 1));
        Ok(())
    }

    async fn put_versioned(
        &self,
        collection: &str,
        key: &str,
        body: Value,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.write();
        let id = (collection.to_string(), key.to_string());
        match documents.get_mut(&id) {
            Some((stored_body, stored_version)) if *stored_version == expected_version => {
                *stored_body = body;
                *stored_version += 1;
                Ok(*stored_version)
            }
            _ => Err(StoreError::Conflict {
                collection: collection.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_then_get() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_new("profiles", "u-1", json!({"a": 1}))
            .await
            .unwrap();

        let doc = store.get("profiles", "u-1").await.unwrap().unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.body["a"], 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_refused() {
        let store = InMemoryDocumentStore::new();
        store.insert_new("sessions", "s-1", json!({})).await.unwrap();
        let err = store.insert_new("sessions", "s-1", json!({})).await;
        assert!(matches!(err, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn stale_version_write_conflicts() {
        let store = InMemoryDocumentStore::new();
        store.insert_new("profiles", "u-1", json!({"n": 0})).await.unwrap();

        let v2 = store
            .put_versioned("profiles", "u-1", json!({"n": 1}), 1)
            .await
            .unwrap();
        assert_eq!(v2, 2);

        // writing against the old version must fail
        let err = store
            .put_versioned("profiles", "u-1", json!({"n": 99}), 1)
            .await;
        assert!(matches!(err, Err(StoreError::Conflict { .. })));

        let doc = store.get("profiles", "u-1").await.unwrap().unwrap();
        assert_eq!(doc.body["n"], 1);
    }

    #[tokio::test]
    async fn missing_document_write_conflicts() {
        let store = InMemoryDocumentStore::new();
        let err = store.put_versioned("profiles", "ghost", json!({}), 1).await;
        assert!(matches!(err, Err(StoreError::Conflict { .. })));
    }
}
