use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{Document, DocumentStore, FieldFilter, StoredDocument};
use crate::error::StoreError;

/// Process-local document store. Collections keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<StoredDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                fields: doc,
            });
        Ok(id)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &FieldFilter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filter.matches(&d.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::FieldValue;

    #[tokio::test]
    async fn query_filters_within_one_collection() {
        let store = MemoryStore::new();
        for status in ["pending", "done", "pending"] {
            let mut doc = Document::new();
            doc.insert("status".to_string(), FieldValue::String(status.to_string()));
            store.create("jobs", doc).await.unwrap();
        }
        store.create("other", Document::new()).await.unwrap();

        let filter = FieldFilter::equals("status", FieldValue::String("pending".to_string()));
        let hits = store.query("jobs", &filter).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].id, hits[1].id);
        assert_eq!(store.len("jobs"), 3);
        assert!(store.query("missing", &filter).await.unwrap().is_empty());
    }
}
