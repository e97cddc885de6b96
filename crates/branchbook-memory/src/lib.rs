use std::{collections::BTreeMap, sync::RwLock};

use serde_json::Value;
use uuid::Uuid;

use branchbook_core::{Aggregation, Collection, DayTotal, Document, Query, RecordStore, StorageError, ID_FIELD};

/// Documents kept per collection in insertion order, so equal sort keys stay stable.
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<Collection, Vec<Document>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let mut collections = BTreeMap::new();
        for collection in Collection::ALL {
            collections.insert(collection, Vec::new());
        }
        Self {
            collections: RwLock::new(collections),
        }
    }

    fn next_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

fn check_unique(collection: Collection, docs: &[Document], candidate: &Document) -> Result<(), StorageError> {
    for field in collection.unique_fields() {
        let value = match candidate.get(*field) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let clash = docs
            .iter()
            .filter(|d| id_of(d) != id_of(candidate))
            .any(|d| d.get(*field) == Some(value));
        if clash {
            return Err(StorageError::Duplicate {
                entity: collection.entity(),
                field: field.to_string(),
                value: value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
            });
        }
    }
    Ok(())
}

impl RecordStore for InMemoryStore {
    fn insert(&self, collection: Collection, mut document: Document) -> Result<Document, StorageError> {
        let mut collections = self.collections.write().unwrap();
        let docs = collections.entry(collection).or_default();

        document.insert(ID_FIELD.to_string(), Value::String(Self::next_id()));
        check_unique(collection, docs, &document)?;
        docs.push(document.clone());

        tracing::debug!(collection = %collection, id = id_of(&document), "Document inserted");
        Ok(document)
    }

    fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StorageError> {
        let collections = self.collections.read().unwrap();
        let mut result: Vec<Document> = match collections.get(&collection) {
            Some(docs) => docs.iter().filter(|d| query.matches(d)).cloned().collect(),
            None => Vec::new(),
        };
        result.sort_by(|a, b| query.sort.compare(a, b));
        Ok(result)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| id_of(d) == Some(id)))
            .cloned())
    }

    fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<Document, StorageError> {
        let mut collections = self.collections.write().unwrap();
        let docs = collections.entry(collection).or_default();

        let position = docs
            .iter()
            .position(|d| id_of(d) == Some(id))
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        let mut updated = docs[position].clone();
        for (k, v) in patch {
            if k != ID_FIELD {
                updated.insert(k, v);
            }
        }
        check_unique(collection, docs, &updated)?;
        docs[position] = updated.clone();

        tracing::debug!(collection = %collection, id, "Document updated");
        Ok(updated)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<Document, StorageError> {
        let mut collections = self.collections.write().unwrap();
        let docs = collections.entry(collection).or_default();

        let position = docs
            .iter()
            .position(|d| id_of(d) == Some(id))
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        tracing::debug!(collection = %collection, id, "Document deleted");
        Ok(docs.remove(position))
    }

    fn daily_totals(&self, collection: Collection, aggregation: &Aggregation) -> Result<Vec<DayTotal>, StorageError> {
        let collections = self.collections.read().unwrap();
        Ok(match collections.get(&collection) {
            Some(docs) => aggregation.apply(docs),
            None => Vec::new(),
        })
    }

    fn clear(&self, collection: Collection) -> Result<u64, StorageError> {
        let mut collections = self.collections.write().unwrap();
        let docs = collections.entry(collection).or_default();
        let removed = docs.len() as u64;
        docs.clear();
        Ok(removed)
    }

    fn count(&self, collection: Collection) -> Result<u64, StorageError> {
        let collections = self.collections.read().unwrap();
        Ok(collections.get(&collection).map(|d| d.len() as u64).unwrap_or(0))
    }
}
