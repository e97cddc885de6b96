//! Query and aggregation layer over a [`RecordStore`].
//!
//! Every read is a single-collection query with string-equality filters and one sort key.
//! Writes go through the collection's record type first, so the store only ever sees
//! normalized documents.

use std::sync::Arc;

use serde_json::Value;

use branchbook_core::{Aggregation, Collection, Condition, DayTotal, Document, Query, Sort, SortDirection, ID_FIELD};

use crate::storage::{RecordStore, StorageError};

pub struct Bookkeeper {
    store: Arc<dyn RecordStore>,
}

fn as_document(collection: Collection, body: Value) -> Result<Document, StorageError> {
    match body {
        Value::Object(doc) => Ok(doc),
        _ => Err(StorageError::Validation(format!(
            "{} validation failed: expected a JSON object",
            collection.entity()
        ))),
    }
}

impl Bookkeeper {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn list_all(&self, collection: Collection) -> Result<Vec<Document>, StorageError> {
        self.store.find(collection, &Query::all(collection.default_sort()))
    }

    /// Documents whose key field (see [`Collection::key_field`]) equals `key`.
    pub fn list_by_key(&self, collection: Collection, key: &str) -> Result<Vec<Document>, StorageError> {
        let query = Query::all(collection.default_sort()).filter(collection.key_field(), key);
        self.store.find(collection, &query)
    }

    pub fn expenses_for(&self, category: &str, month: &str) -> Result<Vec<Document>, StorageError> {
        let query = Query::all(Sort::descending("date"))
            .filter("category", category)
            .filter("month", month);
        self.store.find(Collection::Expenses, &query)
    }

    /// Every category for `month`. Descending feeds the totals page, ascending the
    /// daily breakdown.
    pub fn expenses_for_month(&self, month: &str, direction: SortDirection) -> Result<Vec<Document>, StorageError> {
        let query = Query::all(Sort { field: "date", direction }).filter("month", month);
        self.store.find(Collection::Expenses, &query)
    }

    /// Per-day sums of `amount`, ascending by day. Days are UTC calendar days.
    pub fn daily_totals(&self, category: &str, month: &str) -> Result<Vec<DayTotal>, StorageError> {
        let aggregation = Aggregation {
            conditions: vec![
                Condition { field: "category", value: category.to_string() },
                Condition { field: "month", value: month.to_string() },
            ],
            day_field: "date",
            sum_field: "amount",
        };
        self.store.daily_totals(Collection::Expenses, &aggregation)
    }

    pub fn create(&self, collection: Collection, body: Value) -> Result<Document, StorageError> {
        let doc = collection.prepare_insert(as_document(collection, body)?)?;
        let stored = self.store.insert(collection, doc)?;
        let id = stored.get(ID_FIELD).and_then(|v| v.as_str());
        tracing::info!(collection = %collection, id, "Created");
        Ok(stored)
    }

    pub fn update(&self, collection: Collection, id: &str, body: Value) -> Result<Document, StorageError> {
        let patch = as_document(collection, body)?;
        let existing = self
            .store
            .find_by_id(collection, id)?
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        let patch = collection.prepare_patch(&existing, patch)?;
        let updated = self.store.update(collection, id, patch)?;
        tracing::info!(collection = %collection, id, "Updated");
        Ok(updated)
    }

    /// Deletes by identity. Documents referencing the removed one are left alone.
    pub fn remove(&self, collection: Collection, id: &str) -> Result<Document, StorageError> {
        let removed = self.store.delete(collection, id)?;
        tracing::info!(collection = %collection, id, "Removed");
        Ok(removed)
    }
}
