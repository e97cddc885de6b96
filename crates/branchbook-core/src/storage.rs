use thiserror::Error;

use crate::models::{Aggregation, Collection, DayTotal, Document, Query};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} with {field} `{value}` already exists")]
    Duplicate {
        entity: &'static str,
        field: String,
        value: String,
    },
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn not_found(collection: Collection, id: &str) -> Self {
        StorageError::NotFound {
            entity: collection.entity(),
            id: id.to_string(),
        }
    }
}

/// A document store holding one partition per [`Collection`].
///
/// Documents handed to `insert` and `update` are already normalized; stores do not
/// validate record shape, only identity and unique fields.
pub trait RecordStore: Send + Sync {
    /// Assigns `_id`, persists, and returns the stored document.
    fn insert(&self, collection: Collection, document: Document) -> Result<Document, StorageError>;
    fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StorageError>;
    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError>;
    /// Overlays `patch` field by field and returns the updated document.
    fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<Document, StorageError>;
    /// Removes the document and returns it.
    fn delete(&self, collection: Collection, id: &str) -> Result<Document, StorageError>;
    /// Day totals in ascending day order.
    fn daily_totals(&self, collection: Collection, aggregation: &Aggregation) -> Result<Vec<DayTotal>, StorageError>;
    fn clear(&self, collection: Collection) -> Result<u64, StorageError>;
    fn count(&self, collection: Collection) -> Result<u64, StorageError>;
}
