use std::sync::Arc;

pub use branchbook_core::storage::{RecordStore, StorageError};
pub use branchbook_memory::InMemoryStore;
pub use branchbook_mongo::{MongoSettings, MongoStore};
pub use branchbook_sqlite::SqliteStore;

use crate::config::{Backend, StorageConfig};

/// Opens the configured backend. Blocks until the store is reachable or its timeout
/// elapses, so call it outside async contexts.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn RecordStore>, StorageError> {
    let store: Arc<dyn RecordStore> = match config.backend {
        Backend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on exit");
            Arc::new(InMemoryStore::new())
        }
        Backend::Sqlite => Arc::new(SqliteStore::new(&config.path)?),
        Backend::Mongodb => Arc::new(MongoStore::connect(&MongoSettings {
            uri: config.uri.clone(),
            database: config.database.clone(),
            server_selection_timeout: config.server_selection_timeout(),
            connect_timeout: config.connect_timeout(),
        })?),
    };
    Ok(store)
}
