//! Core types and traits for BranchBook record stores.
//!
//! This crate provides the `RecordStore` trait, the collection catalogue and the typed
//! record schemas, so storage implementations can live in separate crates.

pub mod models;
pub mod storage;

pub use models::{
    fields, records, Aggregation, Collection, Condition, DayTotal, DayTotals, Document, Query, Sort, SortDirection, ID_FIELD,
};
pub use storage::{RecordStore, StorageError};
