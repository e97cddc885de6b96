//! Typed schemas for the six collections.
//!
//! Documents travel through the stores as JSON maps; these types are only the gate a
//! document passes on its way in. [`Collection::normalize`] runs a document through its
//! record type so required fields are present and known fields carry canonical encodings.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::{
    fields::{self, numeric, timestamp},
    Collection, Document, ID_FIELD,
};
use crate::storage::StorageError;

pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Required string fields, checked for emptiness after deserialization.
    fn required_text(&self) -> Vec<(&'static str, &str)>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

impl Record for Branch {
    const COLLECTION: Collection = Collection::Branches;

    fn required_text(&self) -> Vec<(&'static str, &str)> {
        vec![("name", self.name.as_str())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchEntry {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub branch: String,
    #[serde(with = "timestamp")]
    pub date: OffsetDateTime,
    pub customer: String,
    pub place: String,
    pub mobile: String,
    #[serde(with = "numeric")]
    pub loan: f64,
    #[serde(with = "numeric")]
    pub interest: f64,
    #[serde(with = "numeric")]
    pub emi: f64,
}

impl Record for BranchEntry {
    const COLLECTION: Collection = Collection::BranchEntries;

    fn required_text(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("branch", self.branch.as_str()),
            ("customer", self.customer.as_str()),
            ("place", self.place.as_str()),
            ("mobile", self.mobile.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub category: String,
    pub month: String,
    #[serde(with = "numeric")]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "timestamp", default = "fields::now")]
    pub date: OffsetDateTime,
}

impl Record for Expense {
    const COLLECTION: Collection = Collection::Expenses;

    fn required_text(&self) -> Vec<(&'static str, &str)> {
        vec![("category", self.category.as_str()), ("month", self.month.as_str())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerExpense {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub customer_name: String,
    #[serde(with = "timestamp")]
    pub date: OffsetDateTime,
    #[serde(with = "numeric")]
    pub amount: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record for CustomerExpense {
    const COLLECTION: Collection = Collection::CustomerExpenses;

    fn required_text(&self) -> Vec<(&'static str, &str)> {
        vec![("customerName", self.customer_name.as_str()), ("category", self.category.as_str())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeExpense {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub branch: String,
    pub employee_name: String,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub date: Option<OffsetDateTime>,
    #[serde(default, with = "numeric::option", skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record for EmployeeExpense {
    const COLLECTION: Collection = Collection::EmployeeExpenses;

    fn required_text(&self) -> Vec<(&'static str, &str)> {
        vec![("branch", self.branch.as_str()), ("employeeName", self.employee_name.as_str())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub joining_date: Option<OffsetDateTime>,
    #[serde(default, with = "numeric::option", skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    #[serde(with = "timestamp", default = "fields::now")]
    pub created_at: OffsetDateTime,
}

impl Record for Employee {
    const COLLECTION: Collection = Collection::Employees;

    fn required_text(&self) -> Vec<(&'static str, &str)> {
        vec![("name", self.name.as_str())]
    }
}

fn normalize_as<R: Record>(doc: Document) -> Result<Document, StorageError> {
    let entity = R::COLLECTION.entity();
    let record: R = serde_json::from_value(Value::Object(doc))
        .map_err(|e| StorageError::Validation(format!("{} validation failed: {}", entity, e)))?;

    if let Some((field, _)) = record.required_text().into_iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(StorageError::Validation(format!(
            "{} validation failed: `{}` is required",
            entity, field
        )));
    }

    match serde_json::to_value(&record)? {
        Value::Object(normalized) => Ok(normalized),
        _ => Err(StorageError::Other(format!("{} did not serialize to a document", entity))),
    }
}

impl Collection {
    /// Validates `doc` against this collection's record type and returns the canonical
    /// form. Fields the record type does not know are dropped.
    pub fn normalize(self, doc: Document) -> Result<Document, StorageError> {
        match self {
            Collection::Branches => normalize_as::<Branch>(doc),
            Collection::BranchEntries => normalize_as::<BranchEntry>(doc),
            Collection::Expenses => normalize_as::<Expense>(doc),
            Collection::CustomerExpenses => normalize_as::<CustomerExpense>(doc),
            Collection::EmployeeExpenses => normalize_as::<EmployeeExpense>(doc),
            Collection::Employees => normalize_as::<Employee>(doc),
        }
    }

    /// Normalizes a document submitted for creation. Any client-supplied identity is
    /// discarded so the store can assign its own.
    pub fn prepare_insert(self, mut doc: Document) -> Result<Document, StorageError> {
        doc.remove(ID_FIELD);
        self.normalize(doc)
    }

    /// Overlays `patch` onto `existing`, validates the result, and returns the patch with
    /// known fields in canonical form. Unknown fields pass through untouched.
    pub fn prepare_patch(self, existing: &Document, mut patch: Document) -> Result<Document, StorageError> {
        patch.remove(ID_FIELD);

        let mut merged = existing.clone();
        for (k, v) in &patch {
            merged.insert(k.clone(), v.clone());
        }
        let normalized = self.normalize(merged)?;

        Ok(patch
            .into_iter()
            .map(|(k, v)| match normalized.get(&k) {
                Some(canonical) => (k, canonical.clone()),
                None => (k, v),
            })
            .collect())
    }
}
