//! MongoDB record store, using the driver's blocking API.
//!
//! Documents cross the boundary as JSON maps. Timestamp fields (per
//! [`Collection::timestamp_fields`]) are stored as BSON dates so server-side date operators
//! work on them; identities are `ObjectId`s exposed as hex strings.

use std::time::Duration;

use mongodb::{
    bson::{doc, oid::ObjectId, to_bson, Bson, DateTime as BsonDateTime, Document as BsonDocument},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
    sync::{Client, Collection as MongoCollection, Database},
    IndexModel,
};
use serde_json::Value;

use branchbook_core::{
    fields, Aggregation, Collection, Condition, DayTotal, Document, Query, RecordStore, SortDirection, StorageError,
    ID_FIELD,
};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub server_selection_timeout: Duration,
    pub connect_timeout: Duration,
}

pub struct MongoStore {
    db: Database,
}

fn mongo_err(e: MongoError) -> StorageError {
    StorageError::Other(e.to_string())
}

fn is_duplicate_key(e: &MongoError) -> bool {
    match &*e.kind {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn timestamp_json(dt: BsonDateTime) -> Value {
    fields::from_millis(dt.timestamp_millis())
        .and_then(fields::format_timestamp)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// BSON to JSON for one collection. `_id` and timestamp fields get the API encodings,
/// everything else is relaxed extended JSON.
fn bson_to_document(collection: Collection, d: BsonDocument) -> Document {
    d.into_iter()
        .map(|(k, v)| {
            let value = match v {
                Bson::ObjectId(oid) if k == ID_FIELD => Value::String(oid.to_hex()),
                Bson::DateTime(dt) if collection.timestamp_fields().contains(&k.as_str()) => timestamp_json(dt),
                other => other.into_relaxed_extjson(),
            };
            (k, value)
        })
        .collect()
}

/// JSON to BSON for one collection; timestamp fields become BSON dates and `_id` an ObjectId.
fn document_to_bson(collection: Collection, document: &Document) -> Result<BsonDocument, StorageError> {
    let mut out = BsonDocument::new();
    for (k, v) in document {
        let bson = match v {
            Value::String(s) if k == ID_FIELD => match ObjectId::parse_str(s) {
                Ok(oid) => Bson::ObjectId(oid),
                Err(_) => Bson::String(s.clone()),
            },
            Value::String(s) if collection.timestamp_fields().contains(&k.as_str()) => {
                let ts = fields::parse_timestamp(s).map_err(StorageError::Validation)?;
                Bson::DateTime(BsonDateTime::from_millis(fields::to_millis(ts)))
            }
            other => to_bson(other).map_err(|e| StorageError::Validation(format!("`{}` cannot be stored: {}", k, e)))?,
        };
        out.insert(k.clone(), bson);
    }
    Ok(out)
}

/// `$sum` yields an int, a long or a double.
fn total_of(row: &BsonDocument) -> Result<f64, StorageError> {
    match row.get("total") {
        Some(Bson::Int32(i)) => Ok(f64::from(*i)),
        Some(Bson::Int64(i)) => Ok(*i as f64),
        Some(Bson::Double(f)) => Ok(*f),
        other => Err(StorageError::Other(format!("unexpected day total: {:?}", other))),
    }
}

fn filter_for(conditions: &[Condition]) -> BsonDocument {
    let mut filter = BsonDocument::new();
    for c in conditions {
        filter.insert(c.field, c.value.clone());
    }
    filter
}

impl MongoStore {
    pub fn connect(settings: &MongoSettings) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(&settings.uri).run().map_err(mongo_err)?;
        options.app_name = Some("branchbook".to_string());
        options.server_selection_timeout = Some(settings.server_selection_timeout);
        options.connect_timeout = Some(settings.connect_timeout);

        let client = Client::with_options(options).map_err(mongo_err)?;
        let db = client.database(&settings.database);
        db.run_command(doc! { "ping": 1 }).run().map_err(mongo_err)?;
        tracing::info!(database = %settings.database, "MongoDB connected");

        let store = Self { db };
        store.ensure_indexes()?;
        Ok(store)
    }

    fn collection(&self, collection: Collection) -> MongoCollection<BsonDocument> {
        self.db.collection(collection.name())
    }

    fn ensure_indexes(&self) -> Result<(), StorageError> {
        for collection in Collection::ALL {
            for field in collection.unique_fields() {
                let index = IndexModel::builder()
                    .keys(doc! { *field: 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build();
                self.collection(collection).create_index(index).run().map_err(mongo_err)?;
            }
        }
        Ok(())
    }

    fn duplicate(collection: Collection, document: &Document) -> StorageError {
        let field = collection.unique_fields().first().copied().unwrap_or(ID_FIELD);
        StorageError::Duplicate {
            entity: collection.entity(),
            field: field.to_string(),
            value: document.get(field).and_then(Value::as_str).unwrap_or_default().to_string(),
        }
    }
}

impl RecordStore for MongoStore {
    fn insert(&self, collection: Collection, mut document: Document) -> Result<Document, StorageError> {
        let oid = ObjectId::new();
        document.insert(ID_FIELD.to_string(), Value::String(oid.to_hex()));

        let bson = document_to_bson(collection, &document)?;
        match self.collection(collection).insert_one(bson).run() {
            Ok(_) => {
                tracing::debug!(collection = %collection, id = %oid, "Document inserted");
                Ok(document)
            }
            Err(e) if is_duplicate_key(&e) => Err(Self::duplicate(collection, &document)),
            Err(e) => Err(mongo_err(e)),
        }
    }

    fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StorageError> {
        let direction = match query.sort.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        let cursor = self
            .collection(collection)
            .find(filter_for(&query.conditions))
            .sort(doc! { query.sort.field: direction })
            .run()
            .map_err(mongo_err)?;

        let mut result = Vec::new();
        for d in cursor {
            result.push(bson_to_document(collection, d.map_err(mongo_err)?));
        }
        Ok(result)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError> {
        let oid = match ObjectId::parse_str(id) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };
        let found = self
            .collection(collection)
            .find_one(doc! { ID_FIELD: oid })
            .run()
            .map_err(mongo_err)?;
        Ok(found.map(|d| bson_to_document(collection, d)))
    }

    fn update(&self, collection: Collection, id: &str, mut patch: Document) -> Result<Document, StorageError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StorageError::not_found(collection, id))?;
        patch.remove(ID_FIELD);
        if patch.is_empty() {
            return self.find_by_id(collection, id)?.ok_or_else(|| StorageError::not_found(collection, id));
        }

        let set = document_to_bson(collection, &patch)?;
        let updated = match self
            .collection(collection)
            .find_one_and_update(doc! { ID_FIELD: oid }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .run()
        {
            Ok(updated) => updated,
            Err(e) if is_duplicate_key(&e) => return Err(Self::duplicate(collection, &patch)),
            Err(e) => return Err(mongo_err(e)),
        };

        tracing::debug!(collection = %collection, id, "Document updated");
        updated
            .map(|d| bson_to_document(collection, d))
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<Document, StorageError> {
        let oid = ObjectId::parse_str(id).map_err(|_| StorageError::not_found(collection, id))?;
        let deleted = self
            .collection(collection)
            .find_one_and_delete(doc! { ID_FIELD: oid })
            .run()
            .map_err(mongo_err)?;

        tracing::debug!(collection = %collection, id, "Document deleted");
        deleted
            .map(|d| bson_to_document(collection, d))
            .ok_or_else(|| StorageError::not_found(collection, id))
    }

    fn daily_totals(&self, collection: Collection, aggregation: &Aggregation) -> Result<Vec<DayTotal>, StorageError> {
        let pipeline = vec![
            doc! { "$match": filter_for(&aggregation.conditions) },
            doc! {
                "$group": {
                    "_id": {
                        "$dateToString": {
                            "format": "%Y-%m-%d",
                            "date": format!("${}", aggregation.day_field),
                            "timezone": "UTC",
                        }
                    },
                    "total": { "$sum": format!("${}", aggregation.sum_field) },
                }
            },
            doc! { "$sort": { "_id": 1 } },
        ];

        let cursor = self.collection(collection).aggregate(pipeline).run().map_err(mongo_err)?;

        let mut totals = Vec::new();
        for row in cursor {
            let row = row.map_err(mongo_err)?;
            let day = match row.get("_id") {
                Some(Bson::String(day)) => day.clone(),
                _ => continue,
            };
            let total = total_of(&row)?;
            totals.push(DayTotal { day, total });
        }
        Ok(totals)
    }

    fn clear(&self, collection: Collection) -> Result<u64, StorageError> {
        let result = self.collection(collection).delete_many(doc! {}).run().map_err(mongo_err)?;
        Ok(result.deleted_count)
    }

    fn count(&self, collection: Collection) -> Result<u64, StorageError> {
        self.collection(collection).count_documents(doc! {}).run().map_err(mongo_err)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn timestamp_fields_become_bson_dates() {
        let d = doc(json!({"name": "Asha", "createdAt": "2024-04-15T00:00:00.000Z", "note": "2024-04-15"}));
        let bson = document_to_bson(Collection::Employees, &d).unwrap();
        assert!(matches!(bson.get("createdAt"), Some(Bson::DateTime(_))));
        assert!(matches!(bson.get("note"), Some(Bson::String(_))));
    }

    #[test]
    fn documents_survive_the_bson_round_trip() {
        let oid = ObjectId::new();
        let d = doc(json!({
            "_id": oid.to_hex(),
            "category": "Petrol",
            "month": "April",
            "amount": 5000,
            "ratio": 0.25,
            "date": "2024-04-15T00:00:00.000Z",
            "tags": ["fuel", {"k": null}]
        }));
        let back = bson_to_document(Collection::Expenses, document_to_bson(Collection::Expenses, &d).unwrap());
        assert_eq!(back, d);
    }

    #[test]
    fn day_totals_are_never_defaulted() {
        assert_eq!(total_of(&doc! { "_id": "2024-04-15", "total": 3500_i64 }).unwrap(), 3500.0);
        assert_eq!(total_of(&doc! { "_id": "2024-04-15", "total": 1e29 }).unwrap(), 1e29);
        assert!(total_of(&doc! { "_id": "2024-04-15", "total": "n/a" }).is_err());
        assert!(total_of(&doc! { "_id": "2024-04-15" }).is_err());
    }

    #[test]
    fn filters_are_plain_equality() {
        let f = filter_for(&[
            Condition { field: "category", value: "Petrol".into() },
            Condition { field: "month", value: "April".into() },
        ]);
        assert_eq!(f, doc! { "category": "Petrol", "month": "April" });
    }
}
