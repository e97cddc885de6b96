//! SQLite record store. Every document is one row holding its JSON body; filters and sort
//! keys are evaluated with `json_extract`, so the stored timestamp encoding must sort
//! lexicographically (see `branchbook_core::fields`).

use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use branchbook_core::{
    Aggregation, Collection, Condition, DayTotal, DayTotals, Document, Query, RecordStore, SortDirection, StorageError, ID_FIELD,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

fn json_path(field: &str) -> String {
    format!("json_extract(body, '$.{}')", field)
}

/// `AND`-joined equality clauses; parameters start at `?2` (`?1` is the collection).
fn where_clause(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .enumerate()
        .map(|(i, c)| format!(" AND {} = ?{}", json_path(c.field), i + 2))
        .collect()
}

fn bind_values<'a>(collection: Collection, conditions: &'a [Condition]) -> Vec<&'a str> {
    let mut values = vec![collection.name()];
    values.extend(conditions.iter().map(|c| c.value.as_str()));
    values
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(db_err)?;

        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        tracing::info!(path, "SQLite store opened");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                UNIQUE (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents(collection, seq);
            ",
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn load(conn: &Connection, collection: Collection, id: &str) -> Result<Option<Document>, StorageError> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection.name(), id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn check_unique(conn: &Connection, collection: Collection, id: &str, candidate: &Document) -> Result<(), StorageError> {
        for field in collection.unique_fields() {
            let value = match candidate.get(*field).and_then(Value::as_str) {
                Some(v) => v,
                None => continue,
            };
            let clashes: i64 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND id != ?2 AND {} = ?3",
                        json_path(field)
                    ),
                    params![collection.name(), id, value],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            if clashes > 0 {
                return Err(StorageError::Duplicate {
                    entity: collection.entity(),
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, collection: Collection, mut document: Document) -> Result<Document, StorageError> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().simple().to_string();
        document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        Self::check_unique(&conn, collection, &id, &document)?;
        conn.execute(
            "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection.name(), id, serde_json::to_string(&document)?],
        )
        .map_err(db_err)?;

        tracing::debug!(collection = %collection, id, "Document inserted");
        Ok(document)
    }

    fn find(&self, collection: Collection, query: &Query) -> Result<Vec<Document>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let direction = match query.sort.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let sql = format!(
            "SELECT body FROM documents WHERE collection = ?1{} ORDER BY {} {}, seq ASC",
            where_clause(&query.conditions),
            json_path(query.sort.field),
            direction
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values(collection, &query.conditions)), |row| {
                row.get::<_, String>(0)
            })
            .map_err(db_err)?;

        let mut result = Vec::new();
        for body in rows {
            let body = body.map_err(db_err)?;
            result.push(serde_json::from_str(&body)?);
        }
        Ok(result)
    }

    fn find_by_id(&self, collection: Collection, id: &str) -> Result<Option<Document>, StorageError> {
        let conn = self.conn.lock().unwrap();
        Self::load(&conn, collection, id)
    }

    fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<Document, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut document = Self::load(&conn, collection, id)?.ok_or_else(|| StorageError::not_found(collection, id))?;

        for (k, v) in patch {
            if k != ID_FIELD {
                document.insert(k, v);
            }
        }
        Self::check_unique(&conn, collection, id, &document)?;

        conn.execute(
            "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
            params![collection.name(), id, serde_json::to_string(&document)?],
        )
        .map_err(db_err)?;

        tracing::debug!(collection = %collection, id, "Document updated");
        Ok(document)
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<Document, StorageError> {
        let conn = self.conn.lock().unwrap();
        let document = Self::load(&conn, collection, id)?.ok_or_else(|| StorageError::not_found(collection, id))?;

        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection.name(), id],
        )
        .map_err(db_err)?;

        tracing::debug!(collection = %collection, id, "Document deleted");
        Ok(document)
    }

    fn daily_totals(&self, collection: Collection, aggregation: &Aggregation) -> Result<Vec<DayTotal>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let day = json_path(aggregation.day_field);
        let amount = json_path(aggregation.sum_field);
        let sql = format!(
            "SELECT substr({day}, 1, 10),
                    CASE WHEN json_type(body, '$.{sum}') IN ('integer', 'real') THEN {amount} END
             FROM documents
             WHERE collection = ?1{conditions} AND json_type(body, '$.{day_field}') = 'text'",
            day = day,
            sum = aggregation.sum_field,
            amount = amount,
            conditions = where_clause(&aggregation.conditions),
            day_field = aggregation.day_field,
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values(collection, &aggregation.conditions)), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
            })
            .map_err(db_err)?;

        // Summed here rather than with SUM() so totals stay exact decimals where they fit.
        let mut totals = DayTotals::default();
        for row in rows {
            let (day, amount) = row.map_err(db_err)?;
            totals.add(&day, amount.unwrap_or(0.0));
        }
        Ok(totals.finish())
    }

    fn clear(&self, collection: Collection) -> Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute("DELETE FROM documents WHERE collection = ?1", params![collection.name()])
            .map_err(db_err)?;
        Ok(removed as u64)
    }

    fn count(&self, collection: Collection) -> Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection.name()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use branchbook_core::Sort;
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn filters_compare_strings_only() {
        let store = SqliteStore::new(":memory:").unwrap();
        store.insert(Collection::Expenses, doc(json!({"month": "4", "date": "2024-04-01T00:00:00.000Z"}))).unwrap();
        store.insert(Collection::Expenses, doc(json!({"month": 4, "date": "2024-04-02T00:00:00.000Z"}))).unwrap();

        let found = store
            .find(Collection::Expenses, &Query::all(Sort::descending("date")).filter("month", "4"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["month"], json!("4"));
    }

    #[test]
    fn collections_are_partitioned() {
        let store = SqliteStore::new(":memory:").unwrap();
        store.insert(Collection::Branches, doc(json!({"name": "Delhi Branch"}))).unwrap();
        store.insert(Collection::Employees, doc(json!({"name": "Delhi Branch"}))).unwrap();
        assert_eq!(store.count(Collection::Branches).unwrap(), 1);
        assert_eq!(store.clear(Collection::Employees).unwrap(), 1);
        assert_eq!(store.count(Collection::Branches).unwrap(), 1);
    }

    #[test]
    fn daily_totals_skip_non_numeric_amounts() {
        let store = SqliteStore::new(":memory:").unwrap();
        for (amount, date) in [
            (json!(0.1), "2024-04-15T08:00:00.000Z"),
            (json!(0.2), "2024-04-15T09:00:00.000Z"),
            (json!("n/a"), "2024-04-15T10:00:00.000Z"),
            (json!(3), "2024-04-01T00:00:00.000Z"),
        ] {
            store
                .insert(Collection::Expenses, doc(json!({"category": "Bank", "amount": amount, "date": date})))
                .unwrap();
        }
        let agg = Aggregation {
            conditions: vec![Condition { field: "category", value: "Bank".into() }],
            day_field: "date",
            sum_field: "amount",
        };
        let totals = store.daily_totals(Collection::Expenses, &agg).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].day, "2024-04-01");
        assert_eq!(totals[1].total, 0.3);
    }

    #[test]
    fn overflowing_day_totals_leave_the_store_usable() {
        let store = SqliteStore::new(":memory:").unwrap();
        for _ in 0..2 {
            store
                .insert(
                    Collection::Expenses,
                    doc(json!({"category": "Bank", "amount": 5e28, "date": "2024-04-15T00:00:00.000Z"})),
                )
                .unwrap();
        }
        let agg = Aggregation {
            conditions: vec![Condition { field: "category", value: "Bank".into() }],
            day_field: "date",
            sum_field: "amount",
        };
        let totals = store.daily_totals(Collection::Expenses, &agg).unwrap();
        assert_eq!(totals[0].total, 1e29);
        assert_eq!(store.count(Collection::Expenses).unwrap(), 2);
    }
}
