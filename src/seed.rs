//! Sample data loading and store inspection for the `seed` and `inspect` commands.

use prettytable::{row, Table};
use serde_json::{json, Value};

use branchbook_core::{Collection, Document};

use crate::{bookkeeper::Bookkeeper, storage::StorageError};

/// Collections replaced by [`seed`].
pub const SEEDED: [Collection; 3] = [Collection::Expenses, Collection::Branches, Collection::BranchEntries];

fn sample_expenses() -> Vec<Value> {
    vec![
        json!({ "category": "Petrol", "month": "April", "amount": 5000, "description": "Fuel for company vehicles", "date": "2024-04-15" }),
        json!({ "category": "Petrol", "month": "April", "amount": 3500, "description": "Fuel for delivery vans", "date": "2024-04-20" }),
        json!({ "category": "Office Exp.", "month": "April", "amount": 12000, "description": "Office supplies and stationery", "date": "2024-04-10" }),
        json!({ "category": "Office Exp.", "month": "April", "amount": 8000, "description": "Printer cartridges and paper", "date": "2024-04-25" }),
        json!({ "category": "Salary", "month": "April", "amount": 50000, "description": "Staff salaries", "date": "2024-04-01" }),
        json!({ "category": "Office Rent", "month": "April", "amount": 25000, "description": "Monthly office rent", "date": "2024-04-01" }),
        json!({ "category": "Telephone Exp.", "month": "April", "amount": 2000, "description": "Phone and internet bills", "date": "2024-04-15" }),
        json!({ "category": "Bank", "month": "April", "amount": 1500, "description": "Bank charges", "date": "2024-04-05" }),
        json!({ "category": "Petrol", "month": "May", "amount": 6000, "description": "Fuel for company vehicles", "date": "2024-05-12" }),
        json!({ "category": "Office Exp.", "month": "May", "amount": 10000, "description": "Office supplies", "date": "2024-05-08" }),
        json!({ "category": "Salary", "month": "May", "amount": 50000, "description": "Staff salaries", "date": "2024-05-01" }),
        json!({ "category": "Office Rent", "month": "May", "amount": 25000, "description": "Monthly office rent", "date": "2024-05-01" }),
    ]
}

fn sample_branches() -> Vec<Value> {
    ["Mumbai Branch", "Delhi Branch", "Bangalore Branch"]
        .into_iter()
        .map(|name| json!({ "name": name }))
        .collect()
}

fn sample_branch_entries() -> Vec<Value> {
    vec![
        json!({
            "branch": "Mumbai Branch", "customer": "Rajesh Kumar", "place": "Andheri", "mobile": "9876543210",
            "loan": 100000, "interest": 12, "emi": 9000, "date": "2024-04-15"
        }),
        json!({
            "branch": "Mumbai Branch", "customer": "Priya Sharma", "place": "Bandra", "mobile": "9876543211",
            "loan": 150000, "interest": 10, "emi": 13000, "date": "2024-04-20"
        }),
        json!({
            "branch": "Delhi Branch", "customer": "Amit Patel", "place": "Connaught Place", "mobile": "9876543212",
            "loan": 200000, "interest": 11, "emi": 18000, "date": "2024-04-18"
        }),
    ]
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub cleared: Vec<(Collection, u64)>,
    pub created: Vec<(Collection, usize)>,
}

impl SeedSummary {
    pub fn created(&self, collection: Collection) -> usize {
        self.created
            .iter()
            .find(|(c, _)| *c == collection)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["Collection", "Removed", "Inserted"]);
        for (collection, created) in &self.created {
            let cleared = self
                .cleared
                .iter()
                .find(|(c, _)| c == collection)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            table.add_row(row![collection.name(), cleared, created]);
        }
        table
    }
}

/// Clears expenses, branches and branch entries, then inserts the sample set.
/// Records go through the same validation as API writes.
pub fn seed(book: &Bookkeeper) -> Result<SeedSummary, StorageError> {
    let mut summary = SeedSummary::default();

    for collection in SEEDED {
        let removed = book.store().clear(collection)?;
        tracing::info!(collection = %collection, removed, "Cleared");
        summary.cleared.push((collection, removed));
    }

    for (collection, records) in [
        (Collection::Expenses, sample_expenses()),
        (Collection::Branches, sample_branches()),
        (Collection::BranchEntries, sample_branch_entries()),
    ] {
        let count = records.len();
        for record in records {
            book.create(collection, record)?;
        }
        summary.created.push((collection, count));
    }

    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub collection: Collection,
    pub count: u64,
    pub sample: Option<Document>,
}

/// Per-collection counts plus the first document in default order.
pub fn inspect(book: &Bookkeeper) -> Result<Vec<CollectionReport>, StorageError> {
    Collection::ALL
        .iter()
        .map(|&collection| {
            let count = book.store().count(collection)?;
            let sample = book.list_all(collection)?.into_iter().next();
            Ok(CollectionReport { collection, count, sample })
        })
        .collect()
}

pub fn report_table(reports: &[CollectionReport]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Collection", "Documents", "Sample"]);
    for report in reports {
        let sample = match &report.sample {
            Some(doc) => serde_json::to_string(doc).unwrap_or_default(),
            None => "-".to_string(),
        };
        table.add_row(row![report.collection.name(), report.count, sample]);
    }
    table
}
