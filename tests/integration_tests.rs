use std::sync::Arc;

use rust_decimal::{prelude::FromPrimitive, Decimal};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use branchbook::bookkeeper::Bookkeeper;
use branchbook::storage::{InMemoryStore, SqliteStore, StorageError};
use branchbook_core::{Collection, Document, SortDirection};

fn id_of(doc: &Document) -> String {
    doc["_id"].as_str().expect("stored documents carry an _id").to_string()
}

fn dates(docs: &[Document]) -> Vec<&str> {
    docs.iter().map(|d| d["date"].as_str().unwrap()).collect()
}

fn expense(book: &Bookkeeper, category: &str, month: &str, amount: Value, date: &str) -> Document {
    book.create(
        Collection::Expenses,
        json!({ "category": category, "month": month, "amount": amount, "date": date }),
    )
    .unwrap()
}

fn create_then_list_includes_once(book: &Bookkeeper) {
    let created = book
        .create(
            Collection::BranchEntries,
            json!({
                "branch": "Mumbai Branch", "customer": "Rajesh Kumar", "place": "Andheri",
                "mobile": "9876543210", "loan": 100000, "interest": 12, "emi": 9000, "date": "2024-04-15"
            }),
        )
        .unwrap();
    let id = id_of(&created);
    assert!(!id.is_empty());
    assert_eq!(created["date"], "2024-04-15T00:00:00.000Z");
    assert_eq!(created["loan"], 100000);

    let all = book.list_all(Collection::BranchEntries).unwrap();
    assert_eq!(all.iter().filter(|d| id_of(d) == id).count(), 1);

    let scoped = book.list_by_key(Collection::BranchEntries, "Mumbai Branch").unwrap();
    assert_eq!(scoped, vec![created]);
}

fn client_identity_is_ignored(book: &Bookkeeper) {
    let created = book
        .create(Collection::Branches, json!({ "_id": "chosen-by-client", "name": "Pune Branch" }))
        .unwrap();
    assert_ne!(id_of(&created), "chosen-by-client");
}

fn update_overlays_single_field(book: &Bookkeeper) {
    let created = expense(book, "Petrol", "April", json!(5000), "2024-04-15");
    let id = id_of(&created);

    let updated = book.update(Collection::Expenses, &id, json!({ "amount": 5500 })).unwrap();
    assert_eq!(updated["amount"], 5500);

    let stored = book.store().find_by_id(Collection::Expenses, &id).unwrap().unwrap();
    assert_eq!(stored["amount"], 5500);
    for field in ["category", "month", "date", "_id"] {
        assert_eq!(stored[field], created[field], "{} changed", field);
    }
}

fn update_keeps_unknown_fields(book: &Bookkeeper) {
    let created = book
        .create(Collection::Branches, json!({ "name": "Delhi Branch", "manager": "dropped on create" }))
        .unwrap();
    assert!(created.get("manager").is_none());

    let updated = book
        .update(Collection::Branches, &id_of(&created), json!({ "manager": "Anita" }))
        .unwrap();
    assert_eq!(updated["manager"], "Anita");
    assert_eq!(updated["name"], "Delhi Branch");
}

fn update_cannot_empty_required_field(book: &Bookkeeper) {
    let created = book.create(Collection::Branches, json!({ "name": "Delhi Branch" })).unwrap();
    let err = book
        .update(Collection::Branches, &id_of(&created), json!({ "name": "" }))
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)), "{:?}", err);
}

fn update_missing_branch_is_not_found(book: &Bookkeeper) {
    let err = book
        .update(Collection::Branches, "64b7f0c2a1e4d3b2c1a09f8e", json!({ "name": "Nowhere" }))
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "Branch", .. }), "{:?}", err);
}

fn remove_twice_is_not_found(book: &Bookkeeper) {
    let created = expense(book, "Bank", "April", json!(1500), "2024-04-05");
    let id = id_of(&created);

    let removed = book.remove(Collection::Expenses, &id).unwrap();
    assert_eq!(removed["amount"], 1500);
    assert!(book.store().find_by_id(Collection::Expenses, &id).unwrap().is_none());
    assert!(matches!(
        book.remove(Collection::Expenses, &id),
        Err(StorageError::NotFound { .. })
    ));
}

fn duplicate_branch_name_is_rejected(book: &Bookkeeper) {
    book.create(Collection::Branches, json!({ "name": "Mumbai Branch" })).unwrap();
    let other = book.create(Collection::Branches, json!({ "name": "Delhi Branch" })).unwrap();

    let err = book
        .create(Collection::Branches, json!({ "name": "Mumbai Branch" }))
        .unwrap_err();
    assert!(matches!(err, StorageError::Duplicate { .. }), "{:?}", err);

    let err = book
        .update(Collection::Branches, &id_of(&other), json!({ "name": "Mumbai Branch" }))
        .unwrap_err();
    assert!(matches!(err, StorageError::Duplicate { .. }), "{:?}", err);
    assert_eq!(book.store().count(Collection::Branches).unwrap(), 2);
}

fn missing_required_field_is_rejected(book: &Bookkeeper) {
    let err = book
        .create(Collection::Expenses, json!({ "category": "Petrol", "amount": 10 }))
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)), "{:?}", err);
    assert_eq!(book.store().count(Collection::Expenses).unwrap(), 0);

    // no cross-field checks
    let refund = expense(book, "Petrol", "April", json!(-250), "2024-04-16");
    assert_eq!(refund["amount"], -250);
}

fn petrol_daily_totals(book: &Bookkeeper) {
    expense(book, "Petrol", "April", json!(5000), "2024-04-15");
    expense(book, "Petrol", "April", json!(3500), "2024-04-20");
    expense(book, "Petrol", "May", json!(6000), "2024-05-12");
    expense(book, "Salary", "April", json!(50000), "2024-04-15");

    let totals = book.daily_totals("Petrol", "April").unwrap();
    let pairs: Vec<_> = totals.iter().map(|t| (t.day.as_str(), t.total)).collect();
    assert_eq!(pairs, vec![("2024-04-15", 5000.0), ("2024-04-20", 3500.0)]);
}

fn daily_totals_match_amount_sum(book: &Bookkeeper) {
    let amounts = [(json!(0.1), "2024-04-03T08:00:00Z"), (json!(0.2), "2024-04-03T17:30:00Z"), (json!("12.5"), "2024-04-09")];
    for (amount, date) in amounts {
        expense(book, "Office Exp.", "April", amount, date);
    }

    let totals = book.daily_totals("Office Exp.", "April").unwrap();
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].total, 0.3);
    let sum: Decimal = totals.iter().filter_map(|t| Decimal::from_f64(t.total)).sum();
    assert_eq!(sum, dec!(12.8));

    assert!(book.daily_totals("Office Exp.", "June").unwrap().is_empty());
}

fn huge_amounts_are_summed(book: &Bookkeeper) {
    expense(book, "Salary", "April", json!(1e29), "2024-04-15");
    expense(book, "Salary", "April", json!(5), "2024-04-15");
    expense(book, "Salary", "April", json!(5e28), "2024-04-20");
    expense(book, "Salary", "April", json!(5e28), "2024-04-20");

    let totals = book.daily_totals("Salary", "April").unwrap();
    let pairs: Vec<_> = totals.iter().map(|t| (t.day.as_str(), t.total)).collect();
    assert_eq!(pairs, vec![("2024-04-15", 1e29 + 5.0), ("2024-04-20", 1e29)]);

    // the store keeps answering afterwards
    assert_eq!(book.list_all(Collection::Expenses).unwrap().len(), 4);
}

fn listings_are_ordered(book: &Bookkeeper) {
    for (customer, date) in [("A", "2024-04-10"), ("B", "2024-04-20"), ("C", "2024-04-15")] {
        book.create(
            Collection::BranchEntries,
            json!({
                "branch": "Delhi Branch", "customer": customer, "place": "Karol Bagh",
                "mobile": "9000000000", "loan": 1000, "interest": 10, "emi": 100, "date": date
            }),
        )
        .unwrap();
    }
    let entries = book.list_all(Collection::BranchEntries).unwrap();
    let entry_dates = dates(&entries);
    assert!(entry_dates.windows(2).all(|w| w[0] >= w[1]), "{:?}", entry_dates);

    expense(book, "Petrol", "April", json!(1), "2024-04-12");
    expense(book, "Salary", "April", json!(2), "2024-04-01");
    expense(book, "Bank", "April", json!(3), "2024-04-30");
    expense(book, "Bank", "May", json!(4), "2024-05-02");

    let desc = book.expenses_for_month("April", SortDirection::Descending).unwrap();
    assert_eq!(
        dates(&desc),
        ["2024-04-30T00:00:00.000Z", "2024-04-12T00:00:00.000Z", "2024-04-01T00:00:00.000Z"]
    );
    let asc = book.expenses_for_month("April", SortDirection::Ascending).unwrap();
    assert_eq!(
        dates(&asc),
        ["2024-04-01T00:00:00.000Z", "2024-04-12T00:00:00.000Z", "2024-04-30T00:00:00.000Z"]
    );

    let bank = book.expenses_for("Bank", "April").unwrap();
    assert_eq!(bank.len(), 1);
    assert_eq!(bank[0]["amount"], 3);
}

fn unknown_branch_is_empty(book: &Bookkeeper) {
    book.create(
        Collection::Employees,
        json!({ "name": "Sunita", "branch": "Mumbai Branch", "joiningDate": "2023-06-01", "salary": "32000" }),
    )
    .unwrap();
    book.create(Collection::Employees, json!({ "name": "Farhan" })).unwrap();

    assert!(book.list_by_key(Collection::Employees, "Chennai Branch").unwrap().is_empty());
    assert!(book.list_by_key(Collection::EmployeeExpenses, "Chennai Branch").unwrap().is_empty());

    let scoped = book.list_by_key(Collection::Employees, "Mumbai Branch").unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0]["salary"], 32000);
    assert_eq!(scoped[0]["joiningDate"], "2023-06-01T00:00:00.000Z");

    // unscoped employees are still listed
    let names: Vec<_> = book
        .list_all(Collection::Employees)
        .unwrap()
        .into_iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Farhan", "Sunita"]);
}

fn customer_expenses_by_name(book: &Bookkeeper) {
    book.create(
        Collection::CustomerExpenses,
        json!({ "customerName": "Amit Patel", "date": "2024-04-18", "amount": 750, "category": "Documentation" }),
    )
    .unwrap();
    let err = book
        .create(Collection::CustomerExpenses, json!({ "customerName": "Amit Patel", "amount": 10 }))
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation(_)), "{:?}", err);

    let docs = book.list_by_key(Collection::CustomerExpenses, "Amit Patel").unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["category"], "Documentation");
}

macro_rules! backend_tests {
    ($backend:ident, $make:expr, [$($case:ident),* $(,)?]) => {
        paste::paste! {
            $(
                #[test]
                fn [<$backend _ $case>]() {
                    let book = Bookkeeper::new($make);
                    $case(&book);
                }
            )*
        }
    };
}

macro_rules! all_backend_tests {
    ($backend:ident, $make:expr) => {
        backend_tests!($backend, $make, [
            create_then_list_includes_once,
            client_identity_is_ignored,
            update_overlays_single_field,
            update_keeps_unknown_fields,
            update_cannot_empty_required_field,
            update_missing_branch_is_not_found,
            remove_twice_is_not_found,
            duplicate_branch_name_is_rejected,
            missing_required_field_is_rejected,
            petrol_daily_totals,
            daily_totals_match_amount_sum,
            huge_amounts_are_summed,
            listings_are_ordered,
            unknown_branch_is_empty,
            customer_expenses_by_name,
        ]);
    };
}

all_backend_tests!(memory, Arc::new(InMemoryStore::new()));
all_backend_tests!(sqlite, Arc::new(SqliteStore::new(":memory:").unwrap()));
