use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use branchbook::bookkeeper::Bookkeeper;
use branchbook::storage::{InMemoryStore, RecordStore, SqliteStore};
use branchbook_core::{Collection, SortDirection};

const CATEGORIES: [&str; 4] = ["Petrol", "Office Exp.", "Salary", "Bank"];

fn setup(store: Arc<dyn RecordStore>) -> Bookkeeper {
    let book = Bookkeeper::new(store);

    // 1,000 expenses spread over April, 30 days, 4 categories
    for i in 0..1000 {
        book.create(
            Collection::Expenses,
            json!({
                "category": CATEGORIES[i % CATEGORIES.len()],
                "month": "April",
                "amount": 100 + i,
                "date": format!("2024-04-{:02}T{:02}:00:00Z", i % 30 + 1, i % 24),
            }),
        )
        .unwrap();
    }
    book
}

fn bench_list_month(c: &mut Criterion) {
    let book = setup(Arc::new(InMemoryStore::new()));
    c.bench_function("memory_list_month_desc", |b| {
        b.iter(|| book.expenses_for_month(black_box("April"), SortDirection::Descending).unwrap())
    });
    c.bench_function("memory_list_category_month", |b| {
        b.iter(|| book.expenses_for(black_box("Petrol"), black_box("April")).unwrap())
    });
}

fn bench_daily_totals(c: &mut Criterion) {
    let book = setup(Arc::new(InMemoryStore::new()));
    c.bench_function("memory_daily_totals", |b| {
        b.iter(|| book.daily_totals(black_box("Petrol"), black_box("April")).unwrap())
    });

    let book = setup(Arc::new(SqliteStore::new(":memory:").unwrap()));
    c.bench_function("sqlite_daily_totals", |b| {
        b.iter(|| book.daily_totals(black_box("Petrol"), black_box("April")).unwrap())
    });
}

fn bench_create(c: &mut Criterion) {
    let book = Bookkeeper::new(Arc::new(InMemoryStore::new()));
    c.bench_function("memory_create_expense", |b| {
        b.iter(|| {
            book.create(
                Collection::Expenses,
                black_box(json!({ "category": "Petrol", "month": "April", "amount": 5000, "date": "2024-04-15" })),
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_list_month, bench_daily_totals, bench_create);
criterion_main!(benches);
