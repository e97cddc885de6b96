use std::{cmp::Ordering, collections::BTreeMap, fmt::Display};

use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod fields;
pub mod records;

/// A stored document. Field order is not significant.
pub type Document = serde_json::Map<String, Value>;

/// Field holding the store-assigned identity of every document.
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Branches,
    BranchEntries,
    Expenses,
    CustomerExpenses,
    EmployeeExpenses,
    Employees,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Branches,
        Collection::BranchEntries,
        Collection::Expenses,
        Collection::CustomerExpenses,
        Collection::EmployeeExpenses,
        Collection::Employees,
    ];

    /// Name of the collection (or table partition) in the store.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Branches => "branches",
            Collection::BranchEntries => "branchentries",
            Collection::Expenses => "expenses",
            Collection::CustomerExpenses => "customerexpenses",
            Collection::EmployeeExpenses => "employeeexpenses",
            Collection::Employees => "employees",
        }
    }

    /// Singular entity name, used in error messages.
    pub fn entity(self) -> &'static str {
        match self {
            Collection::Branches => "Branch",
            Collection::BranchEntries => "BranchEntry",
            Collection::Expenses => "Expense",
            Collection::CustomerExpenses => "CustomerExpense",
            Collection::EmployeeExpenses => "EmployeeExpense",
            Collection::Employees => "Employee",
        }
    }

    /// Field matched by keyed reads (`GET /api/<plural>/<key>`).
    pub fn key_field(self) -> &'static str {
        match self {
            Collection::Branches => "name",
            Collection::CustomerExpenses => "customerName",
            Collection::BranchEntries
            | Collection::Expenses
            | Collection::EmployeeExpenses
            | Collection::Employees => "branch",
        }
    }

    pub fn default_sort(self) -> Sort {
        match self {
            Collection::Branches | Collection::Employees => Sort::ascending("name"),
            _ => Sort::descending("date"),
        }
    }

    pub fn unique_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Branches => &["name"],
            _ => &[],
        }
    }

    pub fn timestamp_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Branches => &[],
            Collection::Employees => &["joiningDate", "createdAt"],
            _ => &["date"],
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: &'static str) -> Self {
        Self { field, direction: SortDirection::Ascending }
    }

    pub fn descending(field: &'static str) -> Self {
        Self { field, direction: SortDirection::Descending }
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ord = compare_values(a.get(self.field), b.get(self.field));
        match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Cross-type order: missing and null first, then numbers, strings, objects, arrays, booleans.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// String equality on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: &'static str,
    pub value: String,
}

impl Condition {
    pub fn matches(&self, doc: &Document) -> bool {
        matches!(doc.get(self.field), Some(Value::String(s)) if *s == self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub sort: Sort,
}

impl Query {
    pub fn all(sort: Sort) -> Self {
        Self { conditions: Vec::new(), sort }
    }

    pub fn filter(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.conditions.push(Condition { field, value: value.into() });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

/// Sum of `sum_field` grouped by the calendar day of `day_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub conditions: Vec<Condition>,
    pub day_field: &'static str,
    pub sum_field: &'static str,
}

impl Aggregation {
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// Buckets already-loaded documents. Non-numeric amounts count as zero; documents
    /// without a day are skipped.
    pub fn apply<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<DayTotal> {
        let mut totals = DayTotals::default();
        for doc in docs.into_iter().filter(|d| self.matches(d)) {
            let day = match doc.get(self.day_field).and_then(Value::as_str).and_then(fields::day_key) {
                Some(day) => day,
                None => continue,
            };
            let amount = doc.get(self.sum_field).and_then(Value::as_f64).unwrap_or(0.0);
            totals.add(day, amount);
        }
        totals.finish()
    }
}

/// Running sum for one day. Stays an exact decimal while every amount and the running
/// total fit in `Decimal`, then continues in `f64`.
#[derive(Debug, Clone, Copy)]
enum DaySum {
    Exact(Decimal),
    Approximate(f64),
}

impl DaySum {
    fn add(self, amount: f64) -> Self {
        match self {
            DaySum::Exact(sum) => match Decimal::from_f64(amount).and_then(|a| sum.checked_add(a)) {
                Some(sum) => DaySum::Exact(sum),
                None => DaySum::Approximate(sum.to_f64().unwrap_or_default() + amount),
            },
            DaySum::Approximate(sum) => DaySum::Approximate(sum + amount),
        }
    }

    fn value(self) -> f64 {
        match self {
            DaySum::Exact(sum) => sum.to_f64().unwrap_or_default(),
            DaySum::Approximate(sum) => sum,
        }
    }
}

/// Per-day accumulator shared by the stores that sum on the client side.
#[derive(Debug, Default)]
pub struct DayTotals {
    days: BTreeMap<String, DaySum>,
}

impl DayTotals {
    pub fn add(&mut self, day: &str, amount: f64) {
        let sum = self.days.get(day).copied().unwrap_or(DaySum::Exact(Decimal::ZERO));
        self.days.insert(day.to_string(), sum.add(amount));
    }

    /// Totals in ascending day order.
    pub fn finish(self) -> Vec<DayTotal> {
        self.days
            .into_iter()
            .map(|(day, sum)| DayTotal { day, total: sum.value() })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTotal {
    pub day: String,
    #[serde(with = "fields::numeric")]
    pub total: f64,
}
