use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, MatchedPath, Path, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};

use branchbook_core::{Collection, DayTotal, Document, SortDirection};

use crate::{bookkeeper::Bookkeeper, error::ApiError, storage::StorageError};

#[derive(Clone)]
pub struct AppState {
    pub book: Arc<Bookkeeper>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(book: Arc<Bookkeeper>) -> Self {
        Self { book, metrics: None }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

type JsonBody = Result<Json<Value>, JsonRejection>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/test", get(connectivity))
        .route("/metrics", get(render_metrics))
        .route("/api/branches", collection_root(Collection::Branches))
        .route("/api/branches/:key", collection_item(Collection::Branches))
        .route("/api/branch-entries", collection_root(Collection::BranchEntries))
        .route("/api/branch-entries/:key", collection_item(Collection::BranchEntries))
        .route("/api/customer-expenses", collection_root(Collection::CustomerExpenses))
        .route("/api/customer-expenses/:key", collection_item(Collection::CustomerExpenses))
        .route("/api/employee-expenses", collection_root(Collection::EmployeeExpenses))
        .route("/api/employee-expenses/:key", collection_item(Collection::EmployeeExpenses))
        .route("/api/employees", collection_root(Collection::Employees))
        .route("/api/employees/:key", collection_item(Collection::Employees))
        .route("/api/expenses", collection_root(Collection::Expenses))
        .route(
            "/api/expenses/:key",
            get(expenses_for_month_desc)
                .put(move |state: State<AppState>, Path(id): Path<String>, body: JsonBody| {
                    update(state, Collection::Expenses, id, body)
                })
                .delete(move |state: State<AppState>, Path(id): Path<String>| {
                    remove(state, Collection::Expenses, id)
                }),
        )
        .route("/api/expenses/all/:month", get(expenses_for_month_asc))
        .route(
            "/api/expenses/branch/:branch",
            get(move |state: State<AppState>, Path(branch): Path<String>| {
                list_by_key(state, Collection::Expenses, branch)
            }),
        )
        .route("/api/expenses/total/:category/:month", get(daily_totals))
        .route("/api/expenses/:key/:month", get(expenses_for))
        .fallback(not_found)
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// `GET` lists everything, `POST` creates.
fn collection_root(collection: Collection) -> MethodRouter<AppState> {
    get(move |state: State<AppState>| list_all(state, collection))
        .post(move |state: State<AppState>, body: JsonBody| create(state, collection, body))
}

/// `GET` filters by the collection's key field; `PUT` and `DELETE` address one identity.
fn collection_item(collection: Collection) -> MethodRouter<AppState> {
    get(move |state: State<AppState>, Path(key): Path<String>| list_by_key(state, collection, key))
        .put(move |state: State<AppState>, Path(id): Path<String>, body: JsonBody| {
            update(state, collection, id, body)
        })
        .delete(move |state: State<AppState>, Path(id): Path<String>| remove(state, collection, id))
}

/// Store calls block, so they run on tokio's blocking pool.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Bookkeeper) -> Result<T, StorageError> + Send + 'static,
{
    let book = state.book.clone();
    tokio::task::spawn_blocking(move || f(&book))
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn body_or_bad_request(body: JsonBody) -> Result<Value, ApiError> {
    body.map(|Json(v)| v).map_err(|e| ApiError::BadRequest(e.body_text()))
}

async fn health() -> &'static str {
    "Expense backend is running"
}

async fn connectivity(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    blocking(&state, |book| book.store().count(Collection::Branches)).await?;
    Ok(Json(json!({ "status": "Database connected" })))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], handle.render()).into_response(),
        None => ApiError::NotFound("Metrics are not enabled".to_string()).into_response(),
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}

async fn list_all(State(state): State<AppState>, collection: Collection) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = blocking(&state, move |book| book.list_all(collection)).await?;
    Ok(Json(docs))
}

async fn list_by_key(
    State(state): State<AppState>,
    collection: Collection,
    key: String,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = blocking(&state, move |book| book.list_by_key(collection, &key)).await?;
    Ok(Json(docs))
}

async fn create(
    State(state): State<AppState>,
    collection: Collection,
    body: JsonBody,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let body = body_or_bad_request(body)?;
    let doc = blocking(&state, move |book| book.create(collection, body)).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn update(
    State(state): State<AppState>,
    collection: Collection,
    id: String,
    body: JsonBody,
) -> Result<Json<Document>, ApiError> {
    let body = body_or_bad_request(body)?;
    let doc = blocking(&state, move |book| book.update(collection, &id, body)).await?;
    Ok(Json(doc))
}

async fn remove(State(state): State<AppState>, collection: Collection, id: String) -> Result<Json<Value>, ApiError> {
    blocking(&state, move |book| book.remove(collection, &id)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn expenses_for(
    State(state): State<AppState>,
    Path((category, month)): Path<(String, String)>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = blocking(&state, move |book| book.expenses_for(&category, &month)).await?;
    Ok(Json(docs))
}

async fn expenses_for_month_desc(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = blocking(&state, move |book| book.expenses_for_month(&month, SortDirection::Descending)).await?;
    Ok(Json(docs))
}

async fn expenses_for_month_asc(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = blocking(&state, move |book| book.expenses_for_month(&month, SortDirection::Ascending)).await?;
    Ok(Json(docs))
}

async fn daily_totals(
    State(state): State<AppState>,
    Path((category, month)): Path<(String, String)>,
) -> Result<Json<Vec<DayTotal>>, ApiError> {
    let totals = blocking(&state, move |book| book.daily_totals(&category, &month)).await?;
    Ok(Json(totals))
}

async fn track_requests(req: Request<Body>, next: Next<Body>) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    tracing::info!(%method, %path, status, elapsed_ms = elapsed.as_millis() as u64, "Handled request");
    metrics::increment_counter!(
        "branchbook_http_requests_total",
        "method" => method,
        "route" => route.clone(),
        "status" => status.to_string()
    );
    metrics::histogram!("branchbook_http_request_duration_seconds", elapsed.as_secs_f64(), "route" => route);

    response
}
