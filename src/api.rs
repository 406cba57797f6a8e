// 🌐 HTTP API - axum routes generated from the resource table
//
//   GET    /{resource}          list
//   POST   /{resource}          create
//   GET    /{resource}/:id      get
//   PUT    /{resource}/:id      update
//   DELETE /{resource}/:id      delete
//   POST   /work_order/:id      generate purchase orders from a work
//   GET    /health

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json,
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::{Authenticator, Principal};
use crate::db::Record;
use crate::error::{BackofficeError, Result};
use crate::resources::{ListParams, ResourceDescriptor, RESOURCES};
use crate::work_order::{generate_orders, WorkOrderRequest};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(conn: Connection, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            auth,
        }
    }

    /// A panicked request never leaves a transaction open, so a poisoned
    /// lock is still safe to use
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn principal(&self, headers: &HeaderMap) -> Result<Principal> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);
        self.auth.authenticate(bearer)
    }
}

fn object_body(body: Value) -> Result<Record> {
    match body {
        Value::Object(record) => Ok(record),
        _ => Err(BackofficeError::validation("request body must be a JSON object")),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(health_check));

    for resource in RESOURCES {
        router = router
            .route(
                &format!("/{}", resource.name),
                get(move |state: State<AppState>, headers: HeaderMap, params: Query<ListParams>| {
                    list(resource, state, headers, params)
                })
                .post(move |state: State<AppState>, headers: HeaderMap, body: Json<Value>| {
                    create(resource, state, headers, body)
                }),
            )
            .route(
                &format!("/{}/:id", resource.name),
                get(move |state: State<AppState>, headers: HeaderMap, id: Path<i64>| {
                    fetch(resource, state, headers, id)
                })
                .put(
                    move |state: State<AppState>, headers: HeaderMap, id: Path<i64>, body: Json<Value>| {
                        update(resource, state, headers, id, body)
                    },
                )
                .delete(move |state: State<AppState>, headers: HeaderMap, id: Path<i64>| {
                    delete(resource, state, headers, id)
                }),
            );
    }

    router
        .route("/work_order/:id", post(work_order))
        .with_state(state)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health - Health check
async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok", "version": crate::VERSION}))
}

async fn list(
    resource: &'static ResourceDescriptor,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Record>>> {
    state.principal(&headers)?;
    let conn = state.conn();
    Ok(Json(resource.list(&conn, &params)?))
}

async fn create(
    resource: &'static ResourceDescriptor,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Record>> {
    let principal = state.principal(&headers)?;
    let payload = object_body(body)?;
    let mut conn = state.conn();
    Ok(Json(resource.create(&mut conn, &principal, &payload)?))
}

async fn fetch(
    resource: &'static ResourceDescriptor,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Record>> {
    state.principal(&headers)?;
    let conn = state.conn();
    Ok(Json(resource.get(&conn, id)?))
}

async fn update(
    resource: &'static ResourceDescriptor,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<Record>> {
    let principal = state.principal(&headers)?;
    let payload = object_body(body)?;
    let mut conn = state.conn();
    Ok(Json(resource.update(&mut conn, &principal, id, &payload)?))
}

async fn delete(
    resource: &'static ResourceDescriptor,
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let principal = state.principal(&headers)?;
    let mut conn = state.conn();
    let message = resource.delete(&mut conn, &principal, id)?;
    Ok(Json(json!({ "message": message })))
}

/// POST /work_order/:id - one purchase order per provider
async fn work_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<Record>>> {
    let principal = state.principal(&headers)?;
    let request: WorkOrderRequest = serde_json::from_value(body)
        .map_err(|e| BackofficeError::validation(format!("invalid work order request: {}", e)))?;
    let mut conn = state.conn();
    Ok(Json(generate_orders(&mut conn, &principal, id, &request)?))
}

// ============================================================================
// TESTS
// ============================================================================
