//! REST API for travel records using Axum.
//!
//! - `POST /api/login` exchanges demo credentials for a bearer token.
//! - `/api/records` and `/api/records/:id` expose list/create/upsert/patch/delete.
//!   Every record route requires a valid token; DELETE also requires `admin`.
//! - `GET /health` for liveness checks.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, OriginalUri, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Form, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{TokenService, UserDirectory};
use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::middleware::{require_authenticated, require_role, RoleGuard};
use crate::models::{Claims, LoginRequest, LoginResponse, Role};
use crate::repository::{ListQuery, RecordRepository, UpsertOutcome};
use crate::storage::{Document, Storage, ID_FIELD};
use crate::validation::{validate_create, validate_identifier};

/// Shared app state for REST handlers (Arc-wrapped for concurrency).
/// Immutable after startup; the store is the only synchronisation point.
pub struct AppState {
    pub repository: RecordRepository,
    pub tokens: Arc<TokenService>,
    pub users: UserDirectory,
}

/// Request body accepted as JSON or urlencoded form.
///
/// Bodies with any other (or no) content type are treated as empty. Form
/// fields are flat strings; a repeated key collects into an array.
pub struct RequestBody(pub Document);

#[async_trait]
impl<S> FromRequest<S> for RequestBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| ApiError::MalformedBody(e.body_text()))?;
            if bytes.is_empty() {
                return Ok(Self(Document::new()));
            }
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(doc)) => Ok(Self(doc)),
                Ok(_) => Err(ApiError::MalformedBody(
                    "request body must be a JSON object".to_string(),
                )),
                Err(e) => Err(ApiError::MalformedBody(e.to_string())),
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::MalformedBody(e.body_text()))?;
            Ok(Self(flat_document(pairs)))
        } else {
            Ok(Self(Document::new()))
        }
    }
}

fn flat_document(pairs: Vec<(String, String)>) -> Document {
    let mut doc = Document::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match doc.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                doc.insert(key, value);
            }
        }
    }
    doc
}

/// Create the Axum router for the records API
pub fn create_router(config: &AppConfig, storage: Storage) -> Router {
    let tokens = Arc::new(TokenService::new(&config.jwt_secret, config.token_ttl));
    let state = Arc::new(AppState {
        repository: RecordRepository::new(Arc::new(storage)),
        tokens: tokens.clone(),
        users: UserDirectory::new(config.users.clone()),
    });

    let admin_only = RoleGuard {
        role: Role::Admin,
        tokens,
    };

    let record_routes = Router::new()
        .route("/records", get(list_records).post(create_record))
        .route(
            "/records/:id",
            put(upsert_record).patch(patch_record).merge(
                delete(delete_record)
                    .route_layer(middleware::from_fn_with_state(admin_only, require_role)),
            ),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_authenticated));

    let api = Router::new()
        .route("/login", post(login_handler))
        .merge(record_routes);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    RequestBody(body): RequestBody,
) -> Result<Json<LoginResponse>, ApiError> {
    // Non-string credentials simply fail to match.
    let credentials: LoginRequest = serde_json::from_value(Value::Object(body)).unwrap_or_default();

    let user = state
        .users
        .authenticate(&credentials.username, &credentials.password)
        .ok_or_else(|| {
            tracing::warn!(username = %credentials.username, "login rejected");
            ApiError::InvalidCredentials
        })?;

    let token = state.tokens.issue(user)?;
    tracing::info!(username = %user.username, role = %user.role, "login succeeded");
    Ok(Json(LoginResponse { token }))
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let query = ListQuery::from_pairs(&params);
    let page = state.repository.list(&query)?;

    Ok(Json(json!({
        "meta": page.meta,
        "data": page.items,
        "links": { "self": uri.to_string() },
    })))
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    RequestBody(body): RequestBody,
) -> Result<impl IntoResponse, ApiError> {
    validate_create(&body)?;

    let record = state.repository.create(body)?;
    let id = record_id(&record);
    tracing::info!(record_id = %id, username = %claims.username, "record created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/records/{}", id))],
        Json(json!({ "meta": id, "data": record })),
    ))
}

async fn upsert_record(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    RequestBody(body): RequestBody,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = validate_identifier(&raw_id)?;

    let (status, record) = match state.repository.upsert_by_id(&id, body)? {
        UpsertOutcome::Replaced(record) => (StatusCode::OK, record),
        UpsertOutcome::Inserted(record) => {
            tracing::info!(requested_id = %id, record_id = %record_id(&record), "upsert inserted new record");
            (StatusCode::CREATED, record)
        }
    };

    let id = record_id(&record);
    Ok((status, Json(json!({ "meta": { "_id": id }, "data": record }))))
}

async fn patch_record(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    RequestBody(body): RequestBody,
) -> Result<Json<Value>, ApiError> {
    let id = validate_identifier(&raw_id)?;
    let record = state.repository.patch_by_id(&id, body)?;
    Ok(Json(json!({ "meta": { "_id": id.as_str() }, "data": record })))
}

async fn delete_record(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = validate_identifier(&raw_id)?;
    state.repository.delete_by_id(&id)?;
    tracing::info!(record_id = %id, username = %claims.username, "record deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn record_id(record: &Document) -> String {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
