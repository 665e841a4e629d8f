//! HTTP surface over a task store.
//!
//! JSON throughout; any conforming [`TaskStore`] can sit behind it, so the
//! same server fronts an in-memory store in tests and a durable one in
//! production. Auth is an opaque collaborator: an injected token validator,
//! no session protocol here.

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::{ErrorCode, StoreError};
use crate::filter::{StatusFilter, TaskFilter};
use crate::store::TaskStore;
use crate::types::{
    Change, ChangeOp, Quadrant, SyncRequest, SyncResponse, Task, TaskCreate, TaskPatch,
};

/// Validates bearer tokens presented by clients. Token issuance and expiry
/// live with the auth collaborator, not here.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

/// Accepts exactly one configured token.
pub struct StaticTokenValidator(pub String);

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> bool {
        token == self.0
    }
}

/// Server state shared across handlers.
#[derive(Clone)]
pub struct ApiServer {
    store: Arc<dyn TaskStore>,
    auth: Option<Arc<dyn TokenValidator>>,
}

impl ApiServer {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store, auth: None }
    }

    pub fn with_auth(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.auth = Some(validator);
        self
    }
}

/// JSON error payload: `{code, message}`.
#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::DuplicateId(_) => StatusCode::CONFLICT,
            StoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            StoreError::Network(_) => StatusCode::BAD_GATEWAY,
            StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Query parameters of `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    quadrant: Option<u8>,
    status: Option<String>,
    search: Option<String>,
    /// Comma-separated tag list; matches on non-empty intersection.
    tags: Option<String>,
}

fn build_filter(query: &ListQuery) -> ApiResult<TaskFilter> {
    let mut filter = TaskFilter::new();
    if let Some(raw) = query.quadrant {
        filter = filter.in_quadrant(Quadrant::try_from(raw)?);
    }
    if let Some(status) = &query.status {
        filter = filter.with_status(status.parse::<StatusFilter>()?);
    }
    if let Some(search) = &query.search {
        filter = filter.matching(search.clone());
    }
    if let Some(tags) = &query.tags {
        let tags: BTreeSet<String> = tags
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !tags.is_empty() {
            filter = filter.with_tags(tags);
        }
    }
    Ok(filter)
}

async fn list_tasks(
    State(state): State<ApiServer>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let filter = build_filter(&query)?;
    let tasks = state.store.fetch_tasks().await?;
    Ok(Json(filter.apply(&tasks)))
}

async fn list_tasks_in_quadrant(
    State(state): State<ApiServer>,
    Path(quadrant): Path<u8>,
) -> ApiResult<Json<Vec<Task>>> {
    let quadrant = Quadrant::try_from(quadrant)?;
    Ok(Json(state.store.fetch_in_quadrant(quadrant).await?))
}

async fn create_task(
    State(state): State<ApiServer>,
    Json(input): Json<TaskCreate>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = input.into_task()?;
    let created = state.store.create_task(task).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_task(
    State(state): State<ApiServer>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Json<Task>> {
    let mut task = state
        .store
        .get_task(id)
        .await?
        .ok_or(StoreError::TaskNotFound(id))?;
    patch.apply_to(&mut task);
    let updated = state.store.update_task(task).await?;
    Ok(Json(updated))
}

#[derive(Deserialize)]
struct QuadrantBody {
    quadrant: u8,
}

async fn update_task_quadrant(
    State(state): State<ApiServer>,
    Path(id): Path<Uuid>,
    Json(body): Json<QuadrantBody>,
) -> ApiResult<Json<MessageResponse>> {
    let quadrant = Quadrant::try_from(body.quadrant)?;
    let mut task = state
        .store
        .get_task(id)
        .await?
        .ok_or(StoreError::TaskNotFound(id))?;
    task.quadrant = quadrant;
    state.store.update_task(task).await?;
    Ok(Json(MessageResponse {
        message: "quadrant updated".into(),
    }))
}

async fn delete_task(
    State(state): State<ApiServer>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state.store.delete_task(id).await?;
    Ok(Json(MessageResponse {
        message: "task deleted".into(),
    }))
}

/// Apply a batch of client changes, absorbing replays of already-applied
/// entries, then report everything changed since the client's mark.
async fn post_sync(
    State(state): State<ApiServer>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<SyncResponse>> {
    for change in &request.changes {
        apply_change(state.store.as_ref(), change).await?;
    }
    let tasks = state
        .store
        .fetch_changed_since(request.last_sync_time)
        .await?;
    Ok(Json(SyncResponse { tasks }))
}

async fn apply_change(store: &dyn TaskStore, change: &Change) -> ApiResult<()> {
    match change.op {
        ChangeOp::Create => {
            let task = change
                .task
                .clone()
                .ok_or_else(|| StoreError::Validation("create change without task".into()))?;
            match store.create_task(task.clone()).await {
                Err(StoreError::DuplicateId(_)) => {
                    store.update_task(task).await?;
                }
                other => {
                    other?;
                }
            }
        }
        ChangeOp::Update => {
            let task = change
                .task
                .clone()
                .ok_or_else(|| StoreError::Validation("update change without task".into()))?;
            match store.update_task(task.clone()).await {
                Err(StoreError::TaskNotFound(_)) => {
                    store.create_task(task).await?;
                }
                other => {
                    other?;
                }
            }
        }
        ChangeOp::Delete => match store.delete_task(change.task_id).await {
            Err(StoreError::TaskNotFound(_)) => {}
            other => other?,
        },
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncQuery {
    last_sync_time: i64,
}

async fn get_sync(
    State(state): State<ApiServer>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<Json<SyncResponse>> {
    let tasks = state.store.fetch_changed_since(query.last_sync_time).await?;
    Ok(Json(SyncResponse { tasks }))
}

/// Reject requests without a valid bearer token when a validator is set.
async fn require_auth(State(state): State<ApiServer>, request: Request, next: Next) -> Response {
    if let Some(validator) = &state.auth {
        let authorized = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| validator.validate(token));
        if !authorized {
            return ApiError(StoreError::Unauthorized).into_response();
        }
    }
    next.run(request).await
}

/// Build the router with all routes.
fn build_router(state: ApiServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/quadrant/{quadrant}", get(list_tasks_in_quadrant))
        .route(
            "/tasks/{id}",
            put(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/quadrant", put(update_task_quadrant))
        .route("/sync", post(post_sync).get(get_sync))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the specified port (0 picks a free one).
///
/// Returns a oneshot sender that signals shutdown, and the bound address.
pub async fn start_server(
    state: ApiServer,
    port: u16,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("task API listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("task API shutting down");
            })
            .await
        {
            tracing::error!("task API server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
