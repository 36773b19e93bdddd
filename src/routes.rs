use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State, WebSocketUpgrade,
        multipart::MultipartError, rejection::JsonRejection,
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::error::{PasswordError, SessionError};
use crate::intake::FileSource;
use crate::session::Snapshot;
use crate::state::AppState;
use crate::tree::TreeLine;
use crate::ws;

const UPLOAD_LIMIT: usize = 32 * 1024 * 1024;

pub fn router(state: AppState, allow_origin: Option<HeaderValue>) -> Router {
    let mut app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/state", get(current_state))
        .route("/api/files", post(upload))
        .route("/api/files/{id}", delete(remove_file))
        .route("/api/files/{id}/select", post(select_file))
        .route("/api/reset", post(reset))
        .route("/api/password", post(submit_password))
        .route("/api/password/skip", post(skip_password))
        .route("/api/password/retry", post(retry_password))
        .route("/api/tree", get(tree))
        .route("/api/tree/toggle", post(toggle))
        .route("/api/tree/collapse", post(collapse))
        .route("/api/tree/expand", post(expand))
        .route("/ws/state", get(ws_state))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = allow_origin {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    app.with_state(state)
}

/// JSON error body `{ "error": "..." }` with a matching status.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::UnknownEntry(_) => StatusCode::NOT_FOUND,
            SessionError::Password(PasswordError::EmptySecret) => StatusCode::BAD_REQUEST,
            SessionError::NotReadable(_)
            | SessionError::NothingSelected
            | SessionError::NoBundle
            | SessionError::Password(_) => StatusCode::CONFLICT,
            SessionError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self(StatusCode::BAD_REQUEST, err.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(err.status(), err.body_text())
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn current_state(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.session.snapshot())
}

/// Every multipart part carrying a filename becomes one entry of a single batch.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut sources = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let bytes = field.bytes().await?;
        sources.push(FileSource::Memory { name, bytes });
    }

    if sources.is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "no file provided".into()));
    }

    info!(files = sources.len(), "Upload received");
    let ids = state.session.submit(sources).await?;
    Ok(Json(serde_json::json!({ "ids": ids })))
}

pub async fn remove_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.session.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Snapshot>, ApiError> {
    state.session.select(&id).await?;
    Ok(Json(state.session.snapshot()))
}

pub async fn reset(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    state.session.reset().await?;
    Ok(Json(state.session.snapshot()))
}

#[derive(Deserialize)]
pub struct PasswordBody {
    password: String,
}

pub async fn submit_password(
    State(state): State<AppState>,
    body: Result<Json<PasswordBody>, JsonRejection>,
) -> Result<Json<Snapshot>, ApiError> {
    let Json(body) = body?;
    state.session.submit_password(&body.password).await?;
    Ok(Json(state.session.snapshot()))
}

pub async fn skip_password(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    state.session.skip_password().await?;
    Ok(Json(state.session.snapshot()))
}

pub async fn retry_password(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    state.session.retry_password().await?;
    Ok(Json(state.session.snapshot()))
}

pub async fn tree(State(state): State<AppState>) -> Result<Json<Vec<TreeLine>>, ApiError> {
    Ok(Json(state.session.tree().await?))
}

#[derive(Deserialize)]
pub struct PathBody {
    path: String,
}

fn collapse_state(path: String, collapsed: bool) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "path": path, "collapsed": collapsed }))
}

pub async fn toggle(
    State(state): State<AppState>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;
    let collapsed = state.session.toggle(&body.path).await?;
    Ok(collapse_state(body.path, collapsed))
}

pub async fn collapse(
    State(state): State<AppState>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;
    state.session.collapse(&body.path).await?;
    Ok(collapse_state(body.path, true))
}

pub async fn expand(
    State(state): State<AppState>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;
    state.session.expand(&body.path).await?;
    Ok(collapse_state(body.path, false))
}

pub async fn ws_state(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::stream_state(socket, state))
}
