use std::sync::Arc;

use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Extension, Form, Query,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chat_core::{ChatCore, DispatchError, SessionStore};
use protocol::{ChatForm, DispatchAck, ErrorBody, StatusQuery, StatusReply};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const SESSION_COOKIE: &str = "chat_session";

const CHAT_PAGE: &str = include_str!("../static/chat.html");

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ChatCore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/get", get(dispatch).post(dispatch))
        .route("/status", get(status))
        .route("/chat", post(chat))
        .route("/session", delete(reset_session))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

/// JSON error for synchronous handler failures.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, body: ErrorBody::new("bad_request", detail) }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let (status, code) = match &err {
            DispatchError::EmptyMessage => (StatusCode::BAD_REQUEST, "empty_message"),
            DispatchError::DuplicateRequest(_) => (StatusCode::CONFLICT, "duplicate_request"),
            DispatchError::QueueFull => (StatusCode::SERVICE_UNAVAILABLE, "busy"),
            DispatchError::ShutDown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
        };
        Self { status, body: ErrorBody::new(code, err.to_string()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Session id from the cookie, issuing a new one on first contact.
fn session(jar: CookieJar) -> (CookieJar, String) {
    if let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        if !id.is_empty() {
            return (jar, id);
        }
    }
    let id = SessionStore::generate_id();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    info!(session = %id, "new session");
    (jar.add(cookie), id)
}

async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn dispatch(
    Extension(state): Extension<AppState>,
    jar: CookieJar,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Result<(CookieJar, Json<DispatchAck>), ApiError> {
    let Form(form) = form.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (jar, session_id) = session(jar);
    let ack = state.core.dispatch(&session_id, &form.msg, form.request_id)?;
    Ok((jar, Json(ack)))
}

async fn status(
    Extension(state): Extension<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<StatusReply>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request_id = query
        .request_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing request_id"))?;
    Ok(Json(state.core.poll(request_id.trim())))
}

async fn chat(
    Extension(state): Extension<AppState>,
    jar: CookieJar,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Result<(CookieJar, Json<StatusReply>), ApiError> {
    let Form(form) = form.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (jar, session_id) = session(jar);
    let reply = state.core.respond_now(&session_id, &form.msg).await?;
    Ok((jar, Json(reply)))
}

async fn reset_session(Extension(state): Extension<AppState>, jar: CookieJar) -> StatusCode {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.core.reset_session(cookie.value());
    }
    StatusCode::NO_CONTENT
}

async fn health_check(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "jobs": state.core.jobs().len(),
        "sessions": state.core.sessions().len(),
    }))
}
