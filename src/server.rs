//!
//! userposts HTTP server
//! ---------------------
//! This module defines the axum-based HTTP API for userposts.
//!
//! Responsibilities:
//! - Session management with a simple cookie + CSRF token model.
//! - Sign-up, login and logout endpoints backed by the identity module.
//! - Post creation/deletion gated by the explicit authenticate-then-authorize
//!   pipeline, with denials carrying a login location and the original
//!   destination.
//! - Public listing endpoints: per-author, global (optional limit), the feed
//!   projection and the remaining-post count.
//!
//! Handlers only parse input, build a `RequestContext` and render the plain
//! data or named outcome returned by the services.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use getrandom::getrandom;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::AppError;
use crate::identity::{
    AuthProvider, LocalAuthProvider, LoginRequest, PlaintextVerifier, Principal, RequestContext,
    SessionManager,
};
use crate::posts;
use crate::storage::{NewUser, SharedStore};

const SESSION_COOKIE: &str = "userposts_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: Arc<SessionManager>,
    pub auth: Arc<LocalAuthProvider>,
    /// Session token -> CSRF token mapping
    pub csrf_tokens: Arc<RwLock<HashMap<String, String>>>,
}

/// Start the userposts HTTP server bound to the given port, with the store
/// rooted at `db_root`.
pub async fn run_with_port(http_port: u16, db_root: &str) -> anyhow::Result<()> {
    let store = SharedStore::new(db_root)?;
    let app = build_router(store);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point using the default port 7878 and db root "dbs".
pub async fn run() -> anyhow::Result<()> {
    run_with_port(7878, "dbs").await
}

/// Mount all routes over a fresh session/auth state for the given store.
pub fn build_router(store: SharedStore) -> Router {
    let sessions = Arc::new(SessionManager::default());
    let auth = Arc::new(LocalAuthProvider::new(
        store.clone(),
        sessions.clone(),
        Arc::new(PlaintextVerifier),
    ));
    let state = AppState {
        store,
        sessions,
        auth,
        csrf_tokens: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route("/", get(index_all_handler))
        .route("/login", post(login))
        .route("/logout", delete(logout))
        .route("/csrf", get(get_csrf))
        .route("/users", post(sign_up).get(users_index))
        .route("/users/{user_id}/posts", get(posts_index).post(posts_create))
        .route(
            "/users/{user_id}/posts/{id}",
            get(posts_show).delete(posts_destroy),
        )
        .route("/posts", get(index_all_handler))
        .route("/posts/more_posts", get(more_posts_handler))
        .with_state(state)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let raw = cookie.to_str().ok()?;
    for part in raw.split(';') {
        let pair = part.trim();
        if let Some(eq) = pair.find('=') {
            let (key, value) = pair.split_at(eq);
            if key == name {
                return Some(value[1..].to_string());
            }
        }
    }
    None
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

fn current_principal(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let token = session_token(headers)?;
    state.sessions.validate(&token)
}

fn request_context<S: Into<String>>(state: &AppState, headers: &HeaderMap, path: S) -> RequestContext {
    RequestContext {
        principal: current_principal(state, headers),
        path: path.into(),
    }
}

fn set_session_cookie(token: &str) -> HeaderValue {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/",
        SESSION_COOKIE, token
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

fn gen_csrf() -> String {
    let mut bytes = [0u8; 32];
    let _ = getrandom(&mut bytes);
    let mut out = String::with_capacity(64);
    use std::fmt::Write as _;
    for byte in &bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

async fn validate_csrf(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(token) = session_token(headers) else {
        return false;
    };
    let Some(provided) = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
    else {
        return false;
    };
    let map = state.csrf_tokens.read().await;
    match map.get(&token) {
        Some(expected) => expected == &provided,
        None => false,
    }
}

/// Render a named failure outcome. Auth denials additionally carry the login
/// location with the original destination attached for resumption.
fn error_response(err: AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let location = err
        .return_to()
        .map(|rt| format!("/login?return_to={}", urlencoding::encode(rt)));
    let mut body = json!({"status": "error", "message": err.to_string(), "error": err});
    if let Some(loc) = location {
        body["location"] = json!(loc);
    }
    (status, Json(body))
}

/// Blank or unparseable limits mean "no limit".
fn parse_limit(raw: Option<&str>) -> Option<usize> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
}

#[derive(Debug, Deserialize)]
struct SignUpPayload {
    username: String,
    password: String,
    full_name: String,
    phone: String,
}

// POST /users
//
// Sign-up doubles as login: the fresh user gets a session right away.
async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpPayload>,
) -> impl IntoResponse {
    let created = {
        let guard = state.store.0.lock();
        guard.create_user(NewUser {
            username: payload.username,
            password: payload.password,
            full_name: payload.full_name,
            phone: payload.phone,
        })
    };
    match created {
        Ok(user) => {
            let session = state.sessions.issue(Principal::from(&user));
            let csrf = gen_csrf();
            state
                .csrf_tokens
                .write()
                .await
                .insert(session.token.clone(), csrf);
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", set_session_cookie(&session.token));
            (
                StatusCode::CREATED,
                headers,
                Json(json!({"status": "ok", "user": user, "location": "/"})),
            )
        }
        Err(err) => {
            let (status, body) = error_response(AppError::from(err));
            (status, HeaderMap::new(), body)
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
    #[serde(default)]
    return_to: Option<String>,
}

// POST /login
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> impl IntoResponse {
    let req = LoginRequest {
        username: payload.username,
        password: payload.password,
        return_to: payload.return_to,
    };
    match state.auth.login(&req) {
        Ok(resp) => {
            let csrf = gen_csrf();
            state
                .csrf_tokens
                .write()
                .await
                .insert(resp.session.token.clone(), csrf);
            let mut headers = HeaderMap::new();
            headers.insert("Set-Cookie", set_session_cookie(&resp.session.token));
            let location = req.return_to.clone().unwrap_or_else(|| "/".to_string());
            (
                StatusCode::OK,
                headers,
                Json(json!({"status": "ok", "location": location})),
            )
        }
        Err(err) => {
            let (status, body) = error_response(err);
            (status, HeaderMap::new(), body)
        }
    }
}

// DELETE /logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if !validate_csrf(&state, &headers).await {
        return (
            StatusCode::FORBIDDEN,
            HeaderMap::new(),
            Json(json!({"status": "forbidden", "error": "invalid csrf"})),
        );
    }
    if let Some(token) = session_token(&headers) {
        state.sessions.logout(&token);
        state.csrf_tokens.write().await.remove(&token);
    }
    let mut out = HeaderMap::new();
    out.insert("Set-Cookie", clear_session_cookie());
    (
        StatusCode::OK,
        out,
        Json(json!({"status": "ok", "location": "/"})),
    )
}

// GET /csrf
//
// Must be logged in to fetch the CSRF token for this session.
async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(_principal) = current_principal(&state, &headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "unauthorized"})),
        );
    };
    let Some(token) = session_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "unauthorized"})),
        );
    };
    let map = state.csrf_tokens.read().await;
    if let Some(csrf) = map.get(&token) {
        return (StatusCode::OK, Json(json!({"status": "ok", "csrf": csrf})));
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"status": "error", "error": "csrf not available"})),
    )
}

// GET /users
async fn users_index(State(state): State<AppState>) -> impl IntoResponse {
    let listed = {
        let guard = state.store.0.lock();
        guard.list_users()
    };
    match listed {
        Ok(users) => (StatusCode::OK, Json(json!({"status": "ok", "users": users}))),
        Err(err) => error_response(AppError::from(err)),
    }
}

// GET /users/{user_id}/posts
async fn posts_index(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> impl IntoResponse {
    match posts::index(&state.store, user_id) {
        Ok(list) => (StatusCode::OK, Json(json!({"status": "ok", "posts": list}))),
        Err(err) => error_response(err),
    }
}

// GET /users/{user_id}/posts/{id}
async fn posts_show(
    State(state): State<AppState>,
    Path((_user_id, id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match posts::show(&state.store, id) {
        Ok(found) => (StatusCode::OK, Json(json!({"status": "ok", "post": found}))),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct CreatePostPayload {
    title: String,
}

// POST /users/{user_id}/posts
async fn posts_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Json(payload): Json<CreatePostPayload>,
) -> impl IntoResponse {
    if !validate_csrf(&state, &headers).await {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"status": "forbidden", "error": "invalid csrf"})),
        );
    }
    let ctx = request_context(&state, &headers, format!("/users/{}/posts", user_id));
    match posts::create(&state.store, &ctx, user_id, &payload.title) {
        Ok(created) => (
            StatusCode::CREATED,
            Json(json!({"status": "ok", "post": created})),
        ),
        Err(err) => error_response(err),
    }
}

// DELETE /users/{user_id}/posts/{id}
async fn posts_destroy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    if !validate_csrf(&state, &headers).await {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"status": "forbidden", "error": "invalid csrf"})),
        );
    }
    let ctx = request_context(
        &state,
        &headers,
        format!("/users/{}/posts/{}", user_id, id),
    );
    match posts::destroy(&state.store, &ctx, user_id, id) {
        Ok(_deleted) => {
            // Send the caller back where it came from, defaulting to the
            // owner's listing.
            let location = headers
                .get("referer")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("/users/{}/posts", user_id));
            (
                StatusCode::OK,
                Json(json!({"status": "ok", "location": location})),
            )
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct IndexAllParams {
    #[serde(default)]
    limit: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

// GET /posts?limit=X[&format=rss]  (also mounted at /)
//
// The rss format swaps the full projection for the reduced feed field set.
async fn index_all_handler(
    State(state): State<AppState>,
    Query(params): Query<IndexAllParams>,
) -> impl IntoResponse {
    let limit = parse_limit(params.limit.as_deref());
    if params.format.as_deref() == Some("rss") {
        return match posts::feed_index_all(&state.store, limit) {
            Ok(entries) => (
                StatusCode::OK,
                Json(json!({"status": "ok", "posts": entries})),
            ),
            Err(err) => error_response(err),
        };
    }
    match posts::index_all(&state.store, limit) {
        Ok(list) => (StatusCode::OK, Json(json!({"status": "ok", "posts": list}))),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct MorePostsParams {
    #[serde(default)]
    count: Option<String>,
}

// GET /posts/more_posts?count=N where count is the number of posts in view
async fn more_posts_handler(
    State(state): State<AppState>,
    Query(params): Query<MorePostsParams>,
) -> impl IntoResponse {
    let count = params
        .count
        .as_deref()
        .map(str::trim)
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);
    match posts::more_posts(&state.store, count) {
        Ok(answer) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "more_posts": answer})),
        ),
        Err(err) => error_response(err),
    }
}
