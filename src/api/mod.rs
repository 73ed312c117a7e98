//! HTTP layer of the monitor: router, request logging and the handful
//! of unauthenticated endpoints.

pub mod auth;
pub mod data;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::db::Database;
use crate::settings::MonitorSettings;

pub struct MonitorState {
    pub db: Database,
    pub settings: MonitorSettings,
}

/// Builds the monitor router. Data endpoints sit behind the auth
/// middleware; the dashboard page, health probe, status echo and the
/// sign-in/out endpoints stay open.
pub fn router(state: Arc<MonitorState>) -> Router {
    let protected = Router::new()
        .route("/api/data", post(data::query_data))
        .route("/api/data/latest", get(data::latest_data))
        .layer(middleware::from_fn(auth::require_auth));

    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/status/:code", get(status_code))
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/sign-out", post(auth::sign_out))
        .merge(protected)
        .layer(middleware::from_fn(request_log))
        .layer(Extension(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn dashboard() -> Html<&'static str> {
    Html(include_str!("dashboard.html"))
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct StatusReply {
    code: u16,
    reason: String,
}

/// Echoes an arbitrary HTTP status code with its canonical reason.
async fn status_code(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => {
            let reply = StatusReply {
                code,
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            };
            (status, Json(reply)).into_response()
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            format!("Not an HTTP status code: {code}"),
        )
            .into_response(),
    }
}

async fn request_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{method} {uri} -> {} ({} ms, request {request_id})",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
