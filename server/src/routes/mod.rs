use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;

use intake_core::projects;

use crate::state::AppState;

mod analyze;
mod notify;
mod ticket;
mod upload;

/// Multipart bodies carry the form fields plus up to a handful of images.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ticket", post(ticket::create_ticket))
        .route("/api/notify", post(notify::notify))
        .route("/api/ai/analyze", post(analyze::analyze))
        .route("/api/upload-image", post(upload::upload_image))
        .route("/api/projects", get(list_projects))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ClientEntry {
    id: &'static str,
    name: &'static str,
}

/// The clients the form offers, in configuration order.
async fn list_projects() -> Json<Vec<ClientEntry>> {
    Json(
        projects::all()
            .map(|(id, project)| ClientEntry {
                id,
                name: project.name,
            })
            .collect(),
    )
}

/// Caller address for rate limiting: first `x-forwarded-for` hop, then
/// `x-real-ip`, then the socket address.
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }
    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        && !real_ip.trim().is_empty()
    {
        return real_ip.trim().to_string();
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
