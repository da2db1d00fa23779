use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::ScanOptions;
use crate::host::Prober;
use crate::scanner::BatchScanner;

pub struct AppState<P> {
    scanner: Arc<BatchScanner<P>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            scanner: Arc::clone(&self.scanner),
        }
    }
}

/// Body of `POST /api/discovery/scan`.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(flatten)]
    pub options: ScanOptions,
}

/// Routes:
/// - `POST /api/discovery/scan` runs one batch and returns the report.
/// - `GET /api/health` liveness check.
pub fn router<P: Prober>(scanner: Arc<BatchScanner<P>>) -> Router {
    let state = AppState { scanner };

    let discovery = Router::new()
        .route("/scan", post(post_scan::<P>))
        .with_state(state);

    Router::new()
        .nest("/api/discovery", discovery)
        .route("/api/health", get(get_health))
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server<P: Prober>(bind: &str, scanner: Arc<BatchScanner<P>>) -> Result<()> {
    let app = router(scanner);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving discovery API");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn post_scan<P: Prober>(
    State(app): State<AppState<P>>,
    body: std::result::Result<Json<ScanRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return bad_request(e.body_text()),
    };
    let cidr = req.cidr.as_deref().map(str::trim).unwrap_or_default();
    if cidr.is_empty() {
        return bad_request("'cidr' is required".to_string());
    }

    match app.scanner.scan(cidr, &req.options).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::debug!(cidr, error = %e, "rejected scan request");
            bad_request(e.to_string())
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
