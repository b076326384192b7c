//! HTTP surface for batch translation.
//!
//! `POST /translate` takes `{texts, from, to}` and answers `{translations}`,
//! or `{error, details?}` with 400 (malformed), 429 (own request guard) or
//! 500 (provider failure or route timeout). `GET /health` and `GET /metrics`
//! are for operators.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::metrics::{metric_names, MetricSummary, MetricsRegistry, RequestIds};
use crate::rate_limit::RollingWindow;
use crate::translate::{GatewayClient, Language};

pub struct ServerState {
    gateway: Arc<GatewayClient>,
    guard: Mutex<RollingWindow>,
    route_timeout: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl ServerState {
    pub fn new(
        gateway: Arc<GatewayClient>,
        metrics: Arc<MetricsRegistry>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            gateway,
            guard: Mutex::new(RollingWindow::new(
                config.requests_per_minute,
                Duration::from_secs(60),
            )),
            route_timeout: Duration::from_secs(config.route_timeout_secs),
            metrics,
        }
    }
}

/// Lenient body shape so that missing fields become a 400 with our error body.
#[derive(Debug, Deserialize)]
struct RawTranslateRequest {
    texts: Option<serde_json::Value>,
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, details: Option<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                details,
            },
            retry_after_secs: None,
        }
    }

    fn bad_request(details: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request body", details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_summary))
        .route("/translate", post(translate))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "translation server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("translation server stopped");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_summary(State(state): State<Arc<ServerState>>) -> Json<HashMap<String, MetricSummary>> {
    Json(state.metrics.summary())
}

async fn translate(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<TranslateResponse>, ApiError> {
    let ids = RequestIds::new();
    let _timer = state.metrics.timer(metric_names::SERVER_REQUEST);

    let (texts, from, to) = parse_request(&body).map_err(|e| {
        debug!(request_id = %ids.request_id, "rejected malformed request");
        e
    })?;

    let admitted = state.guard.lock().try_acquire(tokio::time::Instant::now());
    if let Err(wait) = admitted {
        warn!(request_id = %ids.request_id, retry_in_ms = wait.as_millis() as u64, "request guard tripped");
        let secs = wait.as_secs().max(1);
        let mut err = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests",
            Some(format!("retry in {secs}s")),
        );
        err.retry_after_secs = Some(secs);
        return Err(err);
    }

    info!(
        trace_id = %ids.trace_id,
        request_id = %ids.request_id,
        texts = texts.len(),
        from = %from,
        to = %to,
        "translate request"
    );

    let outcome = tokio::time::timeout(
        state.route_timeout,
        state.gateway.translate_batch(&texts, from, to),
    )
    .await;

    match outcome {
        Ok(Ok(translations)) => Ok(Json(TranslateResponse { translations })),
        Ok(Err(e)) => {
            error!(request_id = %ids.request_id, error = %e, "translation failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Translation failed",
                Some(e.to_string()),
            ))
        }
        Err(_) => {
            error!(request_id = %ids.request_id, "translation timed out");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Translation failed",
                Some("translation timeout".into()),
            ))
        }
    }
}

fn parse_request(body: &[u8]) -> Result<(Vec<String>, Language, Language), ApiError> {
    let raw: RawTranslateRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(Some(e.to_string())))?;

    let texts: Vec<String> = match raw.texts {
        Some(value @ serde_json::Value::Array(_)) => serde_json::from_value(value)
            .map_err(|_| ApiError::bad_request(Some("texts must be strings".into())))?,
        _ => return Err(ApiError::bad_request(None)),
    };
    if texts.is_empty() {
        return Err(ApiError::bad_request(Some("texts is empty".into())));
    }

    let from = required_language(raw.from)?;
    let to = required_language(raw.to)?;
    Ok((texts, from, to))
}

fn required_language(value: Option<String>) -> Result<Language, ApiError> {
    match value {
        Some(code) if !code.trim().is_empty() => code
            .parse()
            .map_err(|e: crate::translate::TranslateError| ApiError::bad_request(Some(e.to_string()))),
        _ => Err(ApiError::bad_request(None)),
    }
}
