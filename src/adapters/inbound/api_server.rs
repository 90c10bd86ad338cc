//! Homing HTTP API Server
//!
//! HTTP API for deployed instances to report telemetry and for
//! operators to list what has phoned home.

use crate::adapters::outbound::PrometheusMetricsStore;
use crate::application::{CallContext, TelemetryService};
use crate::domain::entities::Telemetry;
use crate::domain::errors::TelemetryError;
use crate::domain::value_objects::{PageMetadata, TelemetryFilter};
use crate::infrastructure::{RateLimitConfig, RateLimiter, ShutdownController};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const BEARER_PREFIX: &str = "Bearer ";

/// Telemetry report body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Service error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TelemetryError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TelemetryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TelemetryError::Unauthorized => StatusCode::UNAUTHORIZED,
            TelemetryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TelemetryError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            TelemetryError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<TelemetryError> for ApiError {
    fn from(e: TelemetryError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    /// Fully decorated telemetry service
    pub service: Arc<dyn TelemetryService>,
    /// Exported on /metrics
    pub metrics: Arc<PrometheusMetricsStore>,
    /// Per-source limiter for reports
    pub rate_limiter: Arc<RateLimiter>,
    pub shutdown: ShutdownController,
    /// Deadline applied to every service call
    pub request_timeout: Duration,
    /// Rate limit by X-Forwarded-For instead of the peer address
    pub trust_forwarded: bool,
}

impl ApiState {
    pub fn new(service: Arc<dyn TelemetryService>, metrics: Arc<PrometheusMetricsStore>) -> Self {
        Self {
            service,
            metrics,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
            shutdown: ShutdownController::new(),
            request_timeout: Duration::from_secs(10),
            trust_forwarded: false,
        }
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(config));
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Only enable behind a proxy that overwrites X-Forwarded-For.
    pub fn with_trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    /// Context for one inbound request.
    fn call_context(&self) -> CallContext {
        CallContext::new()
            .with_timeout(self.request_timeout)
            .with_shutdown(self.shutdown.clone())
    }
}

/// Build the HTTP router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/telemetry", get(list_handler).post(save_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API Server for telemetry ingestion and listing.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    /// Spawn periodic eviction of idle rate limiter entries.
    pub fn start_cleanup_task(&self, interval_secs: u64) {
        let limiter = self.state.rate_limiter.clone();
        let shutdown = self.state.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = limiter.cleanup(Duration::from_secs(interval_secs));
                        if removed > 0 {
                            tracing::debug!("cleanup: evicted {} idle rate limit entries", removed);
                        }
                    }
                }
            }
        });
    }

    /// Run the API server until shutdown is initiated.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("homing API listening on {}", self.listen_addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
        Ok(())
    }
}

/// Bearer token from the Authorization header, empty when absent.
fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .unwrap_or_default()
}

/// First X-Forwarded-For entry.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

/// Address a report is rate limited under. The client controls
/// X-Forwarded-For, so it only counts when the proxy is trusted.
fn limiter_key(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trust_forwarded: bool,
) -> Option<IpAddr> {
    if trust_forwarded {
        forwarded_ip(headers).or(peer)
    } else {
        peer
    }
}

/// Collapse query pairs, rejecting repeated keys.
fn single_values(pairs: Vec<(String, String)>) -> Result<HashMap<String, String>, TelemetryError> {
    let mut params = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        if params.contains_key(&key) {
            return Err(TelemetryError::invalid(format!(
                "query parameter {:?} given more than once",
                key
            )));
        }
        params.insert(key, value);
    }
    Ok(params)
}

fn int_param(params: &HashMap<String, String>, key: &str) -> Result<i64, TelemetryError> {
    match params.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| TelemetryError::invalid(format!("invalid {} {:?}", key, v))),
    }
}

fn text_param(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

// Handler functions

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

async fn save_handler(
    State(state): State<ApiState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<SaveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.shutdown.request_guard();
    let peer = peer.map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = limiter_key(&headers, peer, state.trust_forwarded) {
        if !state.rate_limiter.check(ip) {
            tracing::debug!("rate limited report from {}", ip);
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({"error": "rate limit exceeded"})),
            )
                .into_response());
        }
    }

    let Json(req) = body.map_err(|e| TelemetryError::invalid(e.body_text()))?;

    let ip_address = req
        .ip_address
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| forwarded_ip(&headers).or(peer).map(|ip| ip.to_string()))
        .ok_or_else(|| TelemetryError::invalid("missing ip address"))?;

    let mut telemetry = Telemetry::new(ip_address).with_services(req.services);
    telemetry.version = req.version.filter(|v| !v.is_empty());

    let stored = state
        .service
        .save(&state.call_context(), telemetry)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

async fn list_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.shutdown.request_guard();
    let params = single_values(pairs)?;

    let filter = TelemetryFilter {
        country: text_param(&params, "country"),
        city: text_param(&params, "city"),
        version: text_param(&params, "version"),
        service: text_param(&params, "service"),
    };
    let pm = PageMetadata::new(int_param(&params, "offset")?, int_param(&params, "limit")?)
        .with_filter(filter);
    let repo = text_param(&params, "repo").unwrap_or_default();

    let page = state
        .service
        .get_all(&state.call_context(), &repo, bearer_token(&headers), pm)
        .await?;
    Ok(Json(page))
}
