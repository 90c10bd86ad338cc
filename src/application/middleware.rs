//! Service Decorators
//!
//! Logging and metrics wrappers around a `TelemetryService`. Each one
//! implements the same capability and forwards to the inner service.

use crate::application::context::CallContext;
use crate::application::telemetry_service::TelemetryService;
use crate::domain::entities::Telemetry;
use crate::domain::errors::TelemetryError;
use crate::domain::ports::MetricsStore;
use crate::domain::value_objects::{PageMetadata, TelemetryPage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Logs duration and outcome of every call.
pub struct LoggingMiddleware {
    inner: Arc<dyn TelemetryService>,
}

impl LoggingMiddleware {
    pub fn new(inner: Arc<dyn TelemetryService>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TelemetryService for LoggingMiddleware {
    async fn save(
        &self,
        ctx: &CallContext,
        telemetry: Telemetry,
    ) -> Result<Telemetry, TelemetryError> {
        let ip = telemetry.ip_address.clone();
        let begin = Instant::now();
        let result = self.inner.save(ctx, telemetry).await;

        match &result {
            Ok(stored) => tracing::info!(
                "method save telemetry for {} took {:?} to complete without errors (id={})",
                ip,
                begin.elapsed(),
                stored.id
            ),
            Err(e) => tracing::warn!(
                "method save telemetry for {} took {:?} to complete with error: {}",
                ip,
                begin.elapsed(),
                e
            ),
        }
        result
    }

    async fn get_all(
        &self,
        ctx: &CallContext,
        repo: &str,
        token: &str,
        pm: PageMetadata,
    ) -> Result<TelemetryPage, TelemetryError> {
        let (offset, limit) = (pm.offset, pm.limit);
        let begin = Instant::now();
        let result = self.inner.get_all(ctx, repo, token, pm).await;

        match &result {
            Ok(page) => tracing::info!(
                "method get all telemetry (repo={:?} offset={} limit={}) took {:?} to complete without errors ({} of {})",
                repo,
                offset,
                limit,
                begin.elapsed(),
                page.records.len(),
                page.total
            ),
            Err(e) => tracing::warn!(
                "method get all telemetry (repo={:?} offset={} limit={}) took {:?} to complete with error: {}",
                repo,
                offset,
                limit,
                begin.elapsed(),
                e
            ),
        }
        result
    }
}

/// Records request count, error count and latency per method.
pub struct MetricsMiddleware {
    inner: Arc<dyn TelemetryService>,
    metrics: Arc<dyn MetricsStore>,
}

impl MetricsMiddleware {
    pub const SAVE: &'static str = "save";
    pub const GET_ALL: &'static str = "get_all";

    pub fn new(inner: Arc<dyn TelemetryService>, metrics: Arc<dyn MetricsStore>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl TelemetryService for MetricsMiddleware {
    async fn save(
        &self,
        ctx: &CallContext,
        telemetry: Telemetry,
    ) -> Result<Telemetry, TelemetryError> {
        let begin = Instant::now();
        let result = self.inner.save(ctx, telemetry).await;
        self.metrics
            .record_request(Self::SAVE, begin.elapsed(), result.is_err());
        result
    }

    async fn get_all(
        &self,
        ctx: &CallContext,
        repo: &str,
        token: &str,
        pm: PageMetadata,
    ) -> Result<TelemetryPage, TelemetryError> {
        let begin = Instant::now();
        let result = self.inner.get_all(ctx, repo, token, pm).await;
        self.metrics
            .record_request(Self::GET_ALL, begin.elapsed(), result.is_err());
        result
    }
}
