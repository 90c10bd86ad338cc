//! homing - Telemetry Service with Hexagonal Architecture
//!
//! This is the composition root that wires together all the components.

use homing::adapters::inbound::{ApiServer, ApiState};
use homing::adapters::outbound::{
    AllowAllAuthorizer, DashMapTelemetryRepository, MaxMindGeoResolver, PrometheusMetricsStore,
    SheetsConfig, SheetsTelemetryRepository, SqliteTelemetryRepository, StaticTokenAuthorizer,
};
use homing::application::{HomingService, LoggingMiddleware, MetricsMiddleware, TelemetryService};
use homing::config::{load_config, Config, RepositoryKind};
use homing::domain::ports::{Authorizer, TelemetryRepository};
use homing::domain::value_objects::PageLimits;
use homing::infrastructure::{shutdown_signal, RateLimitConfig, ShutdownController};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Grace period for in-flight requests after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn build_repository(cfg: &Config) -> anyhow::Result<Arc<dyn TelemetryRepository>> {
    let repo: Arc<dyn TelemetryRepository> = match cfg.repository_kind()? {
        RepositoryKind::Memory => Arc::new(DashMapTelemetryRepository::new()),
        RepositoryKind::Sqlite => Arc::new(
            SqliteTelemetryRepository::open(&cfg.sqlite_path)
                .map_err(|e| anyhow::anyhow!("failed to open sqlite repository: {}", e))?,
        ),
        RepositoryKind::Sheets => Arc::new(SheetsTelemetryRepository::new(SheetsConfig {
            api_url: cfg.sheets_api_url.clone(),
            spreadsheet_id: cfg.sheets_spreadsheet_id.clone().unwrap_or_default(),
            sheet_name: cfg.sheets_sheet_name.clone(),
            access_token: cfg.sheets_access_token.clone().unwrap_or_default(),
        })),
    };
    Ok(repo)
}

fn build_authorizer(cfg: &Config) -> Arc<dyn Authorizer> {
    match &cfg.api_token {
        Some(token) => Arc::new(StaticTokenAuthorizer::new(token.clone())),
        None => {
            tracing::warn!("HOMING_API_TOKEN not set; telemetry listing is open to everyone");
            Arc::new(AllowAllAuthorizer)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let fallback = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    cfg.validate()?;

    tracing::info!(
        "starting homing listen={} repository={}",
        cfg.listen_addr,
        cfg.repository
    );

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let ip_db = cfg.ip_db.clone().unwrap_or_default();
    let geo_resolver = Arc::new(MaxMindGeoResolver::from_file(&ip_db)?);
    tracing::info!(
        "GeoIP DB loaded from {} ({})",
        ip_db,
        geo_resolver.database_type()
    );

    let repo = build_repository(&cfg)?;
    tracing::info!("using {} telemetry repository", repo.name());

    let authorizer = build_authorizer(&cfg);
    let metrics = Arc::new(PrometheusMetricsStore::new());

    // 2. Application service, wrapped by metrics then logging
    let service = HomingService::new(repo, geo_resolver, authorizer).with_limits(PageLimits {
        default_limit: cfg.default_limit,
        max_limit: cfg.max_limit,
    });
    let service: Arc<dyn TelemetryService> = Arc::new(service);
    let service: Arc<dyn TelemetryService> =
        Arc::new(MetricsMiddleware::new(service, metrics.clone()));
    let service: Arc<dyn TelemetryService> = Arc::new(LoggingMiddleware::new(service));

    // 3. Inbound adapter
    let shutdown = ShutdownController::new();
    let state = ApiState::new(service, metrics)
        .with_rate_limit(RateLimitConfig::per_minute(
            cfg.rate_limit_per_min,
            cfg.rate_limit_burst,
        ))
        .with_shutdown(shutdown.clone())
        .with_request_timeout(Duration::from_secs(cfg.request_timeout_secs))
        .with_trust_forwarded(cfg.trust_forwarded);
    let server = ApiServer::new(cfg.listen_addr.clone(), state);
    server.start_cleanup_task(60);

    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.run().await?;

    if !shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!("exiting with requests still in flight");
    }
    tracing::info!("homing stopped");
    Ok(())
}
