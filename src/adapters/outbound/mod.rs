mod dashmap_telemetry_repo;
mod maxmind_geo_resolver;
mod prometheus_metrics_store;
mod sheets_telemetry_repo;
mod sqlite_telemetry_repo;
mod token_authorizer;

pub use dashmap_telemetry_repo::DashMapTelemetryRepository;
pub use maxmind_geo_resolver::MaxMindGeoResolver;
pub use prometheus_metrics_store::{MethodMetrics, PrometheusMetricsStore};
pub use sheets_telemetry_repo::{SheetsConfig, SheetsTelemetryRepository};
pub use sqlite_telemetry_repo::SqliteTelemetryRepository;
pub use token_authorizer::{AllowAllAuthorizer, StaticTokenAuthorizer};
