mod authorizer;
mod clock;
mod geo_resolver;
mod metrics_store;
mod telemetry_repository;

pub use authorizer::Authorizer;
pub use clock::{Clock, SystemClock};
pub use geo_resolver::GeoResolver;
pub use metrics_store::MetricsStore;
pub use telemetry_repository::TelemetryRepository;
