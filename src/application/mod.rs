//! Application Layer
//!
//! Use cases orchestrating the domain through its ports.

mod context;
mod middleware;
mod telemetry_service;

pub use context::CallContext;
pub use middleware::{LoggingMiddleware, MetricsMiddleware};
pub use telemetry_service::{HomingService, TelemetryService};
