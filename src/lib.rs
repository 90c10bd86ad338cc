//! homing Library
//!
//! Telemetry collection service: deployed instances phone home, their
//! IP is geolocated, and one record per IP is kept in a pluggable store.
//! Exposed as a library for the binary and integration tests.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{CallContext, HomingService, TelemetryService};
pub use config::{load_config, Config, RepositoryKind};
pub use domain::entities::{GeoInfo, Telemetry};
pub use domain::errors::{RepositoryError, TelemetryError};
pub use domain::ports::{Authorizer, GeoResolver, MetricsStore, TelemetryRepository};
pub use domain::value_objects::{PageMetadata, PageQuery, TelemetryFilter, TelemetryPage};
