//! Telemetry Repository Port
//!
//! Defines the interface for persisting telemetry records.
//! Implementations may use an in-memory map, SQLite, or a spreadsheet.

use crate::domain::entities::Telemetry;
use crate::domain::errors::RepositoryError;
use crate::domain::value_objects::{PageQuery, TelemetryPage};
use async_trait::async_trait;

/// Durable store of telemetry records keyed by IP address.
///
/// This is an outbound port. The service hands it fully enriched
/// records and never branches on which implementation is active.
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Insert the record, or update the existing record with the same IP.
    ///
    /// Must be atomic per IP. On update every mutable field is replaced
    /// and the stored `id` is kept; the incoming `id` is only used for
    /// a fresh insert. Returns the record as stored.
    async fn upsert(&self, telemetry: Telemetry) -> Result<Telemetry, RepositoryError>;

    /// List matching records ordered by `last_seen` descending (ties by `id`).
    ///
    /// `total` counts every matching record regardless of offset/limit.
    async fn list(&self, query: &PageQuery) -> Result<TelemetryPage, RepositoryError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
