//! Metrics Store Port
//!
//! Defines the interface for recording per-method request metrics.

use std::time::Duration;

/// Store for service call metrics.
///
/// The metrics middleware records one observation per call.
pub trait MetricsStore: Send + Sync {
    /// Record a completed call for a method.
    fn record_request(&self, method: &str, elapsed: Duration, failed: bool);

    /// Get the number of calls recorded for a method.
    fn request_count(&self, method: &str) -> u64;

    /// Get the number of failed calls recorded for a method.
    fn error_count(&self, method: &str) -> u64;
}
