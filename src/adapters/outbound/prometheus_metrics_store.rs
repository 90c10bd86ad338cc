//! Prometheus Metrics Store
//!
//! Implements MetricsStore with Prometheus metrics exposition.

use crate::domain::ports::MetricsStore;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-method call metrics.
#[derive(Debug, Default)]
pub struct MethodMetrics {
    /// Total calls
    pub requests: AtomicU64,
    /// Calls that returned an error
    pub errors: AtomicU64,
    /// Sum of call latencies in microseconds
    pub latency_sum_us: AtomicU64,
}

impl MethodMetrics {
    /// Average latency in seconds.
    pub fn avg_latency_secs(&self) -> f64 {
        let count = self.requests.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.latency_sum_secs() / count as f64
    }

    pub fn latency_sum_secs(&self) -> f64 {
        self.latency_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

/// Prometheus-compatible metrics store.
///
/// Stores metrics in a format suitable for Prometheus scraping.
pub struct PrometheusMetricsStore {
    methods: DashMap<String, Arc<MethodMetrics>>,
}

impl PrometheusMetricsStore {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
        }
    }

    /// Get or create metrics for a method.
    fn get_or_create(&self, method: &str) -> Arc<MethodMetrics> {
        self.methods
            .entry(method.to_string())
            .or_insert_with(|| Arc::new(MethodMetrics::default()))
            .clone()
    }

    /// Get metrics for a specific method.
    pub fn method_metrics(&self, method: &str) -> Option<Arc<MethodMetrics>> {
        self.methods.get(method).map(|e| e.clone())
    }

    /// Method names seen so far, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();
        let methods: Vec<(String, Arc<MethodMetrics>)> = self
            .methods()
            .into_iter()
            .filter_map(|name| self.method_metrics(&name).map(|m| (name, m)))
            .collect();

        output.push_str("# HELP homing_requests_total Total service calls per method\n");
        output.push_str("# TYPE homing_requests_total counter\n");
        for (method, m) in &methods {
            output.push_str(&format!(
                "homing_requests_total{{method=\"{}\"}} {}\n",
                method,
                m.requests.load(Ordering::Relaxed)
            ));
        }

        output.push_str("# HELP homing_request_errors_total Failed service calls per method\n");
        output.push_str("# TYPE homing_request_errors_total counter\n");
        for (method, m) in &methods {
            output.push_str(&format!(
                "homing_request_errors_total{{method=\"{}\"}} {}\n",
                method,
                m.errors.load(Ordering::Relaxed)
            ));
        }

        output.push_str("# HELP homing_request_latency_seconds Service call latency per method\n");
        output.push_str("# TYPE homing_request_latency_seconds summary\n");
        for (method, m) in &methods {
            output.push_str(&format!(
                "homing_request_latency_seconds_sum{{method=\"{}\"}} {:.6}\n",
                method,
                m.latency_sum_secs()
            ));
            output.push_str(&format!(
                "homing_request_latency_seconds_count{{method=\"{}\"}} {}\n",
                method,
                m.requests.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for PrometheusMetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore for PrometheusMetricsStore {
    fn record_request(&self, method: &str, elapsed: Duration, failed: bool) {
        let metrics = self.get_or_create(method);
        metrics.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        metrics.latency_sum_us.fetch_add(micros, Ordering::Relaxed);
    }

    fn request_count(&self, method: &str) -> u64 {
        self.methods
            .get(method)
            .map(|m| m.requests.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn error_count(&self, method: &str) -> u64 {
        self.methods
            .get(method)
            .map(|m| m.errors.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let store = PrometheusMetricsStore::new();
        assert!(store.methods().is_empty());
        assert_eq!(store.request_count("save"), 0);
        assert_eq!(store.error_count("save"), 0);
    }

    #[test]
    fn test_request_and_error_counts() {
        let store = PrometheusMetricsStore::default();

        store.record_request("save", Duration::from_millis(5), false);
        store.record_request("save", Duration::from_millis(5), true);
        store.record_request("get_all", Duration::from_millis(1), false);

        assert_eq!(store.request_count("save"), 2);
        assert_eq!(store.error_count("save"), 1);
        assert_eq!(store.request_count("get_all"), 1);
        assert_eq!(store.methods(), vec!["get_all", "save"]);
    }

    #[test]
    fn test_avg_latency() {
        let store = PrometheusMetricsStore::new();

        store.record_request("save", Duration::from_millis(10), false);
        store.record_request("save", Duration::from_millis(30), false);

        let m = store.method_metrics("save").unwrap();
        assert!((m.avg_latency_secs() - 0.02).abs() < 1e-9);
        assert!((m.latency_sum_secs() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_avg_latency_zero_count() {
        assert_eq!(MethodMetrics::default().avg_latency_secs(), 0.0);
    }

    #[test]
    fn test_export_prometheus() {
        let store = PrometheusMetricsStore::new();
        store.record_request("save", Duration::from_millis(500), true);

        let output = store.export_prometheus();

        assert!(output.contains("# TYPE homing_requests_total counter"));
        assert!(output.contains("homing_requests_total{method=\"save\"} 1"));
        assert!(output.contains("homing_request_errors_total{method=\"save\"} 1"));
        assert!(output.contains("homing_request_latency_seconds_sum{method=\"save\"} 0.500000"));
        assert!(output.contains("homing_request_latency_seconds_count{method=\"save\"} 1"));
    }

    #[test]
    fn test_export_empty_has_headers_only() {
        let output = PrometheusMetricsStore::new().export_prometheus();
        assert!(output.contains("# HELP homing_requests_total"));
        assert!(!output.contains("method="));
    }
}
