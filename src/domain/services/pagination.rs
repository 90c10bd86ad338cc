//! Pagination Service
//!
//! Pure domain logic for validating page requests and slicing
//! in-memory record sets. This service has NO external dependencies.

use crate::domain::entities::Telemetry;
use crate::domain::errors::TelemetryError;
use crate::domain::value_objects::{PageLimits, PageMetadata, PageQuery, TelemetryPage};
use std::cmp::Ordering;

/// Pagination rules shared by the service and the in-memory backends.
pub struct Paginator;

impl Paginator {
    /// Validate and normalize a caller's page request.
    ///
    /// - negative offset or limit is rejected
    /// - zero limit selects the default page size
    /// - limits above the maximum are clamped
    pub fn normalize(pm: PageMetadata, limits: PageLimits) -> Result<PageQuery, TelemetryError> {
        if pm.offset < 0 {
            return Err(TelemetryError::invalid(format!(
                "offset must not be negative, got {}",
                pm.offset
            )));
        }
        if pm.limit < 0 {
            return Err(TelemetryError::invalid(format!(
                "limit must not be negative, got {}",
                pm.limit
            )));
        }

        let max = limits.max_limit.max(1);
        let limit = match pm.limit as u64 {
            0 => limits.default_limit.clamp(1, max),
            n => n.min(max),
        };

        Ok(PageQuery {
            offset: pm.offset as u64,
            limit,
            filter: pm.filter,
        })
    }

    /// Listing order: most recently seen first, ties broken by id.
    pub fn listing_order(a: &Telemetry, b: &Telemetry) -> Ordering {
        b.last_seen
            .cmp(&a.last_seen)
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Filter, sort and slice a full record set into one page.
    ///
    /// Used by backends that cannot page on the storage side.
    pub fn paginate<I>(records: I, query: &PageQuery) -> TelemetryPage
    where
        I: IntoIterator<Item = Telemetry>,
    {
        let mut matching: Vec<Telemetry> = records
            .into_iter()
            .filter(|t| query.filter.matches(t))
            .collect();
        matching.sort_by(Self::listing_order);

        let total = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .collect();

        TelemetryPage {
            total,
            offset: query.offset,
            limit: query.limit,
            records,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::value_objects::TelemetryFilter;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(id: &str, ip: &str, secs: i64) -> Telemetry {
        let mut t = Telemetry::new(ip);
        t.id = id.to_string();
        t.last_seen = at(secs);
        t
    }

    // ===== normalize Tests =====

    #[test]
    fn test_normalize_passes_valid_request() {
        let q = Paginator::normalize(PageMetadata::new(5, 20), PageLimits::default()).unwrap();
        assert_eq!(q.offset, 5);
        assert_eq!(q.limit, 20);
    }

    #[test]
    fn test_normalize_zero_limit_uses_default() {
        let q = Paginator::normalize(PageMetadata::new(0, 0), PageLimits::default()).unwrap();
        assert_eq!(q.limit, 10);
    }

    #[test]
    fn test_normalize_clamps_to_max() {
        let q = Paginator::normalize(PageMetadata::new(0, 5000), PageLimits::default()).unwrap();
        assert_eq!(q.limit, 100);
    }

    #[test]
    fn test_normalize_rejects_negative_offset() {
        let err = Paginator::normalize(PageMetadata::new(-1, 10), PageLimits::default()).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidInput(_)));
    }

    #[test]
    fn test_normalize_rejects_negative_limit() {
        let err = Paginator::normalize(PageMetadata::new(0, -10), PageLimits::default()).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidInput(_)));
    }

    #[test]
    fn test_normalize_default_above_max_is_clamped() {
        let limits = PageLimits {
            default_limit: 50,
            max_limit: 20,
        };
        let q = Paginator::normalize(PageMetadata::new(0, 0), limits).unwrap();
        assert_eq!(q.limit, 20);
    }

    #[test]
    fn test_normalize_keeps_filter() {
        let filter = TelemetryFilter {
            country: Some("US".to_string()),
            ..Default::default()
        };
        let pm = PageMetadata::new(0, 1).with_filter(filter.clone());
        let q = Paginator::normalize(pm, PageLimits::default()).unwrap();
        assert_eq!(q.filter, filter);
    }

    // ===== paginate Tests =====

    #[test]
    fn test_paginate_orders_by_last_seen_desc() {
        let records = vec![
            record("a", "10.0.0.1", 1),
            record("b", "10.0.0.2", 3),
            record("c", "10.0.0.3", 2),
        ];
        let page = Paginator::paginate(records, &PageQuery::new(0, 10));
        let ids: Vec<_> = page.records.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_paginate_ties_broken_by_id() {
        let records = vec![
            record("z", "10.0.0.1", 1),
            record("m", "10.0.0.2", 1),
            record("a", "10.0.0.3", 1),
        ];
        let page = Paginator::paginate(records, &PageQuery::new(0, 10));
        let ids: Vec<_> = page.records.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_paginate_first_page_smaller_than_total() {
        let records: Vec<_> = (0..7)
            .map(|i| record(&format!("id-{i}"), &format!("10.0.0.{i}"), i))
            .collect();
        let page = Paginator::paginate(records, &PageQuery::new(0, 3));
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.total, 7);
        assert_eq!(page.records[0].id, "id-6");
    }

    #[test]
    fn test_paginate_offset_at_end_is_empty() {
        let records: Vec<_> = (0..4)
            .map(|i| record(&format!("id-{i}"), &format!("10.0.0.{i}"), i))
            .collect();
        let page = Paginator::paginate(records, &PageQuery::new(4, 10));
        assert!(page.records.is_empty());
        assert_eq!(page.total, 4);
        assert_eq!(page.offset, 4);
    }

    #[test]
    fn test_paginate_total_counts_only_matching() {
        let mut us = record("a", "10.0.0.1", 1);
        us.country = Some("US".to_string());
        let br = {
            let mut t = record("b", "10.0.0.2", 2);
            t.country = Some("BR".to_string());
            t
        };
        let mut query = PageQuery::new(0, 10);
        query.filter.country = Some("US".to_string());

        let page = Paginator::paginate(vec![us, br], &query);
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].id, "a");
    }
}
