//! Value Objects - Immutable domain primitives
//!
//! Pagination requests, normalized page queries and result pages.

use crate::domain::entities::Telemetry;
use serde::{Deserialize, Serialize};

/// Optional exact-match filters for listing telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFilter {
    pub country: Option<String>,
    pub city: Option<String>,
    pub version: Option<String>,
    /// Matches records whose services contain this value
    pub service: Option<String>,
}

impl TelemetryFilter {
    /// Check whether a record passes every configured filter.
    pub fn matches(&self, t: &Telemetry) -> bool {
        fn eq(want: &Option<String>, have: &Option<String>) -> bool {
            match want {
                Some(w) => have.as_deref() == Some(w.as_str()),
                None => true,
            }
        }

        eq(&self.country, &t.country)
            && eq(&self.city, &t.city)
            && eq(&self.version, &t.version)
            && self
                .service
                .as_ref()
                .map_or(true, |s| t.services.iter().any(|have| have == s))
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.city.is_none()
            && self.version.is_none()
            && self.service.is_none()
    }
}

/// Caller-supplied pagination request.
///
/// Values are signed; negatives are rejected during normalization.
/// A zero limit selects the default page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub offset: i64,
    pub limit: i64,
    pub filter: TelemetryFilter,
}

impl PageMetadata {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset,
            limit,
            filter: TelemetryFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: TelemetryFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Page size bounds applied while normalizing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// Normalized page request handed to a repository.
///
/// `limit` is always within `1..=max_limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub offset: u64,
    pub limit: u64,
    pub filter: TelemetryFilter,
}

impl PageQuery {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit,
            filter: TelemetryFilter::default(),
        }
    }
}

/// One page of telemetry records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPage {
    /// Count of all matching records, independent of offset/limit
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    /// Records ordered by last_seen descending, ties by id
    pub records: Vec<Telemetry>,
}

impl TelemetryPage {
    pub fn empty(query: &PageQuery) -> Self {
        Self {
            total: 0,
            offset: query.offset,
            limit: query.limit,
            records: Vec::new(),
        }
    }
}
