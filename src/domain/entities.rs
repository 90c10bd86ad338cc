//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the homing domain.
//! They have no external dependencies beyond serialization and time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single reported snapshot of a deployed instance.
///
/// One record is kept per IP address. The first save creates it,
/// every later save for the same IP refreshes it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Stable identifier, assigned at first insert
    #[serde(default)]
    pub id: String,
    /// Reporting instance's IP address (dedup key)
    pub ip_address: String,
    /// Longitude resolved from the IP (0.0 when unresolved)
    #[serde(default)]
    pub longitude: f64,
    /// Latitude resolved from the IP (0.0 when unresolved)
    #[serde(default)]
    pub latitude: f64,
    /// Software version reported by the client
    #[serde(default)]
    pub version: Option<String>,
    /// Services active on the reporting instance
    #[serde(default)]
    pub services: Vec<String>,
    /// Last time this instance phoned home
    pub last_seen: DateTime<Utc>,
    /// Country code (ISO 3166-1 alpha-2), None when unresolved
    #[serde(default)]
    pub country: Option<String>,
    /// City name, None when unresolved
    #[serde(default)]
    pub city: Option<String>,
}

impl Telemetry {
    /// Create a bare record for an IP address.
    ///
    /// Identity, location and timestamp are filled in by the service.
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            ip_address: ip_address.into(),
            longitude: 0.0,
            latitude: 0.0,
            version: None,
            services: Vec::new(),
            last_seen: DateTime::<Utc>::default(),
            country: None,
            city: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Apply a geo lookup result, clearing location fields on a miss.
    pub fn apply_geo(&mut self, geo: Option<GeoInfo>) {
        match geo {
            Some(geo) => {
                self.country = geo.country;
                self.city = geo.city;
                self.longitude = geo.longitude;
                self.latitude = geo.latitude;
            }
            None => {
                self.country = None;
                self.city = None;
                self.longitude = 0.0;
                self.latitude = 0.0;
            }
        }
    }

    /// Whether the geo resolver produced a location for this record.
    pub fn is_located(&self) -> bool {
        self.country.is_some() || self.city.is_some()
    }

    /// Services joined into a single comma-separated cell.
    pub fn services_joined(&self) -> String {
        self.services.join(",")
    }

    /// Trim service names, split any holding commas and drop empties,
    /// so every backend stores the same list.
    pub fn normalize_services(&mut self) {
        self.services = self
            .services
            .iter()
            .flat_map(|s| Self::split_services(s))
            .collect();
    }

    /// Parse a comma-separated services cell.
    pub fn split_services(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Geographic information resolved from an IP address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    /// Country code (ISO 3166-1 alpha-2)
    pub country: Option<String>,
    /// City name (English)
    pub city: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoInfo {
    pub fn new(country: Option<String>, city: Option<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            country,
            city,
            longitude,
            latitude,
        }
    }
}
