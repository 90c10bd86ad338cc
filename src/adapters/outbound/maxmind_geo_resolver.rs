//! MaxMind GeoIP Resolver
//!
//! Implements GeoResolver using a MaxMind GeoLite2/GeoIP2 City database.

use crate::domain::entities::GeoInfo;
use crate::domain::ports::GeoResolver;
use maxminddb::Reader;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;

/// MaxMind GeoIP resolver.
///
/// The database is read once at construction and shared read-only
/// by every lookup, so no locking is needed.
pub struct MaxMindGeoResolver {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindGeoResolver {
    /// Load a GeoIP database from a file path.
    ///
    /// A missing or corrupt file is an error; the service cannot start without it.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let reader = Reader::open_readfile(path)
            .map_err(|e| anyhow::anyhow!("failed to open GeoIP database {}: {}", path, e))?;
        tracing::debug!(
            "GeoIP database {} loaded (type={}, build={})",
            path,
            reader.metadata.database_type,
            reader.metadata.build_epoch
        );
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Load a GeoIP database from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let reader = Reader::from_source(bytes)
            .map_err(|e| anyhow::anyhow!("invalid GeoIP database: {}", e))?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Database type string from the file metadata (e.g. "GeoLite2-City").
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }
}

#[derive(Debug, Deserialize)]
struct Names {
    en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Country {
    iso_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct City {
    names: Option<Names>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CityResp {
    country: Option<Country>,
    city: Option<City>,
    location: Option<Location>,
}

impl CityResp {
    /// Convert a raw database record, treating an empty one as a miss.
    fn into_geo(self) -> Option<GeoInfo> {
        let country = self.country.and_then(|c| c.iso_code);
        let city = self.city.and_then(|c| c.names).and_then(|n| n.en);
        let (longitude, latitude) = match self.location {
            Some(loc) => (loc.longitude, loc.latitude),
            None => (None, None),
        };

        if country.is_none() && city.is_none() && longitude.is_none() && latitude.is_none() {
            return None;
        }

        Some(GeoInfo::new(
            country,
            city,
            longitude.unwrap_or(0.0),
            latitude.unwrap_or(0.0),
        ))
    }
}

impl GeoResolver for MaxMindGeoResolver {
    fn resolve(&self, ip: IpAddr) -> Option<GeoInfo> {
        match self.reader.lookup::<CityResp>(ip) {
            Ok(resp) => resp.into_geo(),
            Err(maxminddb::MaxMindDBError::AddressNotFoundError(_)) => None,
            Err(e) => {
                tracing::debug!("GeoIP lookup for {} failed: {}", ip, e);
                None
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_DB: &str = "tests/data/GeoIP2-City-Test.mmdb";

    fn test_resolver() -> MaxMindGeoResolver {
        MaxMindGeoResolver::from_file(TEST_DB).unwrap()
    }

    #[test]
    fn test_from_file_nonexistent() {
        let result = MaxMindGeoResolver::from_file("/nonexistent/path/GeoLite2-City.mmdb");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_corrupt() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not an mmdb file").unwrap();

        let result = MaxMindGeoResolver::from_file(file.path().to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_bytes_empty() {
        assert!(MaxMindGeoResolver::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_from_file_reads_metadata() {
        assert_eq!(test_resolver().database_type(), "GeoIP2-City");
    }

    #[test]
    fn test_from_bytes_valid() {
        let bytes = std::fs::read(TEST_DB).unwrap();
        let resolver = MaxMindGeoResolver::from_bytes(bytes).unwrap();
        assert!(resolver.resolve("81.2.69.142".parse().unwrap()).is_some());
    }

    #[test]
    fn test_resolve_known_ip() {
        let geo = test_resolver()
            .resolve("81.2.69.142".parse().unwrap())
            .unwrap();

        assert_eq!(geo.country.as_deref(), Some("GB"));
        assert_eq!(geo.city.as_deref(), Some("London"));
        assert_eq!(geo.latitude, 51.5142);
        assert_eq!(geo.longitude, -0.0931);
    }

    #[test]
    fn test_resolve_country_only_network() {
        let geo = test_resolver()
            .resolve("89.160.20.112".parse().unwrap())
            .unwrap();

        assert_eq!(geo.country.as_deref(), Some("SE"));
        assert!(geo.city.is_none());
        assert_eq!(geo.longitude, 0.0);
        assert_eq!(geo.latitude, 0.0);
    }

    #[test]
    fn test_resolve_record_without_location_is_a_miss() {
        assert!(test_resolver()
            .resolve("175.16.199.1".parse().unwrap())
            .is_none());
    }

    #[test]
    fn test_resolve_unmapped_ip_returns_none() {
        assert!(test_resolver()
            .resolve("8.8.8.8".parse().unwrap())
            .is_none());
    }

    #[test]
    fn test_resolve_private_ip_returns_none() {
        let resolver = test_resolver();
        assert!(resolver.resolve("192.168.1.1".parse().unwrap()).is_none());
        assert!(resolver.resolve("127.0.0.1".parse().unwrap()).is_none());
        assert!(resolver.resolve_str("10.0.0.1").is_none());
    }

    #[test]
    fn test_resolve_ipv6_in_ipv4_database_returns_none() {
        assert!(test_resolver()
            .resolve("2001:db8::1".parse().unwrap())
            .is_none());
    }

    #[test]
    fn test_resolver_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MaxMindGeoResolver>();
    }

    #[test]
    fn test_full_record_converts() {
        let resp = CityResp {
            country: Some(Country {
                iso_code: Some("US".to_string()),
            }),
            city: Some(City {
                names: Some(Names {
                    en: Some("Mountain View".to_string()),
                }),
            }),
            location: Some(Location {
                latitude: Some(37.386),
                longitude: Some(-122.0838),
            }),
        };

        let geo = resp.into_geo().unwrap();
        assert_eq!(geo.country.as_deref(), Some("US"));
        assert_eq!(geo.city.as_deref(), Some("Mountain View"));
        assert_eq!(geo.longitude, -122.0838);
        assert_eq!(geo.latitude, 37.386);
    }

    #[test]
    fn test_country_only_record_has_zero_coordinates() {
        let resp = CityResp {
            country: Some(Country {
                iso_code: Some("BR".to_string()),
            }),
            city: None,
            location: None,
        };

        let geo = resp.into_geo().unwrap();
        assert_eq!(geo.country.as_deref(), Some("BR"));
        assert!(geo.city.is_none());
        assert_eq!(geo.longitude, 0.0);
        assert_eq!(geo.latitude, 0.0);
    }

    #[test]
    fn test_empty_record_is_a_miss() {
        let resp = CityResp {
            country: Some(Country { iso_code: None }),
            city: Some(City { names: None }),
            location: None,
        };
        assert!(resp.into_geo().is_none());
    }

    #[test]
    fn test_record_deserializes_from_json_shape() {
        let resp: CityResp = serde_json::from_value(serde_json::json!({
            "country": {"iso_code": "DE", "names": {"en": "Germany"}},
            "city": {"names": {"en": "Berlin", "de": "Berlin"}},
            "location": {"latitude": 52.52, "longitude": 13.405, "time_zone": "Europe/Berlin"}
        }))
        .unwrap();

        let geo = resp.into_geo().unwrap();
        assert_eq!(geo.country.as_deref(), Some("DE"));
        assert_eq!(geo.city.as_deref(), Some("Berlin"));
    }
}
