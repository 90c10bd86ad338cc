//! GeoIP Resolver Port
//!
//! Defines the interface for resolving IP addresses to geographic locations.

use crate::domain::entities::GeoInfo;
use std::net::IpAddr;

/// Resolver for IP address to geographic location.
///
/// This is an outbound port that abstracts the GeoIP database.
/// Lookups are synchronous and side-effect free; a miss is a
/// normal outcome, not an error.
pub trait GeoResolver: Send + Sync {
    /// Resolve an IP address to geographic information.
    ///
    /// Returns None when the address is not in the database
    /// (private, reserved or unmapped ranges).
    fn resolve(&self, ip: IpAddr) -> Option<GeoInfo>;

    /// Resolve a textual IP address. Unparseable input is a miss.
    fn resolve_str(&self, ip: &str) -> Option<GeoInfo> {
        let ip: IpAddr = ip.trim().parse().ok()?;
        self.resolve(ip)
    }
}
