//! Adapters Layer
//!
//! Inbound adapters drive the application; outbound adapters implement
//! the domain ports.

pub mod inbound;
pub mod outbound;
