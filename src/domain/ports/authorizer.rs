//! Authorizer Port
//!
//! Validates bearer tokens before protected reads.

use crate::domain::errors::TelemetryError;
use async_trait::async_trait;

/// Token validation collaborator.
///
/// The service forwards the caller's token untouched and only maps
/// a rejection to `TelemetryError::Unauthorized`.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, token: &str) -> Result<(), TelemetryError>;
}
