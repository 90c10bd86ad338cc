//! Token Authorizers
//!
//! Implements Authorizer against a single shared API token.

use crate::domain::errors::TelemetryError;
use crate::domain::ports::Authorizer;
use async_trait::async_trait;
use subtle::ConstantTimeEq;

/// Accepts exactly one configured bearer token.
pub struct StaticTokenAuthorizer {
    token: String,
}

impl StaticTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Constant-time comparison of two tokens.
fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn authorize(&self, token: &str) -> Result<(), TelemetryError> {
        if token.is_empty() || self.token.is_empty() {
            return Err(TelemetryError::Unauthorized);
        }
        if tokens_match(token, &self.token) {
            Ok(())
        } else {
            Err(TelemetryError::Unauthorized)
        }
    }
}

/// Accepts every token. Used when no API token is configured.
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn authorize(&self, _token: &str) -> Result<(), TelemetryError> {
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_accepts_matching_token() {
        let auth = StaticTokenAuthorizer::new("s3cret");
        assert!(auth.authorize("s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn test_static_rejects_wrong_token() {
        let auth = StaticTokenAuthorizer::new("s3cret");
        assert_eq!(
            auth.authorize("s3cres").await,
            Err(TelemetryError::Unauthorized)
        );
        assert_eq!(
            auth.authorize("s3cret-longer").await,
            Err(TelemetryError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_static_rejects_empty_token() {
        let auth = StaticTokenAuthorizer::new("s3cret");
        assert_eq!(auth.authorize("").await, Err(TelemetryError::Unauthorized));
    }

    #[tokio::test]
    async fn test_static_with_empty_secret_rejects_everything() {
        let auth = StaticTokenAuthorizer::new("");
        assert_eq!(auth.authorize("").await, Err(TelemetryError::Unauthorized));
        assert_eq!(auth.authorize("x").await, Err(TelemetryError::Unauthorized));
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAllAuthorizer.authorize("").await.is_ok());
        assert!(AllowAllAuthorizer.authorize("anything").await.is_ok());
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "ab"));
        assert!(!tokens_match("", "abc"));
    }
}
