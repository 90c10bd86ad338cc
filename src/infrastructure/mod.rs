//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod rate_limiter;
pub mod shutdown;

pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownController};
