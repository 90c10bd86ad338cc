//! Call Context
//!
//! Per-call deadline and cancellation carried into the service.

use crate::domain::errors::TelemetryError;
use crate::infrastructure::ShutdownController;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Deadline and cancellation source for a single service call.
///
/// The default context never expires and is never cancelled.
#[derive(Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    shutdown: Option<ShutdownController>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the call once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancel the call when the controller initiates shutdown.
    pub fn with_shutdown(mut self, shutdown: ShutdownController) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the call is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), TelemetryError> {
        if self.shutdown.as_ref().is_some_and(|s| s.is_shutdown()) {
            return Err(TelemetryError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(TelemetryError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the call is cancelled first.
    ///
    /// The check happens before `fut` is first polled, so a call that is
    /// already cancelled never starts the underlying operation.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TelemetryError>
    where
        F: Future<Output = Result<T, TelemetryError>>,
    {
        self.check()?;

        let cancelled = async {
            match &self.shutdown {
                Some(s) => s.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(TelemetryError::Cancelled),
            _ = expired => Err(TelemetryError::DeadlineExceeded),
            res = fut => res,
        }
    }
}
