//! Telemetry Service - Main application use case
//!
//! Orchestrates ingestion and retrieval: validating the reporting IP,
//! enriching records with geolocation, upserting them by IP, and
//! serving paginated reads. This is the primary interface for the
//! inbound adapter.

use crate::application::context::CallContext;
use crate::domain::entities::Telemetry;
use crate::domain::errors::TelemetryError;
use crate::domain::ports::{Authorizer, Clock, GeoResolver, SystemClock, TelemetryRepository};
use crate::domain::services::Paginator;
use crate::domain::value_objects::{PageLimits, PageMetadata, TelemetryPage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

/// The telemetry capability shared by the service and its decorators.
#[async_trait]
pub trait TelemetryService: Send + Sync {
    /// Enrich and persist a report, returning the stored record.
    async fn save(&self, ctx: &CallContext, telemetry: Telemetry)
        -> Result<Telemetry, TelemetryError>;

    /// List stored records from the selected repository.
    ///
    /// An empty `repo` selects the default repository.
    async fn get_all(
        &self,
        ctx: &CallContext,
        repo: &str,
        token: &str,
        pm: PageMetadata,
    ) -> Result<TelemetryPage, TelemetryError>;
}

/// Homing service - the core telemetry use case.
///
/// Geo lookups never fail a save; only validation, cancellation and
/// repository errors are surfaced.
pub struct HomingService {
    repositories: HashMap<String, Arc<dyn TelemetryRepository>>,
    default_repo: String,
    geo_resolver: Arc<dyn GeoResolver>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    limits: PageLimits,
}

impl HomingService {
    /// Create a service writing to `repo`, registered under its backend name.
    pub fn new(
        repo: Arc<dyn TelemetryRepository>,
        geo_resolver: Arc<dyn GeoResolver>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let default_repo = repo.name().to_string();
        let mut repositories = HashMap::new();
        repositories.insert(default_repo.clone(), repo);
        Self {
            repositories,
            default_repo,
            geo_resolver,
            authorizer,
            clock: Arc::new(SystemClock),
            limits: PageLimits::default(),
        }
    }

    /// Register an additional repository readable through `get_all`.
    pub fn with_repository(
        mut self,
        name: impl Into<String>,
        repo: Arc<dyn TelemetryRepository>,
    ) -> Self {
        self.repositories.insert(name.into(), repo);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Name of the repository that receives writes.
    pub fn default_repository(&self) -> &str {
        &self.default_repo
    }

    fn repository(&self, name: &str) -> Result<&Arc<dyn TelemetryRepository>, TelemetryError> {
        let name = if name.is_empty() {
            self.default_repo.as_str()
        } else {
            name
        };
        self.repositories
            .get(name)
            .ok_or_else(|| TelemetryError::invalid(format!("unknown repository: {name}")))
    }

    /// Parse and canonicalize a reported IP address.
    fn validate_ip(raw: &str) -> Result<IpAddr, TelemetryError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TelemetryError::invalid("ip address is required"));
        }
        raw.parse()
            .map_err(|_| TelemetryError::invalid(format!("malformed ip address: {raw}")))
    }
}

#[async_trait]
impl TelemetryService for HomingService {
    async fn save(
        &self,
        ctx: &CallContext,
        mut telemetry: Telemetry,
    ) -> Result<Telemetry, TelemetryError> {
        let ip = Self::validate_ip(&telemetry.ip_address)?;
        ctx.check()?;

        telemetry.ip_address = ip.to_string();
        telemetry.normalize_services();

        let geo = self.geo_resolver.resolve(ip);
        if geo.is_none() {
            tracing::warn!("no geolocation for {}, storing without location", ip);
        }
        telemetry.apply_geo(geo);

        telemetry.last_seen = self.clock.now();
        telemetry.id = Uuid::new_v4().to_string();

        let repo = self.repository("")?;
        ctx.run(async { repo.upsert(telemetry).await.map_err(TelemetryError::from) })
            .await
    }

    async fn get_all(
        &self,
        ctx: &CallContext,
        repo: &str,
        token: &str,
        pm: PageMetadata,
    ) -> Result<TelemetryPage, TelemetryError> {
        ctx.check()?;
        ctx.run(self.authorizer.authorize(token)).await?;

        let query = Paginator::normalize(pm, self.limits)?;
        let repo = self.repository(repo)?;

        ctx.run(async { repo.list(&query).await.map_err(TelemetryError::from) })
            .await
    }
}
