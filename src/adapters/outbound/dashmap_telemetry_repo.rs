//! DashMap Telemetry Repository
//!
//! Implements TelemetryRepository in memory using DashMap.

use crate::domain::entities::Telemetry;
use crate::domain::errors::RepositoryError;
use crate::domain::ports::TelemetryRepository;
use crate::domain::services::Paginator;
use crate::domain::value_objects::{PageQuery, TelemetryPage};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// DashMap-backed telemetry repository.
///
/// Records are keyed by IP address. The entry API holds the shard lock
/// for the whole read-modify-write, so upserts for one IP are atomic.
/// Contents are lost on restart.
pub struct DashMapTelemetryRepository {
    records: Arc<DashMap<String, Telemetry>>,
}

impl DashMapTelemetryRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up the stored record for an IP.
    pub fn get(&self, ip_address: &str) -> Option<Telemetry> {
        self.records.get(ip_address).map(|e| e.value().clone())
    }
}

impl Default for DashMapTelemetryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryRepository for DashMapTelemetryRepository {
    async fn upsert(&self, telemetry: Telemetry) -> Result<Telemetry, RepositoryError> {
        let stored = match self.records.entry(telemetry.ip_address.clone()) {
            Entry::Occupied(mut entry) => {
                let id = entry.get().id.clone();
                let record = entry.get_mut();
                *record = Telemetry { id, ..telemetry };
                record.clone()
            }
            Entry::Vacant(entry) => entry.insert(telemetry).value().clone(),
        };
        Ok(stored)
    }

    async fn list(&self, query: &PageQuery) -> Result<TelemetryPage, RepositoryError> {
        let snapshot: Vec<Telemetry> = self.records.iter().map(|e| e.value().clone()).collect();
        Ok(Paginator::paginate(snapshot, query))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
