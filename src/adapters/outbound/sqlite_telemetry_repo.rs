//! SQLite Telemetry Repository
//!
//! Implements TelemetryRepository using SQLite for storage.
//! Applies its own schema migrations when opened.

use crate::domain::entities::Telemetry;
use crate::domain::errors::RepositoryError;
use crate::domain::ports::TelemetryRepository;
use crate::domain::value_objects::{PageQuery, TelemetryFilter, TelemetryPage};
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::sync::Arc;

/// Ordered schema migrations; `PRAGMA user_version` records how many ran.
const MIGRATIONS: &[(&str, &str)] = &[(
    "telemetry_1",
    r#"
CREATE TABLE IF NOT EXISTS telemetry (
    id          TEXT PRIMARY KEY,
    ip_address  TEXT NOT NULL UNIQUE,
    longitude   REAL NOT NULL,
    latitude    REAL NOT NULL,
    version     TEXT,
    services    TEXT,
    last_seen   INTEGER NOT NULL,
    country     TEXT,
    city        TEXT
);

CREATE INDEX IF NOT EXISTS idx_telemetry_last_seen ON telemetry(last_seen DESC, id);
"#,
)];

const COLUMNS: &str =
    "id, ip_address, longitude, latitude, version, services, last_seen, country, city";

/// SQLite-backed telemetry repository.
///
/// rusqlite is blocking, so every call runs on the blocking pool with
/// the connection behind a mutex. The upsert is a single
/// `INSERT ... ON CONFLICT` statement, atomic per IP.
pub struct SqliteTelemetryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTelemetryRepository {
    /// Open (or create) a database file and migrate it.
    pub fn open(path: &str) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)
            .map_err(|e| RepositoryError::Connection(format!("{}: {}", path, e)))?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self, RepositoryError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Apply migrations not yet recorded in `user_version`.
    fn migrate(conn: &mut Connection) -> Result<(), RepositoryError> {
        let applied: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let applied = usize::try_from(applied).unwrap_or(0);

        for (index, (id, sql)) in MIGRATIONS.iter().enumerate().skip(applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.pragma_update(None, "user_version", (index + 1) as i64)?;
            tx.commit()?;
            tracing::info!("applied sqlite migration {}", id);
        }
        Ok(())
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| RepositoryError::Query(format!("spawn_blocking error: {}", e)))?
    }

    /// Convert a SQLite row to a Telemetry entity.
    fn row_to_telemetry(row: &Row) -> rusqlite::Result<Telemetry> {
        let micros: i64 = row.get(6)?;
        let last_seen = DateTime::from_timestamp_micros(micros)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, micros))?;
        let services: Option<String> = row.get(5)?;

        Ok(Telemetry {
            id: row.get(0)?,
            ip_address: row.get(1)?,
            longitude: row.get(2)?,
            latitude: row.get(3)?,
            version: row.get(4)?,
            services: services
                .as_deref()
                .map(Telemetry::split_services)
                .unwrap_or_default(),
            last_seen,
            country: row.get(7)?,
            city: row.get(8)?,
        })
    }

    /// WHERE clause and bound values for a filter.
    fn where_clause(filter: &TelemetryFilter) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        for (column, value) in [
            ("country", &filter.country),
            ("city", &filter.city),
            ("version", &filter.version),
        ] {
            if let Some(v) = value {
                values.push(Value::Text(v.clone()));
                conditions.push(format!("{} = ?{}", column, values.len()));
            }
        }
        if let Some(service) = &filter.service {
            values.push(Value::Text(service.clone()));
            conditions.push(format!(
                "instr(',' || IFNULL(services, '') || ',', ',' || ?{} || ',') > 0",
                values.len()
            ));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

#[async_trait]
impl TelemetryRepository for SqliteTelemetryRepository {
    async fn upsert(&self, telemetry: Telemetry) -> Result<Telemetry, RepositoryError> {
        self.with_conn(move |conn| {
            let services = (!telemetry.services.is_empty()).then(|| telemetry.services_joined());
            let sql = format!(
                "INSERT INTO telemetry ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(ip_address) DO UPDATE SET
                     longitude = excluded.longitude,
                     latitude  = excluded.latitude,
                     version   = excluded.version,
                     services  = excluded.services,
                     last_seen = excluded.last_seen,
                     country   = excluded.country,
                     city      = excluded.city
                 RETURNING {COLUMNS}"
            );
            let stored = conn.query_row(
                &sql,
                params![
                    telemetry.id,
                    telemetry.ip_address,
                    telemetry.longitude,
                    telemetry.latitude,
                    telemetry.version,
                    services,
                    telemetry.last_seen.timestamp_micros(),
                    telemetry.country,
                    telemetry.city,
                ],
                Self::row_to_telemetry,
            )?;
            Ok(stored)
        })
        .await
    }

    async fn list(&self, query: &PageQuery) -> Result<TelemetryPage, RepositoryError> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let (where_sql, mut values) = Self::where_clause(&query.filter);

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM telemetry {where_sql}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            values.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));
            let limit_idx = values.len();
            values.push(Value::Integer(i64::try_from(query.offset).unwrap_or(i64::MAX)));
            let offset_idx = values.len();

            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM telemetry {where_sql}
                 ORDER BY last_seen DESC, id ASC
                 LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
            ))?;
            let records = stmt
                .query_map(params_from_iter(values.iter()), Self::row_to_telemetry)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(TelemetryPage {
                total: total as u64,
                offset: query.offset,
                limit: query.limit,
                records,
            })
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
