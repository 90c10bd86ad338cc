//! Google Sheets Telemetry Repository
//!
//! Implements TelemetryRepository on top of a spreadsheet via the
//! Sheets v4 values API. Row 1 is a header; each following row is one
//! record with columns:
//!
//! `id | ip_address | longitude | latitude | version | services | last_seen | country | city`

use crate::domain::entities::Telemetry;
use crate::domain::errors::RepositoryError;
use crate::domain::ports::TelemetryRepository;
use crate::domain::services::Paginator;
use crate::domain::value_objects::{PageQuery, TelemetryPage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// First data row; row 1 holds the header.
const FIRST_DATA_ROW: usize = 2;
const LAST_COLUMN: &str = "I";

/// Configuration for the Sheets connection.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Base URL of the Sheets API (e.g., "https://sheets.googleapis.com")
    pub api_url: String,
    pub spreadsheet_id: String,
    /// Tab holding the records
    pub sheet_name: String,
    /// OAuth2 bearer access token
    pub access_token: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://sheets.googleapis.com".to_string(),
            spreadsheet_id: String::new(),
            sheet_name: "Telemetry".to_string(),
            access_token: String::new(),
        }
    }
}

/// Response body of `values.get`.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Request body of `values.update` and `values.append`.
#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: Vec<Vec<Value>>,
}

/// Spreadsheet-backed telemetry repository.
///
/// The sheet has no native upsert, so saves read the whole range,
/// then update the matching row or append a new one. A process-wide
/// mutex serializes that read-modify-write.
pub struct SheetsTelemetryRepository {
    config: SheetsConfig,
    client: reqwest::Client,
    write_lock: Mutex<()>,
}

impl SheetsTelemetryRepository {
    pub fn new(config: SheetsConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: SheetsConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            write_lock: Mutex::new(()),
        }
    }

    /// Build `{api_url}/v4/spreadsheets/{id}/values/{range}[suffix]`.
    fn values_url(&self, range: &str) -> Result<Url, RepositoryError> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| RepositoryError::Connection(format!("invalid sheets api url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RepositoryError::Connection("sheets api url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    fn data_range(&self) -> String {
        format!("{}!A{}:{}", self.config.sheet_name, FIRST_DATA_ROW, LAST_COLUMN)
    }

    fn row_range(&self, row: usize) -> String {
        format!("{}!A{}:{}{}", self.config.sheet_name, row, LAST_COLUMN, row)
    }

    /// Turn a non-2xx response into a repository error.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RepositoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let msg = format!("sheets api returned {}: {}", status, body);
        if status.is_server_error() {
            Err(RepositoryError::Connection(msg))
        } else {
            Err(RepositoryError::Query(msg))
        }
    }

    /// Fetch all data rows as `(sheet row number, record)`.
    async fn read_rows(&self) -> Result<Vec<(usize, Telemetry)>, RepositoryError> {
        let mut url = self.values_url(&self.data_range())?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let range: ValueRange = Self::check_status(response).await?.json().await?;

        let mut rows = Vec::with_capacity(range.values.len());
        for (index, cells) in range.values.iter().enumerate() {
            let row = FIRST_DATA_ROW + index;
            match Self::row_to_telemetry(cells) {
                Ok(Some(t)) => rows.push((row, t)),
                Ok(None) => {}
                Err(e) => return Err(RepositoryError::Data(format!("row {}: {}", row, e))),
            }
        }
        Ok(rows)
    }

    /// Parse one sheet row. Blank rows yield `None`.
    fn row_to_telemetry(cells: &[Value]) -> Result<Option<Telemetry>, String> {
        let text = |i: usize| cells.get(i).map(cell_text).unwrap_or_default();
        let optional = |i: usize| Some(text(i)).filter(|s| !s.is_empty());

        let ip_address = text(1);
        if ip_address.is_empty() {
            return Ok(None);
        }

        let last_seen_raw = text(6);
        let last_seen = if last_seen_raw.is_empty() {
            DateTime::<Utc>::default()
        } else {
            DateTime::parse_from_rfc3339(&last_seen_raw)
                .map_err(|e| format!("invalid last_seen {:?}: {}", last_seen_raw, e))?
                .with_timezone(&Utc)
        };

        Ok(Some(Telemetry {
            id: text(0),
            ip_address,
            longitude: cell_f64(cells.get(2))?,
            latitude: cell_f64(cells.get(3))?,
            version: optional(4),
            services: Telemetry::split_services(&text(5)),
            last_seen,
            country: optional(7),
            city: optional(8),
        }))
    }

    fn telemetry_to_row(t: &Telemetry) -> Vec<Value> {
        vec![
            Value::from(t.id.clone()),
            Value::from(t.ip_address.clone()),
            Value::from(t.longitude),
            Value::from(t.latitude),
            Value::from(t.version.clone().unwrap_or_default()),
            Value::from(t.services_joined()),
            Value::from(t.last_seen.to_rfc3339()),
            Value::from(t.country.clone().unwrap_or_default()),
            Value::from(t.city.clone().unwrap_or_default()),
        ]
    }

    /// Overwrite a single sheet row.
    async fn update_row(&self, row: usize, t: &Telemetry) -> Result<(), RepositoryError> {
        let range = self.row_range(row);
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: vec![Self::telemetry_to_row(t)],
        };
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Append a row after the last data row.
    async fn append_row(&self, t: &Telemetry) -> Result<(), RepositoryError> {
        let range = format!("{}!A:{}", self.config.sheet_name, LAST_COLUMN);
        let mut url = self.values_url(&format!("{}:append", range))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = ValueRangeBody {
            range: &range,
            major_dimension: "ROWS",
            values: vec![Self::telemetry_to_row(t)],
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

/// Render a cell as text; numbers keep their JSON form.
fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_f64(v: Option<&Value>) -> Result<f64, String> {
    match v {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("invalid number {}", n)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| format!("invalid coordinate {:?}", s)),
        Some(other) => Err(format!("invalid coordinate {}", other)),
    }
}

#[async_trait]
impl TelemetryRepository for SheetsTelemetryRepository {
    async fn upsert(&self, telemetry: Telemetry) -> Result<Telemetry, RepositoryError> {
        let _guard = self.write_lock.lock().await;

        let rows = self.read_rows().await?;
        match rows
            .into_iter()
            .find(|(_, t)| t.ip_address == telemetry.ip_address)
        {
            Some((row, existing)) => {
                let stored = Telemetry {
                    id: existing.id,
                    ..telemetry
                };
                self.update_row(row, &stored).await?;
                tracing::debug!("sheets: updated row {} for {}", row, stored.ip_address);
                Ok(stored)
            }
            None => {
                self.append_row(&telemetry).await?;
                tracing::debug!("sheets: appended row for {}", telemetry.ip_address);
                Ok(telemetry)
            }
        }
    }

    async fn list(&self, query: &PageQuery) -> Result<TelemetryPage, RepositoryError> {
        let records: Vec<Telemetry> = self
            .read_rows()
            .await?
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        Ok(Paginator::paginate(records, query))
    }

    fn name(&self) -> &'static str {
        "sheets"
    }
}
