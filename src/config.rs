use serde::Deserialize;

/// Storage backend selected by `HOMING_REPOSITORY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryKind {
    Memory,
    Sqlite,
    Sheets,
}

impl RepositoryKind {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "" => Ok(RepositoryKind::Memory),
            "sqlite" => Ok(RepositoryKind::Sqlite),
            "sheets" => Ok(RepositoryKind::Sheets),
            other => Err(ConfigError::UnknownRepository(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("HOMING_IP_DB is required")]
    MissingIpDb,
    #[error("unknown repository kind {0:?} (expected memory, sqlite or sheets)")]
    UnknownRepository(String),
    #[error("sheets repository requires {0}")]
    MissingSheetsSetting(&'static str),
    #[error("max limit must be greater than zero")]
    ZeroMaxLimit,
    #[error("default limit {default} exceeds max limit {max}")]
    DefaultAboveMax { default: u64, max: u64 },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Server settings
    pub listen_addr: String,
    pub request_timeout_secs: u64,
    pub debug: bool,

    // Geolocation
    pub ip_db: Option<String>,

    // Storage settings
    pub repository: String,
    pub sqlite_path: String,
    pub sheets_api_url: String,
    pub sheets_spreadsheet_id: Option<String>,
    pub sheets_sheet_name: String,
    pub sheets_access_token: Option<String>,

    // Read access
    pub api_token: Option<String>,
    pub default_limit: u64,
    pub max_limit: u64,

    // Ingestion rate limiting
    pub rate_limit_per_min: u64,
    pub rate_limit_burst: u64,
    /// Rate limit by X-Forwarded-For; set only behind a trusted proxy
    pub trust_forwarded: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 10,
            debug: false,
            ip_db: None,
            repository: "memory".to_string(),
            sqlite_path: "homing.db".to_string(),
            sheets_api_url: "https://sheets.googleapis.com".to_string(),
            sheets_spreadsheet_id: None,
            sheets_sheet_name: "Telemetry".to_string(),
            sheets_access_token: None,
            api_token: None,
            default_limit: 10,
            max_limit: 100,
            rate_limit_per_min: 60,
            rate_limit_burst: 10,
            trust_forwarded: false,
        }
    }
}

impl Config {
    pub fn repository_kind(&self) -> Result<RepositoryKind, ConfigError> {
        RepositoryKind::parse(&self.repository)
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip_db.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingIpDb);
        }
        if self.repository_kind()? == RepositoryKind::Sheets {
            if self.sheets_spreadsheet_id.is_none() {
                return Err(ConfigError::MissingSheetsSetting(
                    "HOMING_SHEETS_SPREADSHEET_ID",
                ));
            }
            if self.sheets_access_token.is_none() {
                return Err(ConfigError::MissingSheetsSetting(
                    "HOMING_SHEETS_ACCESS_TOKEN",
                ));
            }
        }
        if self.max_limit == 0 {
            return Err(ConfigError::ZeroMaxLimit);
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::DefaultAboveMax {
                default: self.default_limit,
                max: self.max_limit,
            });
        }
        Ok(())
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    Ok(config_from(|key| std::env::var(key).ok()))
}

/// Build a config from a variable lookup. Unparseable numbers keep their default.
fn config_from<F>(var: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
    let number = |key: &str, default: u64| {
        var(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    };
    let flag = |key: &str| {
        var(key).is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        })
    };

    Config {
        listen_addr: non_empty("HOMING_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
        request_timeout_secs: number("HOMING_REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
        debug: var("DEBUG").is_some(),

        ip_db: non_empty("HOMING_IP_DB"),

        repository: non_empty("HOMING_REPOSITORY").unwrap_or(defaults.repository),
        sqlite_path: non_empty("HOMING_SQLITE_PATH").unwrap_or(defaults.sqlite_path),
        sheets_api_url: non_empty("HOMING_SHEETS_API_URL").unwrap_or(defaults.sheets_api_url),
        sheets_spreadsheet_id: non_empty("HOMING_SHEETS_SPREADSHEET_ID"),
        sheets_sheet_name: non_empty("HOMING_SHEETS_SHEET_NAME")
            .unwrap_or(defaults.sheets_sheet_name),
        sheets_access_token: non_empty("HOMING_SHEETS_ACCESS_TOKEN"),

        api_token: non_empty("HOMING_API_TOKEN"),
        default_limit: number("HOMING_DEFAULT_LIMIT", defaults.default_limit),
        max_limit: number("HOMING_MAX_LIMIT", defaults.max_limit),

        rate_limit_per_min: number("HOMING_RATE_LIMIT_PER_MIN", defaults.rate_limit_per_min),
        rate_limit_burst: number("HOMING_RATE_LIMIT_BURST", defaults.rate_limit_burst),
        trust_forwarded: flag("HOMING_TRUST_FORWARDED"),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config_from(|key| vars.get(key).cloned())
    }

    fn valid() -> Config {
        Config {
            ip_db: Some("GeoLite2-City.mmdb".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.repository, "memory");
        assert_eq!(cfg.default_limit, 10);
        assert_eq!(cfg.max_limit, 100);
        assert!(cfg.ip_db.is_none());
        assert!(!cfg.debug);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let cfg = config_with(&[]);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.sqlite_path, "homing.db");
        assert_eq!(cfg.sheets_sheet_name, "Telemetry");
        assert_eq!(cfg.request_timeout_secs, 10);
        assert_eq!(cfg.rate_limit_per_min, 60);
        assert_eq!(cfg.rate_limit_burst, 10);
    }

    #[test]
    fn test_custom_values() {
        let cfg = config_with(&[
            ("HOMING_LISTEN_ADDR", "127.0.0.1:9000"),
            ("HOMING_IP_DB", "/data/GeoLite2-City.mmdb"),
            ("HOMING_REPOSITORY", "sqlite"),
            ("HOMING_SQLITE_PATH", "/tmp/homing.db"),
            ("HOMING_API_TOKEN", "tok"),
            ("HOMING_DEFAULT_LIMIT", "20"),
            ("HOMING_MAX_LIMIT", "50"),
            ("DEBUG", "1"),
        ]);
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.ip_db.as_deref(), Some("/data/GeoLite2-City.mmdb"));
        assert_eq!(cfg.repository_kind(), Ok(RepositoryKind::Sqlite));
        assert_eq!(cfg.sqlite_path, "/tmp/homing.db");
        assert_eq!(cfg.api_token.as_deref(), Some("tok"));
        assert_eq!(cfg.default_limit, 20);
        assert_eq!(cfg.max_limit, 50);
        assert!(cfg.debug);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_error_uses_default() {
        let cfg = config_with(&[("HOMING_MAX_LIMIT", "lots")]);
        assert_eq!(cfg.max_limit, 100);
    }

    #[test]
    fn test_trust_forwarded_flag() {
        assert!(!config_with(&[]).trust_forwarded);
        assert!(config_with(&[("HOMING_TRUST_FORWARDED", "true")]).trust_forwarded);
        assert!(config_with(&[("HOMING_TRUST_FORWARDED", "1")]).trust_forwarded);
        assert!(!config_with(&[("HOMING_TRUST_FORWARDED", "no")]).trust_forwarded);
    }

    #[test]
    fn test_empty_token_is_unset() {
        let cfg = config_with(&[("HOMING_API_TOKEN", "  ")]);
        assert!(cfg.api_token.is_none());
    }

    #[test]
    fn test_repository_kind_parse() {
        assert_eq!(RepositoryKind::parse("MEMORY"), Ok(RepositoryKind::Memory));
        assert_eq!(RepositoryKind::parse("sheets"), Ok(RepositoryKind::Sheets));
        assert_eq!(
            RepositoryKind::parse("timescale"),
            Err(ConfigError::UnknownRepository("timescale".to_string()))
        );
    }

    #[test]
    fn test_validate_requires_ip_db() {
        assert_eq!(Config::default().validate(), Err(ConfigError::MissingIpDb));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_sheets_settings() {
        let mut cfg = valid();
        cfg.repository = "sheets".to_string();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingSheetsSetting("HOMING_SHEETS_SPREADSHEET_ID"))
        );

        cfg.sheets_spreadsheet_id = Some("abc".to_string());
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingSheetsSetting("HOMING_SHEETS_ACCESS_TOKEN"))
        );

        cfg.sheets_access_token = Some("ya29".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_limits() {
        let mut cfg = valid();
        cfg.max_limit = 0;
        cfg.default_limit = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMaxLimit));

        cfg.max_limit = 5;
        cfg.default_limit = 6;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DefaultAboveMax { default: 6, max: 5 })
        );
    }

    #[test]
    fn test_validate_unknown_repository() {
        let mut cfg = valid();
        cfg.repository = "postgres".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownRepository(_))
        ));
    }

    #[test]
    fn test_load_config_reads_environment() {
        std::env::set_var("HOMING_SHEETS_SHEET_NAME", "Instances");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.sheets_sheet_name, "Instances");
        std::env::remove_var("HOMING_SHEETS_SHEET_NAME");
    }

    #[test]
    fn test_config_debug() {
        let cfg = Config::default();
        let debug_str = format!("{:?}", cfg);
        assert!(debug_str.contains("listen_addr"));
        assert!(debug_str.contains("0.0.0.0:8080"));
    }
}
