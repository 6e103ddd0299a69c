//! Configuration consumed by the sync engine.
//!
//! Supplied by the surrounding host (CLI, service, UI); the engine only
//! reads it. Secrets are held as [`SecretString`] and never appear in
//! `Debug` output or logs.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{SyncError, SyncResult};

/// Default token authority for SharePoint app-only authentication.
pub const DEFAULT_AUTHORITY: &str = "https://accounts.accesscontrol.windows.net";

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_page_delay_ms() -> u64 {
    100
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_size() -> usize {
    500
}

fn default_sqlserver_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

/// SharePoint connection and fetch settings.
#[derive(Clone, Deserialize)]
pub struct SharePointSettings {
    /// Azure AD tenant id.
    pub tenant_id: String,
    /// App-only client id.
    pub client_id: String,
    /// App-only client secret.
    pub client_secret: SecretString,
    /// Site URL, e.g. `https://contoso.sharepoint.com/sites/Ops`.
    pub site_url: String,
    /// Title of the list to pull.
    pub list_name: String,
    /// Token authority base URL. Overridable for tests.
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Page-size hint (`$top`) for list item requests.
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Courtesy delay between page requests in milliseconds; 0 disables.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// HTTP connection/read timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    /// Maximum retry attempts for transient auth/fetch failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl SharePointSettings {
    /// Host portion of the site URL, used as the token resource domain.
    pub fn site_domain(&self) -> SyncResult<String> {
        let parsed = url::Url::parse(&self.site_url)
            .map_err(|e| SyncError::config(format!("invalid site_url: {e}")))?;
        parsed
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| SyncError::config("site_url has no host"))
    }

    /// SHA-256 fingerprint of the credential set, used as the token-cache
    /// key so a credential change invalidates cached tokens.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.authority.as_bytes());
        hasher.update([0]);
        hasher.update(self.tenant_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.client_id.as_bytes());
        hasher.update([0]);
        hasher.update(self.client_secret.expose_secret().as_bytes());
        hasher.update([0]);
        hasher.update(self.site_url.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn validate(&self, errors: &mut Vec<String>) {
        if self.tenant_id.trim().is_empty() {
            errors.push("tenant_id is missing".to_string());
        }
        if self.client_id.trim().is_empty() {
            errors.push("client_id is missing".to_string());
        }
        if self.client_secret.expose_secret().is_empty() {
            errors.push("client_secret is missing".to_string());
        }
        if self.list_name.trim().is_empty() {
            errors.push("list_name is missing".to_string());
        }
        if self.site_url.trim().is_empty() {
            errors.push("site_url is missing".to_string());
        } else if self.site_domain().is_err() {
            errors.push(format!("site_url '{}' is not a valid URL", self.site_url));
        }
    }
}

impl std::fmt::Debug for SharePointSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharePointSettings")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("site_url", &self.site_url)
            .field("list_name", &self.list_name)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// SQL Server connection parameters.
#[derive(Clone, Deserialize)]
pub struct SqlServerSettings {
    /// Server hostname or IP.
    pub server: String,
    /// TCP port.
    #[serde(default = "default_sqlserver_port")]
    pub port: u16,
    /// Database name.
    pub database: String,
    /// SQL login username.
    pub username: String,
    /// SQL login password.
    pub password: SecretString,
    /// Accept the server certificate without validation.
    #[serde(default = "default_true")]
    pub trust_cert: bool,
}

impl std::fmt::Debug for SqlServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish_non_exhaustive()
    }
}

/// SQLite connection parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteSettings {
    /// Path to the database file; created if missing.
    pub file: PathBuf,
}

/// Destination database settings, tagged by driver.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DatabaseSettings {
    /// Microsoft SQL Server.
    SqlServer(SqlServerSettings),
    /// Embedded SQLite file.
    Sqlite(SqliteSettings),
}

impl DatabaseSettings {
    /// Driver identifier string.
    pub fn driver(&self) -> &'static str {
        match self {
            DatabaseSettings::SqlServer(_) => "sqlserver",
            DatabaseSettings::Sqlite(_) => "sqlite",
        }
    }

    /// Human-readable target description, safe to log.
    pub fn display_name(&self) -> String {
        match self {
            DatabaseSettings::SqlServer(s) => {
                format!("sqlserver: {}@{}/{}", s.username, s.server, s.database)
            }
            DatabaseSettings::Sqlite(s) => format!("sqlite: {}", s.file.display()),
        }
    }

    /// SHA-256 fingerprint of the connection parameters, used as the
    /// connection-cache key. Secrets participate so a credential change
    /// invalidates cached connectors.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            DatabaseSettings::SqlServer(s) => {
                hasher.update(b"sqlserver\0");
                hasher.update(s.server.as_bytes());
                hasher.update([0]);
                hasher.update(s.port.to_le_bytes());
                hasher.update(s.database.as_bytes());
                hasher.update([0]);
                hasher.update(s.username.as_bytes());
                hasher.update([0]);
                hasher.update(s.password.expose_secret().as_bytes());
            }
            DatabaseSettings::Sqlite(s) => {
                hasher.update(b"sqlite\0");
                hasher.update(s.file.to_string_lossy().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    fn validate(&self, errors: &mut Vec<String>) {
        match self {
            DatabaseSettings::SqlServer(s) => {
                if s.server.trim().is_empty() {
                    errors.push("sql server host is missing".to_string());
                }
                if s.database.trim().is_empty() {
                    errors.push("sql database name is missing".to_string());
                }
                if s.username.trim().is_empty() {
                    errors.push("sql username is missing".to_string());
                }
                if s.password.expose_secret().is_empty() {
                    errors.push("sql password is missing".to_string());
                }
            }
            DatabaseSettings::Sqlite(s) => {
                if s.file.as_os_str().is_empty() {
                    errors.push("sqlite file path is missing".to_string());
                }
            }
        }
    }
}

/// Full configuration for one sync target.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// SharePoint source settings.
    pub sharepoint: SharePointSettings,
    /// Destination database settings.
    pub database: DatabaseSettings,
    /// Destination table name.
    pub table_name: String,
    /// Create the destination table when absent.
    #[serde(default = "default_true")]
    pub create_table: bool,
    /// Delete all destination rows before inserting (full-refresh mode).
    #[serde(default)]
    pub truncate_before_insert: bool,
    /// Rows per insert batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Interval between scheduled syncs, in seconds. `None` means one-shot.
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

impl SyncSettings {
    /// Validate the configuration, collecting every problem into one error.
    pub fn validate(&self) -> SyncResult<()> {
        let mut errors = Vec::new();

        self.sharepoint.validate(&mut errors);
        self.database.validate(&mut errors);

        if self.table_name.trim().is_empty() {
            errors.push("table_name is missing".to_string());
        }
        if self.batch_size == 0 {
            errors.push("batch_size must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SyncError::config(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharepoint_settings() -> SharePointSettings {
        SharePointSettings {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string().into(),
            site_url: "https://contoso.sharepoint.com/sites/Ops".to_string(),
            list_name: "Tasks".to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            page_size: None,
            page_delay_ms: 0,
            connection_timeout_secs: 30,
            max_retries: 3,
        }
    }

    fn sqlite_settings() -> DatabaseSettings {
        DatabaseSettings::Sqlite(SqliteSettings {
            file: PathBuf::from("/tmp/mirror.db"),
        })
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            sharepoint: sharepoint_settings(),
            database: sqlite_settings(),
            table_name: "tasks".to_string(),
            create_table: true,
            truncate_before_insert: false,
            batch_size: 500,
            sync_interval_secs: None,
        }
    }

    #[test]
    fn test_valid_settings_pass() {
        settings().validate().unwrap();
    }

    #[test]
    fn test_missing_fields_collected() {
        let mut s = settings();
        s.sharepoint.tenant_id = String::new();
        s.table_name = String::new();

        let err = s.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("tenant_id"));
        assert!(message.contains("table_name"));
    }

    #[test]
    fn test_invalid_site_url_rejected() {
        let mut s = settings();
        s.sharepoint.site_url = "not a url".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_site_domain() {
        let sp = sharepoint_settings();
        assert_eq!(sp.site_domain().unwrap(), "contoso.sharepoint.com");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut sp = sharepoint_settings();
        sp.client_secret = "hunter2".to_string().into();
        let printed = format!("{sp:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_fingerprint_changes_with_credentials() {
        let a = DatabaseSettings::SqlServer(SqlServerSettings {
            server: "db".to_string(),
            port: 1433,
            database: "mirror".to_string(),
            username: "sa".to_string(),
            password: "one".to_string().into(),
            trust_cert: true,
        });
        let b = DatabaseSettings::SqlServer(SqlServerSettings {
            server: "db".to_string(),
            port: 1433,
            database: "mirror".to_string(),
            username: "sa".to_string(),
            password: "two".to_string().into(),
            trust_cert: true,
        });

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_database_settings_from_toml() {
        let sqlite: DatabaseSettings = serde_json::from_value(serde_json::json!({
            "driver": "sqlite",
            "file": "/tmp/x.db",
        }))
        .unwrap();
        assert_eq!(sqlite.driver(), "sqlite");

        let mssql: DatabaseSettings = serde_json::from_value(serde_json::json!({
            "driver": "sqlserver",
            "server": "db.example.com",
            "database": "mirror",
            "username": "sa",
            "password": "pw",
        }))
        .unwrap();
        assert_eq!(mssql.driver(), "sqlserver");
        match mssql {
            DatabaseSettings::SqlServer(s) => {
                assert_eq!(s.port, 1433);
                assert!(s.trust_cert);
            }
            DatabaseSettings::Sqlite(_) => panic!("wrong driver"),
        }
    }
}
