//! Connection configuration type definitions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConnectorError;

/// Default connect timeout applied when the config does not set one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The kind of external system a connection record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Postgres,
    Mysql,
    Sqlite,
    Mssql,
    Oracle,
    Registry,
}

impl ConnectorKind {
    /// Dialect identifier used in logs and cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectorKind::Postgres => "postgres",
            ConnectorKind::Mysql => "mysql",
            ConnectorKind::Sqlite => "sqlite",
            ConnectorKind::Mssql => "mssql",
            ConnectorKind::Oracle => "oracle",
            ConnectorKind::Registry => "registry",
        }
    }

    /// Whether this kind is one of the SQL dialects.
    pub fn is_sql(&self) -> bool {
        !matches!(self, ConnectorKind::Registry)
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnectorKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(ConnectorKind::Postgres),
            "mysql" | "mariadb" => Ok(ConnectorKind::Mysql),
            "sqlite" | "sqlite3" => Ok(ConnectorKind::Sqlite),
            "mssql" | "sqlserver" | "sql_server" => Ok(ConnectorKind::Mssql),
            "oracle" => Ok(ConnectorKind::Oracle),
            "registry" | "dhis2" => Ok(ConnectorKind::Registry),
            other => Err(ConnectorError::UnsupportedConnector(other.to_string())),
        }
    }
}

/// How to reach one SQL database.
///
/// For every dialect except SQLite, `host`, `port`, `user`, `password` and
/// `database` are required. SQLite requires only `file_path` (or `database`
/// as a path fallback).
#[derive(Clone, Serialize, Deserialize)]
pub struct SqlConnectionConfig {
    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (0 means unset).
    #[serde(default)]
    pub port: u16,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// File path for SQLite databases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Encrypt the connection.
    #[serde(default)]
    pub tls: bool,

    /// Connect timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl SqlConnectionConfig {
    /// Effective connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// SQLite storage location: explicit file path, falling back to the
    /// database name.
    pub fn sqlite_path(&self) -> Option<&str> {
        match self.file_path.as_deref() {
            Some(p) if !p.is_empty() => Some(p),
            _ if !self.database.is_empty() => Some(&self.database),
            _ => None,
        }
    }
}

impl Default for SqlConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            file_path: None,
            tls: false,
            connect_timeout_secs: None,
        }
    }
}

// Passwords must never leak into logs.
impl fmt::Debug for SqlConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("file_path", &self.file_path)
            .field("tls", &self.tls)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// How to reach the registry REST API.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry instance, e.g. `https://play.dhis2.org/demo`.
    #[serde(default)]
    pub base_url: String,

    /// Personal access token sent as `Authorization: ApiToken <token>`.
    #[serde(default)]
    pub api_token: String,
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}
