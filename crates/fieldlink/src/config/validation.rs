//! Connection configuration validation.
//!
//! Validation reports every missing field, not just the first, so the
//! workflow layer can surface one complete message to the user.

use super::types::{ConnectorKind, RegistryConfig, SqlConnectionConfig};
use crate::error::{ConnectorError, Result};

/// Collect the names of required fields missing from a SQL config.
///
/// SQLite only needs a storage location; every other dialect needs the full
/// host/port/user/password/database set.
pub fn missing_sql_fields(kind: ConnectorKind, cfg: &SqlConnectionConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();

    if kind == ConnectorKind::Sqlite {
        if cfg.sqlite_path().is_none() {
            missing.push("file_path");
        }
        return missing;
    }

    if cfg.host.is_empty() {
        missing.push("host");
    }
    if cfg.port == 0 {
        missing.push("port");
    }
    if cfg.user.is_empty() {
        missing.push("user");
    }
    if cfg.password.is_empty() {
        missing.push("password");
    }
    if cfg.database.is_empty() {
        missing.push("database");
    }

    missing
}

/// Validate a SQL config, naming every missing field.
pub fn validate_sql_config(kind: ConnectorKind, cfg: &SqlConnectionConfig) -> Result<()> {
    let missing = missing_sql_fields(kind, cfg);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConnectorError::missing_fields(&missing))
    }
}

/// Validate a registry config: base URL and token are both required.
pub fn validate_registry_config(cfg: &RegistryConfig) -> Result<()> {
    let mut missing = Vec::new();
    if cfg.base_url.is_empty() {
        missing.push("base_url");
    }
    if cfg.api_token.is_empty() {
        missing.push("api_token");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConnectorError::missing_fields(&missing))
    }
}
