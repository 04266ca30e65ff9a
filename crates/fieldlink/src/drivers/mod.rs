//! SQL dialect strategy implementations.
//!
//! One module per engine, each implementing [`SqlConnector`]:
//!
//! - [`postgres`]: PostgreSQL (tokio-postgres)
//! - [`mysql`]: MySQL/MariaDB (SQLx)
//! - [`sqlite`]: SQLite (SQLx)
//! - [`mssql`]: Microsoft SQL Server (Tiberius)
//! - [`oracle`]: Oracle (ODBC)
//!
//! # Adding a dialect
//!
//! 1. Create a new module under `drivers/` implementing `SqlConnector`
//! 2. Add its native error-code table feeding [`common::map_native_error`]
//! 3. Add an enum variant to [`SqlConnectorImpl`]
//! 4. Register the type alias in `ConnectorKind::from_str`

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

pub use mssql::MssqlConnector;
pub use mysql::MysqlConnector;
pub use oracle::OracleConnector;
pub use postgres::PostgresConnector;
pub use sqlite::SqliteConnector;

use async_trait::async_trait;

use crate::config::{ConnectorKind, SqlConnectionConfig};
use crate::core::field::{InsertedRow, PushPayload};
use crate::core::schema::SchemaMetadata;
use crate::core::traits::SqlConnector;
use crate::error::{ConnectorError, Result};

/// Enum-based static dispatch over the dialect strategies.
///
/// The compiler generates a match statement instead of vtable dispatch;
/// the set of dialects is closed, so the enum is the natural shape.
#[derive(Debug, Clone)]
pub enum SqlConnectorImpl {
    Postgres(PostgresConnector),
    Mysql(MysqlConnector),
    Sqlite(SqliteConnector),
    Mssql(MssqlConnector),
    Oracle(OracleConnector),
}

impl SqlConnectorImpl {
    /// Resolve the strategy for a connector kind.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedConnector` when the kind is not a SQL dialect.
    pub fn from_kind(kind: ConnectorKind) -> Result<Self> {
        match kind {
            ConnectorKind::Postgres => Ok(SqlConnectorImpl::Postgres(PostgresConnector::new())),
            ConnectorKind::Mysql => Ok(SqlConnectorImpl::Mysql(MysqlConnector::new())),
            ConnectorKind::Sqlite => Ok(SqlConnectorImpl::Sqlite(SqliteConnector::new())),
            ConnectorKind::Mssql => Ok(SqlConnectorImpl::Mssql(MssqlConnector::new())),
            ConnectorKind::Oracle => Ok(SqlConnectorImpl::Oracle(OracleConnector::new())),
            ConnectorKind::Registry => {
                Err(ConnectorError::UnsupportedConnector(kind.name().to_string()))
            }
        }
    }

    fn inner(&self) -> &dyn SqlConnector {
        match self {
            SqlConnectorImpl::Postgres(c) => c,
            SqlConnectorImpl::Mysql(c) => c,
            SqlConnectorImpl::Sqlite(c) => c,
            SqlConnectorImpl::Mssql(c) => c,
            SqlConnectorImpl::Oracle(c) => c,
        }
    }
}

#[async_trait]
impl SqlConnector for SqlConnectorImpl {
    fn dialect(&self) -> &'static str {
        self.inner().dialect()
    }

    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        self.inner().validate_config(cfg)
    }

    async fn test_connection(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        self.inner().test_connection(cfg).await
    }

    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>> {
        self.inner().fetch_schemas(cfg).await
    }

    async fn push_data(
        &self,
        cfg: &SqlConnectionConfig,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>> {
        self.inner().push_data(cfg, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kind_resolves_every_dialect() {
        for (kind, name) in [
            (ConnectorKind::Postgres, "postgres"),
            (ConnectorKind::Mysql, "mysql"),
            (ConnectorKind::Sqlite, "sqlite"),
            (ConnectorKind::Mssql, "mssql"),
            (ConnectorKind::Oracle, "oracle"),
        ] {
            let connector = SqlConnectorImpl::from_kind(kind).unwrap();
            assert_eq!(connector.dialect(), name);
        }
    }

    #[test]
    fn test_from_kind_rejects_registry() {
        let err = SqlConnectorImpl::from_kind(ConnectorKind::Registry).unwrap_err();
        assert_eq!(err.kind(), "unsupported_connector");
    }

    #[tokio::test]
    async fn test_empty_rows_rejected_uniformly_before_connecting() {
        let payload = PushPayload {
            schema: "s".to_string(),
            table: "t".to_string(),
            rows: vec![],
        };
        // The contract is dialect-independent; validation happens before any
        // connection is opened, so no dialect needs a live server here.
        for kind in [
            ConnectorKind::Postgres,
            ConnectorKind::Mysql,
            ConnectorKind::Sqlite,
            ConnectorKind::Mssql,
            ConnectorKind::Oracle,
        ] {
            let connector = SqlConnectorImpl::from_kind(kind).unwrap();
            let err = connector
                .push_data(&SqlConnectionConfig::default(), &payload)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_configuration", "dialect {}", kind);
        }
    }
}
