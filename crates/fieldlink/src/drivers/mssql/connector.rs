//! Microsoft SQL Server connector strategy.
//!
//! Uses Tiberius over a tokio TCP stream; schema introspection fans out
//! per table over a small bb8 pool so latency stays proportional to the
//! slowest single round trip.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bb8::Pool;
use futures::{StreamExt, TryStreamExt};
use tiberius::{AuthMethod, Client, Config as TiberiusConfig, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::{validate_sql_config, ConnectorKind, SqlConnectionConfig};
use crate::core::field::{FieldType, InsertedRow, LiteralStyle, PushPayload};
use crate::core::schema::{ColumnMetadata, SchemaMetadata, TableMetadata};
use crate::core::traits::SqlConnector;
use crate::drivers::common::{
    aligned_batch, column_definitions, map_native_error, row_values_tuple, ErrorCodeTable,
    SqlErrorKind, GENERATED_ID_COLUMN, INTROSPECT_CONCURRENCY,
};
use crate::error::{ConnectorError, Result};

type MssqlClient = Client<Compat<TcpStream>>;

/// Native SQL Server error numbers normalized by this dialect.
///
/// 2627 = PK/unique constraint, 2601 = unique index, 547 = FK constraint,
/// 208 = invalid object name.
const ERROR_CODES: ErrorCodeTable = &[
    ("2627", SqlErrorKind::Unique),
    ("2601", SqlErrorKind::Unique),
    ("547", SqlErrorKind::ForeignKey),
    ("208", SqlErrorKind::TableMissing),
];

/// Catalog schemas excluded from introspection.
const SYSTEM_SCHEMAS: &[&str] = &["sys", "INFORMATION_SCHEMA", "guest"];

/// Connection manager for the bb8 introspection pool.
#[derive(Clone)]
struct MssqlConnectionManager {
    cfg: SqlConnectionConfig,
}

impl MssqlConnectionManager {
    fn new(cfg: SqlConnectionConfig) -> Self {
        Self { cfg }
    }

    fn build_config(&self) -> TiberiusConfig {
        let mut config = TiberiusConfig::new();
        config.host(&self.cfg.host);
        config.port(self.cfg.port);
        config.database(&self.cfg.database);
        config.authentication(AuthMethod::sql_server(&self.cfg.user, &self.cfg.password));

        if self.cfg.tls {
            config.trust_cert();
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }

    async fn open(&self) -> std::result::Result<MssqlClient, tiberius::error::Error> {
        let config = self.build_config();
        let connect = TcpStream::connect(config.get_addr());
        let tcp = tokio::time::timeout(self.cfg.connect_timeout(), connect)
            .await
            .map_err(|_| tiberius::error::Error::Io {
                kind: std::io::ErrorKind::TimedOut,
                message: "connect timed out".to_string(),
            })?
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }
}

#[async_trait]
impl bb8::ManageConnection for MssqlConnectionManager {
    type Connection = MssqlClient;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        self.open().await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_results().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server connector implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlConnector;

impl MssqlConnector {
    pub fn new() -> Self {
        Self
    }

    /// Quote a SQL Server identifier.
    fn quote_ident(name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    /// Map a field type to the SQL Server column type.
    fn native_type(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Number => "FLOAT",
            FieldType::Boolean => "BIT",
            FieldType::Date | FieldType::DateTime => "DATETIME2",
            _ => "NVARCHAR(MAX)",
        }
    }

    /// Normalize a Tiberius error through the dialect's code table.
    fn map_error(err: tiberius::error::Error) -> ConnectorError {
        match &err {
            tiberius::error::Error::Server(token) => {
                let code = token.code().to_string();
                map_native_error(ERROR_CODES, Some(&code), token.message())
            }
            _ => ConnectorError::Internal(err.to_string()),
        }
    }

    /// Open one fresh connection.
    async fn connect(cfg: &SqlConnectionConfig) -> Result<MssqlClient> {
        MssqlConnectionManager::new(cfg.clone())
            .open()
            .await
            .map_err(ConnectorError::connection)
    }

    /// Load column metadata for one table.
    async fn load_columns(
        client: &mut MssqlClient,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let query = r#"
            SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
        "#;

        let rows = client
            .query(query, &[&schema, &table])
            .await
            .map_err(Self::map_error)?
            .into_first_result()
            .await
            .map_err(Self::map_error)?;

        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                name: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                is_nullable: row.get::<&str, _>(2).unwrap_or_default() == "YES",
            })
            .collect())
    }

    /// List base tables within one schema.
    async fn load_tables(client: &mut MssqlClient, schema: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = @P1
            ORDER BY TABLE_NAME
        "#;
        let rows = client
            .query(query, &[&schema])
            .await
            .map_err(Self::map_error)?
            .into_first_result()
            .await
            .map_err(Self::map_error)?;

        Ok(rows
            .iter()
            .map(|r| r.get::<&str, _>(0).unwrap_or_default().to_string())
            .collect())
    }

    /// Create the schema if it does not exist.
    async fn ensure_schema(client: &mut MssqlClient, schema: &str) -> Result<()> {
        let quoted = Self::quote_ident(schema);
        let query = format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = @P1) EXEC(N'CREATE SCHEMA {}')",
            quoted.replace('\'', "''")
        );
        client
            .execute(query.as_str(), &[&schema])
            .await
            .map_err(Self::map_error)?;
        debug!("ensured schema: {}", schema);
        Ok(())
    }

    /// Check whether a table exists.
    async fn has_table(client: &mut MssqlClient, schema: &str, table: &str) -> Result<bool> {
        let query = "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2";
        let rows = client
            .query(query, &[&schema, &table])
            .await
            .map_err(Self::map_error)?
            .into_first_result()
            .await
            .map_err(Self::map_error)?;
        let count: i32 = rows
            .first()
            .and_then(|r| r.get::<i32, _>(0))
            .unwrap_or(0);
        Ok(count > 0)
    }

    /// Create the table from the first row's shape.
    async fn create_table(client: &mut MssqlClient, payload: &PushPayload) -> Result<()> {
        let col_defs = column_definitions(
            payload.first_row(),
            Self::quote_ident,
            Self::native_type,
        );
        let ddl = format!(
            "CREATE TABLE {}.{} (\n    {} INT IDENTITY(1,1) PRIMARY KEY,\n    {}\n)",
            Self::quote_ident(&payload.schema),
            Self::quote_ident(&payload.table),
            Self::quote_ident(GENERATED_ID_COLUMN),
            col_defs.join(",\n    ")
        );

        client
            .execute(ddl.as_str(), &[])
            .await
            .map_err(Self::map_error)?;
        info!("created table {}.{}", payload.schema, payload.table);
        Ok(())
    }

    /// Insert all rows, collecting generated ids from OUTPUT INSERTED.
    async fn insert_rows(
        client: &mut MssqlClient,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>> {
        let rows = aligned_batch(payload);
        let col_list: Vec<String> = payload
            .first_row()
            .iter()
            .map(|c| Self::quote_ident(&c.name))
            .collect();
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| row_values_tuple(row, LiteralStyle::NUMERIC_BOOLS))
            .collect();

        let sql = format!(
            "INSERT INTO {}.{} ({}) OUTPUT INSERTED.{} VALUES {}",
            Self::quote_ident(&payload.schema),
            Self::quote_ident(&payload.table),
            col_list.join(", "),
            Self::quote_ident(GENERATED_ID_COLUMN),
            tuples.join(", ")
        );

        let returned = client
            .query(sql.as_str(), &[])
            .await
            .map_err(Self::map_error)?
            .into_first_result()
            .await
            .map_err(Self::map_error)?;

        let inserted = returned
            .iter()
            .zip(rows)
            .map(|(r, columns)| InsertedRow {
                id: r.get::<i32, _>(0).unwrap_or_default() as i64,
                columns,
            })
            .collect();

        Ok(inserted)
    }
}

#[async_trait]
impl SqlConnector for MssqlConnector {
    fn dialect(&self) -> &'static str {
        "mssql"
    }

    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        validate_sql_config(ConnectorKind::Mssql, cfg)
    }

    async fn test_connection(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        let mut client = Self::connect(cfg).await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(ConnectorError::connection)?
            .into_results()
            .await
            .map_err(ConnectorError::connection)?;
        info!("mssql connection ok: {}:{}/{}", cfg.host, cfg.port, cfg.database);
        Ok(())
    }

    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>> {
        let manager = MssqlConnectionManager::new(cfg.clone());
        let pool = Pool::builder()
            .max_size(INTROSPECT_CONCURRENCY as u32)
            .build(manager)
            .await
            .map_err(ConnectorError::connection)?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        let schema_names: Vec<String> = {
            let mut conn = pool.get().await.map_err(ConnectorError::connection)?;
            let placeholders: Vec<String> = SYSTEM_SCHEMAS
                .iter()
                .map(|s| format!("'{}'", s))
                .collect();
            let query = format!(
                "SELECT name FROM sys.schemas WHERE name NOT IN ({})",
                placeholders.join(", ")
            );
            let rows = conn
                .query(query.as_str(), &[])
                .await
                .map_err(Self::map_error)?
                .into_first_result()
                .await
                .map_err(Self::map_error)?;
            rows.iter()
                .map(|r| r.get::<&str, _>(0).unwrap_or_default().to_string())
                .collect()
        };

        for schema in &schema_names {
            let mut conn = pool.get().await.map_err(ConnectorError::connection)?;
            for table in Self::load_tables(&mut conn, schema).await? {
                pairs.push((schema.clone(), table));
            }
        }

        // One round trip per table, bounded by the pool size.
        let loaded: Vec<(String, TableMetadata)> = futures::stream::iter(pairs)
            .map(|(schema, table)| {
                let pool = pool.clone();
                async move {
                    let mut conn = pool.get().await.map_err(ConnectorError::connection)?;
                    let columns = Self::load_columns(&mut conn, &schema, &table).await?;
                    Ok::<_, ConnectorError>((
                        schema,
                        TableMetadata {
                            name: table,
                            columns,
                        },
                    ))
                }
            })
            .buffer_unordered(INTROSPECT_CONCURRENCY)
            .try_collect()
            .await?;

        let mut grouped: BTreeMap<String, Vec<TableMetadata>> = schema_names
            .into_iter()
            .map(|s| (s, Vec::new()))
            .collect();
        for (schema, table) in loaded {
            grouped.entry(schema).or_default().push(table);
        }

        let schemas: Vec<SchemaMetadata> = grouped
            .into_iter()
            .map(|(name, tables)| SchemaMetadata { name, tables })
            .collect();

        info!("introspected {} mssql schemas", schemas.len());
        Ok(schemas)
    }

    async fn push_data(
        &self,
        cfg: &SqlConnectionConfig,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>> {
        payload.validate()?;
        let mut client = Self::connect(cfg).await?;

        Self::ensure_schema(&mut client, &payload.schema).await?;
        if !Self::has_table(&mut client, &payload.schema, &payload.table).await? {
            Self::create_table(&mut client, payload).await?;
        }
        Self::insert_rows(&mut client, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(MssqlConnector::quote_ident("name"), "[name]");
        assert_eq!(MssqlConnector::quote_ident("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_native_type_mapping() {
        assert_eq!(MssqlConnector::native_type(FieldType::Number), "FLOAT");
        assert_eq!(MssqlConnector::native_type(FieldType::Boolean), "BIT");
        assert_eq!(MssqlConnector::native_type(FieldType::Date), "DATETIME2");
        assert_eq!(
            MssqlConnector::native_type(FieldType::Phone),
            "NVARCHAR(MAX)"
        );
    }

    #[test]
    fn test_error_code_table() {
        let err = map_native_error(ERROR_CODES, Some("2627"), "Violation of PRIMARY KEY");
        assert_eq!(err.kind(), "unique_constraint_violation");
        let err = map_native_error(ERROR_CODES, Some("2601"), "Cannot insert duplicate key row");
        assert_eq!(err.kind(), "unique_constraint_violation");
        let err = map_native_error(ERROR_CODES, Some("208"), "Invalid object name 't'");
        assert_eq!(err.kind(), "table_not_found");
        let err = map_native_error(ERROR_CODES, Some("547"), "FK conflict");
        assert_eq!(err.kind(), "foreign_key_violation");
    }

    #[test]
    fn test_system_schema_exclusions() {
        assert!(SYSTEM_SCHEMAS.contains(&"sys"));
        assert!(SYSTEM_SCHEMAS.contains(&"INFORMATION_SCHEMA"));
        assert!(SYSTEM_SCHEMAS.contains(&"guest"));
    }
}
