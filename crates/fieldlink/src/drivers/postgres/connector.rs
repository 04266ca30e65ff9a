//! PostgreSQL connector strategy.
//!
//! Uses tokio-postgres with one connection per call; TLS (when the config
//! asks for it) goes through rustls without certificate verification, which
//! matches how site deployments terminate TLS at a local proxy.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use rustls::ClientConfig;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
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

/// Native SQLSTATE codes normalized by this dialect.
const ERROR_CODES: ErrorCodeTable = &[
    ("23505", SqlErrorKind::Unique),
    ("23503", SqlErrorKind::ForeignKey),
    ("42P01", SqlErrorKind::TableMissing),
];

/// Catalog schemas excluded from introspection.
const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// PostgreSQL connector implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }

    /// Quote a PostgreSQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Map a field type to the PostgreSQL column type.
    fn native_type(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Number => "double precision",
            FieldType::Boolean => "boolean",
            FieldType::Date | FieldType::DateTime => "timestamp",
            _ => "text",
        }
    }

    /// Normalize a tokio-postgres error through the dialect's code table.
    fn map_error(err: tokio_postgres::Error) -> ConnectorError {
        match err.as_db_error() {
            Some(db) => map_native_error(ERROR_CODES, Some(db.code().code()), db.message()),
            None => ConnectorError::connection(err),
        }
    }

    /// Open a fresh connection. The connection task ends when the returned
    /// client is dropped, releasing the socket on every exit path.
    async fn connect(cfg: &SqlConnectionConfig) -> Result<Client> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&cfg.host);
        pg_config.port(cfg.port);
        pg_config.user(&cfg.user);
        pg_config.password(&cfg.password);
        pg_config.dbname(&cfg.database);
        pg_config.connect_timeout(cfg.connect_timeout());

        let client = if cfg.tls {
            let tls_config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();
            let connector = MakeRustlsConnect::new(tls_config);
            let (client, connection) = pg_config
                .connect(connector)
                .await
                .map_err(ConnectorError::connection)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!("postgres connection closed: {}", e);
                }
            });
            client
        } else {
            let (client, connection) = pg_config
                .connect(NoTls)
                .await
                .map_err(ConnectorError::connection)?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!("postgres connection closed: {}", e);
                }
            });
            client
        };

        Ok(client)
    }

    /// Load column metadata for one table.
    async fn load_columns(
        client: &Client,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let query = r#"
            SELECT column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client
            .query(query, &[&schema, &table])
            .await
            .map_err(Self::map_error)?;

        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                name: row.get::<_, String>(0),
                data_type: row.get::<_, String>(1),
                is_nullable: row.get::<_, String>(2) == "YES",
            })
            .collect())
    }

    /// Load base tables and their columns for one schema.
    async fn load_schema(client: &Client, schema: String) -> Result<SchemaMetadata> {
        let query = r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = client
            .query(query, &[&schema])
            .await
            .map_err(Self::map_error)?;
        let tables: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        // One round trip per table; pipelined on the same connection.
        let tables: Vec<TableMetadata> = futures::stream::iter(tables)
            .map(|table| {
                let client = &client;
                let schema = schema.clone();
                async move {
                    let columns = Self::load_columns(client, &schema, &table).await?;
                    Ok::<_, ConnectorError>(TableMetadata {
                        name: table,
                        columns,
                    })
                }
            })
            .buffer_unordered(INTROSPECT_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(SchemaMetadata {
            name: schema,
            tables,
        })
    }

    /// Create the schema if it does not exist.
    async fn ensure_schema(client: &Client, schema: &str) -> Result<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", Self::quote_ident(schema));
        client.execute(&sql, &[]).await.map_err(Self::map_error)?;
        debug!("ensured schema: {}", schema);
        Ok(())
    }

    /// Check whether a table exists.
    async fn has_table(client: &Client, schema: &str, table: &str) -> Result<bool> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;
        let row = client
            .query_one(query, &[&schema, &table])
            .await
            .map_err(Self::map_error)?;
        Ok(row.get::<_, bool>(0))
    }

    /// Create the table from the first row's shape.
    async fn create_table(client: &Client, payload: &PushPayload) -> Result<()> {
        let col_defs = column_definitions(
            payload.first_row(),
            Self::quote_ident,
            Self::native_type,
        );
        let ddl = format!(
            "CREATE TABLE {}.{} (\n    {} BIGSERIAL PRIMARY KEY,\n    {}\n)",
            Self::quote_ident(&payload.schema),
            Self::quote_ident(&payload.table),
            Self::quote_ident(GENERATED_ID_COLUMN),
            col_defs.join(",\n    ")
        );

        client.execute(&ddl, &[]).await.map_err(Self::map_error)?;
        info!("created table {}.{}", payload.schema, payload.table);
        Ok(())
    }

    /// Insert all rows, returning them annotated with generated ids.
    async fn insert_rows(client: &Client, payload: &PushPayload) -> Result<Vec<InsertedRow>> {
        let rows = aligned_batch(payload);
        let col_list: Vec<String> = payload
            .first_row()
            .iter()
            .map(|c| Self::quote_ident(&c.name))
            .collect();
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| row_values_tuple(row, LiteralStyle::KEYWORDS))
            .collect();

        let sql = format!(
            "INSERT INTO {}.{} ({}) VALUES {} RETURNING {}",
            Self::quote_ident(&payload.schema),
            Self::quote_ident(&payload.table),
            col_list.join(", "),
            tuples.join(", "),
            Self::quote_ident(GENERATED_ID_COLUMN)
        );

        let returned = client.query(&sql, &[]).await.map_err(Self::map_error)?;
        let inserted = returned
            .iter()
            .zip(rows)
            .map(|(r, columns)| InsertedRow {
                id: r.get::<_, i64>(0),
                columns,
            })
            .collect();

        Ok(inserted)
    }
}

#[async_trait]
impl SqlConnector for PostgresConnector {
    fn dialect(&self) -> &'static str {
        "postgres"
    }

    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        validate_sql_config(ConnectorKind::Postgres, cfg)
    }

    async fn test_connection(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        let client = Self::connect(cfg).await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(ConnectorError::connection)?;
        info!("postgres connection ok: {}:{}/{}", cfg.host, cfg.port, cfg.database);
        Ok(())
    }

    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>> {
        let client = Self::connect(cfg).await?;

        let excluded: Vec<String> = SYSTEM_SCHEMAS.iter().map(|s| format!("'{}'", s)).collect();
        let query = format!(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name NOT IN ({})",
            excluded.join(", ")
        );

        let rows = client
            .query(query.as_str(), &[])
            .await
            .map_err(Self::map_error)?;
        let names: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        let mut schemas = Vec::with_capacity(names.len());
        for name in names {
            schemas.push(Self::load_schema(&client, name).await?);
        }

        info!("introspected {} postgres schemas", schemas.len());
        Ok(schemas)
    }

    async fn push_data(
        &self,
        cfg: &SqlConnectionConfig,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>> {
        payload.validate()?;
        let client = Self::connect(cfg).await?;

        Self::ensure_schema(&client, &payload.schema).await?;
        if !Self::has_table(&client, &payload.schema, &payload.table).await? {
            Self::create_table(&client, payload).await?;
        }
        Self::insert_rows(&client, payload).await
    }
}

/// Accept any server certificate; used when `tls` is set without a CA chain.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::{ColumnValue, FieldValue};

    #[test]
    fn test_quote_ident() {
        assert_eq!(PostgresConnector::quote_ident("name"), "\"name\"");
        assert_eq!(
            PostgresConnector::quote_ident("odd\"name"),
            "\"odd\"\"name\""
        );
    }

    #[test]
    fn test_native_type_mapping() {
        assert_eq!(
            PostgresConnector::native_type(FieldType::Number),
            "double precision"
        );
        assert_eq!(PostgresConnector::native_type(FieldType::Boolean), "boolean");
        assert_eq!(PostgresConnector::native_type(FieldType::Date), "timestamp");
        assert_eq!(
            PostgresConnector::native_type(FieldType::DateTime),
            "timestamp"
        );
        assert_eq!(PostgresConnector::native_type(FieldType::Select), "text");
        assert_eq!(PostgresConnector::native_type(FieldType::Email), "text");
    }

    #[test]
    fn test_error_code_table() {
        let err = map_native_error(ERROR_CODES, Some("23505"), "duplicate key value");
        assert_eq!(err.kind(), "unique_constraint_violation");
        let err = map_native_error(ERROR_CODES, Some("42P01"), "relation does not exist");
        assert_eq!(err.kind(), "table_not_found");
    }

    #[test]
    fn test_create_table_ddl_from_first_row() {
        let payload = PushPayload {
            schema: "public".to_string(),
            table: "visits".to_string(),
            rows: vec![vec![
                ColumnValue::new("name", FieldType::Text, FieldValue::Text("Bob".into())),
                ColumnValue::new("age", FieldType::Number, FieldValue::Number(5.0)),
            ]],
        };
        let cols = column_definitions(
            payload.first_row(),
            PostgresConnector::quote_ident,
            PostgresConnector::native_type,
        );
        assert_eq!(cols, vec!["\"name\" text", "\"age\" double precision"]);
    }

    #[test]
    fn test_validate_config_lists_missing_fields() {
        let connector = PostgresConnector::new();
        let err = connector
            .validate_config(&SqlConnectionConfig::default())
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("host, port, user, password, database"));
    }
}
