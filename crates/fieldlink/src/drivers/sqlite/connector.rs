//! SQLite connector strategy.
//!
//! SQLite has no schema concept; introspection returns a single schema
//! named `main`, and the payload's schema name is ignored. Booleans store
//! as INTEGER because the engine has no native boolean type.

use std::str::FromStr;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
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

/// Extended result codes normalized by this dialect.
///
/// 1555 = SQLITE_CONSTRAINT_PRIMARYKEY, 2067 = SQLITE_CONSTRAINT_UNIQUE,
/// 787 = SQLITE_CONSTRAINT_FOREIGNKEY. A missing table surfaces as a plain
/// SQLITE_ERROR and is recognized by message instead.
const ERROR_CODES: ErrorCodeTable = &[
    ("1555", SqlErrorKind::Unique),
    ("2067", SqlErrorKind::Unique),
    ("787", SqlErrorKind::ForeignKey),
];

/// The single namespace SQLite exposes.
const MAIN_SCHEMA: &str = "main";

/// SQLite connector implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        Self
    }

    /// Quote a SQLite identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Map a field type to the SQLite column type.
    fn native_type(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Number => "REAL",
            FieldType::Boolean => "INTEGER",
            FieldType::Date | FieldType::DateTime => "DATETIME",
            _ => "TEXT",
        }
    }

    /// Normalize a SQLx error through the dialect's code table.
    fn map_error(err: sqlx::Error) -> ConnectorError {
        match &err {
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                if message.contains("no such table") {
                    return ConnectorError::TableNotFound(message);
                }
                let code = db.code().map(|c| c.into_owned());
                map_native_error(ERROR_CODES, code.as_deref(), &message)
            }
            _ => ConnectorError::Internal(err.to_string()),
        }
    }

    /// Open a fresh pool on the database file for the duration of one call.
    async fn connect(cfg: &SqlConnectionConfig) -> Result<SqlitePool> {
        let path = cfg.sqlite_path().ok_or_else(|| {
            ConnectorError::InvalidConfiguration(
                "missing required field: file_path".to_string(),
            )
        })?;

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
            .map_err(ConnectorError::connection)?
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(INTROSPECT_CONCURRENCY as u32)
            .acquire_timeout(cfg.connect_timeout())
            .connect_with(options)
            .await
            .map_err(ConnectorError::connection)
    }

    /// Load column metadata for one table via PRAGMA table_info.
    async fn load_columns(pool: &SqlitePool, table: &str) -> Result<Vec<ColumnMetadata>> {
        let pragma = format!("PRAGMA table_info({})", Self::quote_ident(table));
        let rows = sqlx::query(&pragma)
            .fetch_all(pool)
            .await
            .map_err(Self::map_error)?;

        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                name: row.get::<String, _>("name"),
                data_type: row.get::<String, _>("type"),
                is_nullable: row.get::<i32, _>("notnull") == 0,
            })
            .collect())
    }

    /// Introspect the `main` namespace.
    async fn load_main_schema(pool: &SqlitePool) -> Result<SchemaMetadata> {
        let query = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
        "#;
        let rows = sqlx::query(query)
            .fetch_all(pool)
            .await
            .map_err(Self::map_error)?;
        let names: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();

        let tables: Vec<TableMetadata> = futures::stream::iter(names)
            .map(|table| {
                let pool = pool.clone();
                async move {
                    let columns = Self::load_columns(&pool, &table).await?;
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
            name: MAIN_SCHEMA.to_string(),
            tables,
        })
    }

    /// Check whether a table exists.
    async fn has_table(pool: &SqlitePool, table: &str) -> Result<bool> {
        let query = "SELECT COUNT(*) AS cnt FROM sqlite_master WHERE type = 'table' AND name = ?";
        let row = sqlx::query(query)
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(Self::map_error)?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }

    /// Create the table from the first row's shape.
    async fn create_table(pool: &SqlitePool, payload: &PushPayload) -> Result<()> {
        let col_defs = column_definitions(
            payload.first_row(),
            Self::quote_ident,
            Self::native_type,
        );
        let ddl = format!(
            "CREATE TABLE {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT,\n    {}\n)",
            Self::quote_ident(&payload.table),
            Self::quote_ident(GENERATED_ID_COLUMN),
            col_defs.join(",\n    ")
        );

        sqlx::query(&ddl)
            .execute(pool)
            .await
            .map_err(Self::map_error)?;
        info!("created table {}", payload.table);
        Ok(())
    }

    /// Insert all rows; ids are back-calculated from MAX(id) after the
    /// insert, which is safe because the rowids of one multi-row insert are
    /// assigned contiguously.
    async fn insert_rows(pool: &SqlitePool, payload: &PushPayload) -> Result<Vec<InsertedRow>> {
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
            "INSERT INTO {} ({}) VALUES {}",
            Self::quote_ident(&payload.table),
            col_list.join(", "),
            tuples.join(", ")
        );

        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(Self::map_error)?;

        let max_query = format!(
            "SELECT MAX({}) AS max_id FROM {}",
            Self::quote_ident(GENERATED_ID_COLUMN),
            Self::quote_ident(&payload.table)
        );
        let row = sqlx::query(&max_query)
            .fetch_one(pool)
            .await
            .map_err(Self::map_error)?;
        let max_id = row.get::<i64, _>("max_id");

        let count = rows.len() as i64;
        let base_id = max_id - count + 1;
        let inserted = rows
            .into_iter()
            .enumerate()
            .map(|(i, columns)| InsertedRow {
                id: base_id + i as i64,
                columns,
            })
            .collect();

        Ok(inserted)
    }

    async fn push_inner(pool: &SqlitePool, payload: &PushPayload) -> Result<Vec<InsertedRow>> {
        // No ensure-schema step: SQLite has no schema concept.
        if !Self::has_table(pool, &payload.table).await? {
            Self::create_table(pool, payload).await?;
        } else {
            debug!("table {} exists, inserting only", payload.table);
        }
        Self::insert_rows(pool, payload).await
    }
}

#[async_trait]
impl SqlConnector for SqliteConnector {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        validate_sql_config(ConnectorKind::Sqlite, cfg)
    }

    async fn test_connection(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        let pool = Self::connect(cfg).await?;
        let result = sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map(|_| ())
            .map_err(ConnectorError::connection);
        pool.close().await;
        result?;
        info!("sqlite connection ok: {}", cfg.sqlite_path().unwrap_or_default());
        Ok(())
    }

    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>> {
        let pool = Self::connect(cfg).await?;
        let result = Self::load_main_schema(&pool).await;
        pool.close().await;
        result.map(|schema| vec![schema])
    }

    async fn push_data(
        &self,
        cfg: &SqlConnectionConfig,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>> {
        payload.validate()?;
        let pool = Self::connect(cfg).await?;
        let result = Self::push_inner(&pool, payload).await;
        pool.close().await;
        result
    }
}
