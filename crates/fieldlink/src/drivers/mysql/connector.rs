//! MySQL/MariaDB connector strategy.
//!
//! Uses SQLx for connection handling and async query execution. The
//! connected database *is* the schema for this dialect, so introspection
//! returns exactly one schema entry and the payload's schema name is not
//! used for qualification.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
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

/// Native MySQL error numbers normalized by this dialect.
///
/// 1062 = ER_DUP_ENTRY, 1452 = ER_NO_REFERENCED_ROW_2, 1146 = ER_NO_SUCH_TABLE.
const ERROR_CODES: ErrorCodeTable = &[
    ("1062", SqlErrorKind::Unique),
    ("1452", SqlErrorKind::ForeignKey),
    ("1146", SqlErrorKind::TableMissing),
];

/// MySQL/MariaDB connector implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlConnector;

impl MysqlConnector {
    pub fn new() -> Self {
        Self
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Map a field type to the MySQL column type.
    fn native_type(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Number => "DOUBLE",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Date | FieldType::DateTime => "DATETIME",
            _ => "TEXT",
        }
    }

    /// Normalize a SQLx error through the dialect's code table.
    fn map_error(err: sqlx::Error) -> ConnectorError {
        match &err {
            sqlx::Error::Database(db) => {
                let number = db
                    .downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .number()
                    .to_string();
                map_native_error(ERROR_CODES, Some(&number), db.message())
            }
            _ => ConnectorError::Internal(err.to_string()),
        }
    }

    /// Open a fresh connection pool for the duration of one call.
    async fn connect(cfg: &SqlConnectionConfig) -> Result<MySqlPool> {
        let ssl_mode = if cfg.tls {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        };

        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.database)
            .ssl_mode(ssl_mode);

        MySqlPoolOptions::new()
            .max_connections(INTROSPECT_CONCURRENCY as u32)
            .acquire_timeout(cfg.connect_timeout())
            .connect_with(options)
            .await
            .map_err(ConnectorError::connection)
    }

    /// Load column metadata for one table.
    async fn load_columns(pool: &MySqlPool, table: &str) -> Result<Vec<ColumnMetadata>> {
        // CAST to CHAR to sidestep collation differences across versions.
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows = sqlx::query(query)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(Self::map_error)?;

        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                name: row.get::<String, _>("COLUMN_NAME"),
                data_type: row.get::<String, _>("DATA_TYPE"),
                is_nullable: row.get::<i32, _>("is_nullable") == 1,
            })
            .collect())
    }

    /// The connected database as the single schema entry.
    async fn load_database_schema(pool: &MySqlPool, database: &str) -> Result<SchemaMetadata> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows = sqlx::query(query)
            .fetch_all(pool)
            .await
            .map_err(Self::map_error)?;
        let names: Vec<String> = rows
            .iter()
            .map(|r| r.get::<String, _>("TABLE_NAME"))
            .collect();

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
            name: database.to_string(),
            tables,
        })
    }

    /// Check whether a table exists in the connected database.
    async fn has_table(pool: &MySqlPool, table: &str) -> Result<bool> {
        let query = r#"
            SELECT COUNT(*) AS cnt
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        "#;
        let row = sqlx::query(query)
            .bind(table)
            .fetch_one(pool)
            .await
            .map_err(Self::map_error)?;
        Ok(row.get::<i64, _>("cnt") > 0)
    }

    /// Create the table from the first row's shape.
    async fn create_table(pool: &MySqlPool, payload: &PushPayload) -> Result<()> {
        let col_defs = column_definitions(
            payload.first_row(),
            Self::quote_ident,
            Self::native_type,
        );
        let ddl = format!(
            "CREATE TABLE {} (\n    {} BIGINT AUTO_INCREMENT PRIMARY KEY,\n    {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
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

    /// Insert all rows in one statement; generated ids are the insert id of
    /// the first row plus the row offset.
    async fn insert_rows(pool: &MySqlPool, payload: &PushPayload) -> Result<Vec<InsertedRow>> {
        let rows = aligned_batch(payload);
        let col_list: Vec<String> = payload
            .first_row()
            .iter()
            .map(|c| Self::quote_ident(&c.name))
            .collect();
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| row_values_tuple(row, LiteralStyle::MYSQL))
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            Self::quote_ident(&payload.table),
            col_list.join(", "),
            tuples.join(", ")
        );

        let result = sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(Self::map_error)?;

        let base_id = result.last_insert_id() as i64;
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

    async fn push_inner(pool: &MySqlPool, payload: &PushPayload) -> Result<Vec<InsertedRow>> {
        // No ensure-schema step: the connected database is the schema.
        if !Self::has_table(pool, &payload.table).await? {
            Self::create_table(pool, payload).await?;
        } else {
            debug!("table {} exists, inserting only", payload.table);
        }
        Self::insert_rows(pool, payload).await
    }
}

#[async_trait]
impl SqlConnector for MysqlConnector {
    fn dialect(&self) -> &'static str {
        "mysql"
    }

    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        validate_sql_config(ConnectorKind::Mysql, cfg)
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
        info!("mysql connection ok: {}:{}/{}", cfg.host, cfg.port, cfg.database);
        Ok(())
    }

    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>> {
        let pool = Self::connect(cfg).await?;
        let result = Self::load_database_schema(&pool, &cfg.database).await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::{ColumnValue, FieldValue};

    #[test]
    fn test_quote_ident() {
        assert_eq!(MysqlConnector::quote_ident("name"), "`name`");
        assert_eq!(MysqlConnector::quote_ident("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_native_type_mapping() {
        assert_eq!(MysqlConnector::native_type(FieldType::Number), "DOUBLE");
        assert_eq!(MysqlConnector::native_type(FieldType::Boolean), "BOOLEAN");
        assert_eq!(MysqlConnector::native_type(FieldType::DateTime), "DATETIME");
        assert_eq!(MysqlConnector::native_type(FieldType::MultiSelect), "TEXT");
    }

    #[test]
    fn test_error_code_table() {
        let err = map_native_error(ERROR_CODES, Some("1062"), "Duplicate entry 'x'");
        assert_eq!(err.kind(), "unique_constraint_violation");
        let err = map_native_error(ERROR_CODES, Some("1146"), "Table 'db.t' doesn't exist");
        assert_eq!(err.kind(), "table_not_found");
        let err = map_native_error(ERROR_CODES, Some("1045"), "Access denied");
        assert_eq!(err.kind(), "internal_failure");
    }

    #[test]
    fn test_insert_literals_escape_backslashes() {
        let row = vec![ColumnValue::new(
            "path",
            FieldType::Text,
            FieldValue::Text("C:\\data".to_string()),
        )];
        assert_eq!(
            row_values_tuple(&row, LiteralStyle::MYSQL),
            "('C:\\\\data')"
        );
    }
}
