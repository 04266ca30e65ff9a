//! Oracle connector strategy.
//!
//! Drives the Oracle ODBC driver through `odbc-api`. ODBC handles are not
//! safely shareable, so each call runs its work inside one blocking session
//! on the tokio blocking pool; the connection drops when the closure
//! returns, on every exit path.
//!
//! **Requirements:** the Oracle ODBC driver (from the Oracle Instant
//! Client) must be installed on the host.

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, Connection, ConnectionOptions, Cursor, Environment,
    ResultSetMetadata};
use tracing::{debug, info};

use crate::config::{validate_sql_config, ConnectorKind, SqlConnectionConfig};
use crate::core::field::{FieldType, InsertedRow, LiteralStyle, PushPayload};
use crate::core::schema::{ColumnMetadata, SchemaMetadata, TableMetadata};
use crate::core::traits::SqlConnector;
use crate::drivers::common::{
    aligned_batch, column_definitions, map_native_error, row_values_tuple, ErrorCodeTable,
    SqlErrorKind, GENERATED_ID_COLUMN,
};
use crate::error::{ConnectorError, Result};

/// Native ORA codes normalized by this dialect.
const ERROR_CODES: ErrorCodeTable = &[
    ("ORA-00001", SqlErrorKind::Unique),
    ("ORA-02291", SqlErrorKind::ForeignKey),
    ("ORA-00942", SqlErrorKind::TableMissing),
];

/// Owners excluded from introspection.
const SYSTEM_OWNERS: &[&str] = &["SYS", "SYSTEM", "XDB", "APEX_030200"];

/// Rows fetched per ODBC batch during introspection.
const ODBC_BATCH_SIZE: usize = 1000;

/// Maximum bytes buffered per text cell.
const ODBC_MAX_STR_LEN: usize = 4096;

/// Oracle connector implementation.
#[derive(Debug, Clone, Default)]
pub struct OracleConnector;

impl OracleConnector {
    pub fn new() -> Self {
        Self
    }

    /// Quote an Oracle identifier, preserving case.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Escape a string for embedding in a single-quoted literal.
    fn escape_literal(s: &str) -> String {
        s.replace('\'', "''")
    }

    /// Map a field type to the Oracle column type.
    fn native_type(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::Number => "BINARY_DOUBLE",
            FieldType::Boolean => "NUMBER(1)",
            FieldType::Date | FieldType::DateTime => "TIMESTAMP",
            _ => "CLOB",
        }
    }

    /// Build the ODBC connection string.
    fn connection_string(cfg: &SqlConnectionConfig) -> String {
        format!(
            "Driver={{Oracle ODBC Driver}};DBQ=//{}:{}/{};UID={};PWD={};",
            cfg.host, cfg.port, cfg.database, cfg.user, cfg.password
        )
    }

    /// Pull the `ORA-NNNNN` code out of a driver diagnostic message.
    fn extract_ora_code(message: &str) -> Option<String> {
        let idx = message.find("ORA-")?;
        let code: String = message[idx..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .take(9)
            .collect();
        (code.len() == 9).then_some(code)
    }

    /// Normalize an ODBC diagnostic through the dialect's code table.
    fn map_message(message: &str) -> ConnectorError {
        match Self::extract_ora_code(message) {
            Some(code) => map_native_error(ERROR_CODES, Some(&code), message),
            None => ConnectorError::Internal(message.to_string()),
        }
    }

    fn map_odbc_error(err: odbc_api::Error) -> ConnectorError {
        Self::map_message(&err.to_string())
    }

    /// Run `work` against a fresh ODBC session on the blocking pool.
    async fn with_connection<T, F>(cfg: &SqlConnectionConfig, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&Connection<'a>) -> Result<T> + Send + 'static,
    {
        let conn_str = Self::connection_string(cfg);
        let login_timeout = cfg.connect_timeout().as_secs() as u32;

        tokio::task::spawn_blocking(move || {
            let env = Environment::new()
                .map_err(|e| ConnectorError::connection(format!("ODBC environment: {}", e)))?;
            let mut options = ConnectionOptions::default();
            options.login_timeout_sec = Some(login_timeout);
            let conn = env
                .connect_with_connection_string(&conn_str, options)
                .map_err(|e| ConnectorError::connection(e))?;
            work(&conn)
        })
        .await
        .map_err(|e| ConnectorError::internal(e, "oracle blocking task"))?
    }

    /// Execute a statement, discarding any result set.
    fn execute(conn: &Connection<'_>, sql: &str) -> Result<()> {
        conn.execute(sql, ()).map_err(Self::map_odbc_error)?;
        Ok(())
    }

    /// Execute a query and return all rows as text cells.
    fn query_rows(conn: &Connection<'_>, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        let mut rows = Vec::new();

        if let Some(mut cursor) = conn.execute(sql, ()).map_err(Self::map_odbc_error)? {
            let num_cols = cursor
                .num_result_cols()
                .map_err(|e| ConnectorError::internal(e, "odbc column count"))?
                as usize;

            let mut buffers =
                TextRowSet::for_cursor(ODBC_BATCH_SIZE, &mut cursor, Some(ODBC_MAX_STR_LEN))
                    .map_err(|e| ConnectorError::internal(e, "odbc row buffer"))?;
            let mut row_cursor = cursor
                .bind_buffer(&mut buffers)
                .map_err(|e| ConnectorError::internal(e, "odbc bind buffer"))?;

            while let Some(batch) = row_cursor
                .fetch()
                .map_err(|e| ConnectorError::internal(e, "odbc fetch"))?
            {
                for row_idx in 0..batch.num_rows() {
                    let mut row = Vec::with_capacity(num_cols);
                    for col_idx in 0..num_cols {
                        let value = batch
                            .at(col_idx, row_idx)
                            .map(|bytes| String::from_utf8_lossy(bytes).to_string());
                        row.push(value);
                    }
                    rows.push(row);
                }
            }
        }

        Ok(rows)
    }

    /// First cell of the first row, parsed as an integer.
    fn scalar_i64(rows: &[Vec<Option<String>>]) -> i64 {
        rows.first()
            .and_then(|r| r.first())
            .and_then(|c| c.as_deref())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// Introspect owners, tables, and columns in one ODBC session.
    fn load_schemas(conn: &Connection<'_>) -> Result<Vec<SchemaMetadata>> {
        let excluded: Vec<String> = SYSTEM_OWNERS.iter().map(|o| format!("'{}'", o)).collect();
        let owners_sql = format!(
            "SELECT username FROM all_users WHERE username NOT IN ({}) ORDER BY username",
            excluded.join(", ")
        );

        let mut schemas = Vec::new();
        for owner_row in Self::query_rows(conn, &owners_sql)? {
            let owner = match owner_row.first().and_then(|c| c.clone()) {
                Some(o) => o,
                None => continue,
            };

            let tables_sql = format!(
                "SELECT table_name FROM all_tables WHERE owner = '{}' ORDER BY table_name",
                Self::escape_literal(&owner)
            );
            let mut tables = Vec::new();
            for table_row in Self::query_rows(conn, &tables_sql)? {
                let table = match table_row.first().and_then(|c| c.clone()) {
                    Some(t) => t,
                    None => continue,
                };

                let columns_sql = format!(
                    "SELECT column_name, data_type, nullable FROM all_tab_columns \
                     WHERE owner = '{}' AND table_name = '{}' ORDER BY column_id",
                    Self::escape_literal(&owner),
                    Self::escape_literal(&table)
                );
                let columns = Self::query_rows(conn, &columns_sql)?
                    .into_iter()
                    .map(|row| ColumnMetadata {
                        name: row.first().and_then(|c| c.clone()).unwrap_or_default(),
                        data_type: row.get(1).and_then(|c| c.clone()).unwrap_or_default(),
                        is_nullable: row.get(2).and_then(|c| c.clone()).as_deref() == Some("Y"),
                    })
                    .collect();

                tables.push(TableMetadata {
                    name: table,
                    columns,
                });
            }

            schemas.push(SchemaMetadata {
                name: owner,
                tables,
            });
        }

        Ok(schemas)
    }
}

#[async_trait]
impl SqlConnector for OracleConnector {
    fn dialect(&self) -> &'static str {
        "oracle"
    }

    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        validate_sql_config(ConnectorKind::Oracle, cfg)
    }

    async fn test_connection(&self, cfg: &SqlConnectionConfig) -> Result<()> {
        Self::with_connection(cfg, |conn| {
            Self::query_rows(conn, "SELECT 1 FROM DUAL").map(|_| ())
        })
        .await?;
        info!("oracle connection ok: {}:{}/{}", cfg.host, cfg.port, cfg.database);
        Ok(())
    }

    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>> {
        let schemas = Self::with_connection(cfg, |conn| Self::load_schemas(conn)).await?;
        info!("introspected {} oracle schemas", schemas.len());
        Ok(schemas)
    }

    async fn push_data(
        &self,
        cfg: &SqlConnectionConfig,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>> {
        payload.validate()?;

        let rows = aligned_batch(payload);
        let qualified = format!(
            "{}.{}",
            Self::quote_ident(&payload.schema),
            Self::quote_ident(&payload.table)
        );

        let has_table_sql = format!(
            "SELECT COUNT(*) FROM all_tables WHERE owner = '{}' AND table_name = '{}'",
            Self::escape_literal(&payload.schema),
            Self::escape_literal(&payload.table)
        );

        let col_defs = column_definitions(
            payload.first_row(),
            Self::quote_ident,
            Self::native_type,
        );
        let create_sql = format!(
            "CREATE TABLE {} (\n    {} NUMBER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,\n    {}\n)",
            qualified,
            Self::quote_ident(GENERATED_ID_COLUMN),
            col_defs.join(",\n    ")
        );

        let col_list: Vec<String> = payload
            .first_row()
            .iter()
            .map(|c| Self::quote_ident(&c.name))
            .collect();
        // Oracle has no multi-row VALUES; one INSERT per row.
        let insert_sqls: Vec<String> = rows
            .iter()
            .map(|row| {
                format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    qualified,
                    col_list.join(", "),
                    row_values_tuple(row, LiteralStyle::NUMERIC_BOOLS)
                )
            })
            .collect();

        let max_sql = format!(
            "SELECT MAX({}) FROM {}",
            Self::quote_ident(GENERATED_ID_COLUMN),
            qualified
        );

        let table_label = qualified.clone();
        let max_id = Self::with_connection(cfg, move |conn| {
            let exists = Self::scalar_i64(&Self::query_rows(conn, &has_table_sql)?) > 0;
            if !exists {
                Self::execute(conn, &create_sql)?;
                info!("created table {}", table_label);
            } else {
                debug!("table {} exists, inserting only", table_label);
            }
            for sql in &insert_sqls {
                Self::execute(conn, sql)?;
            }
            let max_rows = Self::query_rows(conn, &max_sql)?;
            Ok(Self::scalar_i64(&max_rows))
        })
        .await?;

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
}
