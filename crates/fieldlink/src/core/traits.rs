//! The shared SQL connector contract.
//!
//! One implementation per dialect. Each operation opens a fresh driver
//! connection and releases it on every exit path; a connection leaked on an
//! error path is a correctness bug in the implementation.

use async_trait::async_trait;

use crate::config::SqlConnectionConfig;
use crate::error::Result;

use super::field::{InsertedRow, PushPayload};
use super::schema::SchemaMetadata;

/// Strategy interface implemented once per SQL dialect.
///
/// The internal hooks (`ensure_schema`, `has_table`, `create_table`,
/// `insert_rows`) are inherent methods on each driver, since they operate
/// on that driver's own connection type.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Dialect identifier (e.g. "postgres", "oracle").
    fn dialect(&self) -> &'static str;

    /// Check that every required configuration field is present, naming all
    /// missing fields in one error.
    fn validate_config(&self, cfg: &SqlConnectionConfig) -> Result<()>;

    /// Open a connection, run a trivial probe statement, and close the
    /// connection regardless of outcome.
    async fn test_connection(&self, cfg: &SqlConnectionConfig) -> Result<()>;

    /// Introspect schemas, base tables, and columns.
    ///
    /// Ordering across schemas and tables is not guaranteed; per-table
    /// column queries fan out concurrently where the driver allows it.
    async fn fetch_schemas(&self, cfg: &SqlConnectionConfig) -> Result<Vec<SchemaMetadata>>;

    /// Push a batch of rows, creating the target table from the first row's
    /// shape when it does not exist. Returns the rows annotated with their
    /// generated identifiers.
    async fn push_data(
        &self,
        cfg: &SqlConnectionConfig,
        payload: &PushPayload,
    ) -> Result<Vec<InsertedRow>>;
}
