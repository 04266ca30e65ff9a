//! # fieldlink
//!
//! Connector layer for pushing collected field data into external systems
//! of record and pulling schema/reference data back out.
//!
//! One uniform contract — test connection, discover schema, push data —
//! implemented against:
//!
//! - **Five SQL dialects**: PostgreSQL, MySQL/MariaDB, SQLite, Microsoft
//!   SQL Server, and Oracle, each with dialect-specific SQL generation,
//!   dynamic table creation from the pushed row shape, and native
//!   error-code normalization
//! - **A health-registry REST API** (DHIS2-style): program/dataset field
//!   discovery, paginated listings, organisation units, and tracker /
//!   data-value-set pushes
//!
//! ## Example
//!
//! ```rust,no_run
//! use fieldlink::{ConnectionProfile, ConnectorKind, Integrations, SqlConnectionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let facade = Integrations::new();
//!     let profile = ConnectionProfile::Sql {
//!         kind: ConnectorKind::Postgres,
//!         config: SqlConnectionConfig {
//!             host: "localhost".into(),
//!             port: 5432,
//!             user: "app".into(),
//!             password: "secret".into(),
//!             database: "field_data".into(),
//!             ..Default::default()
//!         },
//!     };
//!     let result = facade.test_connection(&profile).await;
//!     println!("{}", result.message);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod facade;
pub mod registry;

// Re-exports for convenient access
pub use cache::{MemorySchemaCache, SchemaCache, SchemaCacheKey, SCHEMA_CACHE_TTL};
pub use config::{ConnectorKind, RegistryConfig, SqlConnectionConfig};
pub use crate::core::{
    ColumnMetadata, ColumnValue, FieldType, FieldValue, InsertedRow, PushPayload, Row,
    SchemaMetadata, SqlConnector, TableMetadata,
};
pub use error::{ConnectorError, Result};
pub use facade::{
    ConnectionProfile, ConnectionTestResult, Integrations, PushOutcome, PushRequest, SchemaTree,
};
pub use registry::{
    DataElement, Dataset, ImportSummary, OrgUnit, PageQuery, Paged, Program, RegistryConnector,
    RegistryPayload, RegistryQuery, RegistrySchema, SchemaTarget,
};
