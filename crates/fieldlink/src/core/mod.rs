//! Shared data model: field values, push payloads, schema metadata, and
//! the SQL connector contract.

pub mod field;
pub mod schema;
pub mod traits;

pub use field::{ColumnValue, FieldType, FieldValue, InsertedRow, LiteralStyle, PushPayload, Row};
pub use schema::{ColumnMetadata, SchemaMetadata, TableMetadata};
pub use traits::SqlConnector;
