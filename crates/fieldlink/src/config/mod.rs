//! Connection configuration: types and validation.

mod types;
mod validation;

pub use types::{
    ConnectorKind, RegistryConfig, SqlConnectionConfig, DEFAULT_CONNECT_TIMEOUT,
};
pub use validation::{missing_sql_fields, validate_registry_config, validate_sql_config};
