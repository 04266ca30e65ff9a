//! Error types for connector operations.
//!
//! Every native driver or HTTP failure is normalized into one of these
//! variants before it crosses a strategy boundary; the original native
//! message is preserved in the variant payload for logging.

use thiserror::Error;

/// Main error type for connector operations.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Configuration error (missing fields, malformed values).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The external system could not be reached or rejected the handshake.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connector type string matched no registered strategy.
    #[error("Unsupported connector type: '{0}'")]
    UnsupportedConnector(String),

    /// A unique or primary-key constraint was violated on insert.
    #[error("Unique constraint violation: {0}")]
    UniqueConstraintViolation(String),

    /// A foreign-key constraint was violated on insert.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The target table does not exist.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A registry push payload matched neither accepted shape.
    #[error("Unknown payload type: {0}")]
    UnknownPayloadType(String),

    /// Registry responded 401.
    #[error("Registry rejected the credentials: {0}")]
    UpstreamUnauthorized(String),

    /// Registry responded 403.
    #[error("Registry denied access: {0}")]
    UpstreamForbidden(String),

    /// Registry responded 404.
    #[error("Registry resource not found: {0}")]
    UpstreamNotFound(String),

    /// Registry host could not be reached (DNS failure, connection refused).
    #[error("Registry unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Registry did not respond within the timeout.
    #[error("Registry timed out: {0}")]
    UpstreamTimeout(String),

    /// Catch-all for unrecognized native errors; carries the original message.
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Create an InvalidConfiguration error from the missing field names,
    /// pluralized for one vs. several.
    pub fn missing_fields(fields: &[&str]) -> Self {
        debug_assert!(!fields.is_empty());
        let message = if fields.len() == 1 {
            format!("missing required field: {}", fields[0])
        } else {
            format!("missing required fields: {}", fields.join(", "))
        };
        ConnectorError::InvalidConfiguration(message)
    }

    /// Create a ConnectionFailed error carrying the native driver message.
    pub fn connection(message: impl std::fmt::Display) -> Self {
        ConnectorError::ConnectionFailed(message.to_string())
    }

    /// Create an Internal error with context about where it occurred.
    pub fn internal(message: impl std::fmt::Display, context: &str) -> Self {
        ConnectorError::Internal(format!("{} ({})", message, context))
    }

    /// Stable identifier for the semantic kind, independent of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::InvalidConfiguration(_) => "invalid_configuration",
            ConnectorError::ConnectionFailed(_) => "connection_failed",
            ConnectorError::UnsupportedConnector(_) => "unsupported_connector",
            ConnectorError::UniqueConstraintViolation(_) => "unique_constraint_violation",
            ConnectorError::ForeignKeyViolation(_) => "foreign_key_violation",
            ConnectorError::TableNotFound(_) => "table_not_found",
            ConnectorError::UnknownPayloadType(_) => "unknown_payload_type",
            ConnectorError::UpstreamUnauthorized(_) => "upstream_unauthorized",
            ConnectorError::UpstreamForbidden(_) => "upstream_forbidden",
            ConnectorError::UpstreamNotFound(_) => "upstream_not_found",
            ConnectorError::UpstreamUnreachable(_) => "upstream_unreachable",
            ConnectorError::UpstreamTimeout(_) => "upstream_timeout",
            ConnectorError::Internal(_) => "internal_failure",
        }
    }

    /// Format error with full details including the source chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_singular() {
        let err = ConnectorError::missing_fields(&["host"]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: missing required field: host"
        );
    }

    #[test]
    fn test_missing_fields_plural() {
        let err = ConnectorError::missing_fields(&["host", "port", "password"]);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: missing required fields: host, port, password"
        );
    }

    #[test]
    fn test_kind_is_message_independent() {
        let a = ConnectorError::UniqueConstraintViolation("dup key 'x'".into());
        let b = ConnectorError::UniqueConstraintViolation("ORA-00001".into());
        assert_eq!(a.kind(), b.kind());
    }
}
