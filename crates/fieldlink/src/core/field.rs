//! Field-level data model: the typed values a workflow pushes into a
//! system of record.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};

/// Closed set of field types collected by the workflow layer.
///
/// Only used to pick a storage column type; everything from `Select` onward
/// degrades to the dialect's generic text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Number,
    Boolean,
    Date,
    DateTime,
    Text,
    Select,
    MultiSelect,
    Email,
    Phone,
    Url,
    TextArea,
}

impl FieldType {
    /// Whether this type stores as a generic text column.
    pub fn is_textual(&self) -> bool {
        !matches!(
            self,
            FieldType::Number | FieldType::Boolean | FieldType::Date | FieldType::DateTime
        )
    }
}

/// A collected field value.
///
/// Deserializes untagged from the JSON the workflow layer produces: `null`,
/// booleans, numbers, strings, or arrays of strings (multi-select).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// Dialect knobs for SQL literal rendering.
#[derive(Debug, Clone, Copy)]
pub struct LiteralStyle {
    /// Render booleans as `TRUE`/`FALSE`; otherwise `1`/`0`.
    pub bool_keywords: bool,
    /// Double backslashes inside string literals (MySQL treats `\` as an
    /// escape character by default).
    pub escape_backslash: bool,
}

impl LiteralStyle {
    pub const KEYWORDS: LiteralStyle = LiteralStyle {
        bool_keywords: true,
        escape_backslash: false,
    };

    pub const NUMERIC_BOOLS: LiteralStyle = LiteralStyle {
        bool_keywords: false,
        escape_backslash: false,
    };

    pub const MYSQL: LiteralStyle = LiteralStyle {
        bool_keywords: true,
        escape_backslash: true,
    };
}

/// Escape a string for embedding in a single-quoted SQL literal.
///
/// Single quotes are doubled; sufficient for value literals built by this
/// layer. Identifiers are quoted separately per dialect.
fn escape_str(s: &str, style: LiteralStyle) -> String {
    let escaped = s.replace('\'', "''");
    if style.escape_backslash {
        escaped.replace('\\', "\\\\")
    } else {
        escaped
    }
}

impl FieldValue {
    /// Render as a SQL value literal for the given dialect style.
    pub fn to_sql_literal(&self, style: LiteralStyle) -> String {
        match self {
            FieldValue::Null => "NULL".to_string(),
            FieldValue::Bool(b) => match (style.bool_keywords, b) {
                (true, true) => "TRUE".to_string(),
                (true, false) => "FALSE".to_string(),
                (false, true) => "1".to_string(),
                (false, false) => "0".to_string(),
            },
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => format!("'{}'", escape_str(s, style)),
            FieldValue::List(items) => format!("'{}'", escape_str(&items.join(", "), style)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// One named, typed value within a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValue {
    /// Column name.
    pub name: String,

    /// Declared field type; drives column-type inference.
    pub field_type: FieldType,

    /// The collected value.
    pub value: FieldValue,
}

impl ColumnValue {
    pub fn new(name: impl Into<String>, field_type: FieldType, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            field_type,
            value,
        }
    }
}

/// An ordered sequence of column values; the first row pushed defines the
/// table shape when the table does not yet exist.
pub type Row = Vec<ColumnValue>;

/// A batch of rows destined for one SQL table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    /// Target schema name.
    pub schema: String,

    /// Target table name.
    pub table: String,

    /// Rows to insert. Must be non-empty.
    pub rows: Vec<Row>,
}

impl PushPayload {
    /// Reject empty batches. An empty push is a caller contract violation,
    /// identical across all dialects.
    pub fn validate(&self) -> Result<()> {
        if self.rows.is_empty() {
            return Err(ConnectorError::InvalidConfiguration(
                "push payload contains no rows".to_string(),
            ));
        }
        Ok(())
    }

    /// The row whose shape defines the table schema.
    pub fn first_row(&self) -> &Row {
        &self.rows[0]
    }
}

/// A pushed row annotated with its generated identifier.
#[derive(Debug, Clone, Serialize)]
pub struct InsertedRow {
    /// Generated primary key value.
    pub id: i64,

    /// The inserted column values, aligned to the table shape.
    pub columns: Row,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_json_names() {
        assert_eq!(
            serde_json::to_string(&FieldType::MultiSelect).unwrap(),
            "\"MULTISELECT\""
        );
        assert_eq!(
            serde_json::to_string(&FieldType::DateTime).unwrap(),
            "\"DATETIME\""
        );
        let parsed: FieldType = serde_json::from_str("\"TEXTAREA\"").unwrap();
        assert_eq!(parsed, FieldType::TextArea);
    }

    #[test]
    fn test_textual_degradation() {
        assert!(FieldType::Select.is_textual());
        assert!(FieldType::Email.is_textual());
        assert!(FieldType::TextArea.is_textual());
        assert!(!FieldType::Number.is_textual());
        assert!(!FieldType::Date.is_textual());
    }

    #[test]
    fn test_field_value_untagged_decode() {
        let v: FieldValue = serde_json::from_str("null").unwrap();
        assert_eq!(v, FieldValue::Null);
        let v: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, FieldValue::Bool(true));
        let v: FieldValue = serde_json::from_str("5").unwrap();
        assert_eq!(v, FieldValue::Number(5.0));
        let v: FieldValue = serde_json::from_str("\"Bob\"").unwrap();
        assert_eq!(v, FieldValue::Text("Bob".to_string()));
        let v: FieldValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(v, FieldValue::List(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_literal_quote_doubling() {
        let v = FieldValue::Text("O'Brien".to_string());
        assert_eq!(v.to_sql_literal(LiteralStyle::KEYWORDS), "'O''Brien'");
    }

    #[test]
    fn test_literal_backslash_escaping() {
        let v = FieldValue::Text("a\\b".to_string());
        assert_eq!(v.to_sql_literal(LiteralStyle::KEYWORDS), "'a\\b'");
        assert_eq!(v.to_sql_literal(LiteralStyle::MYSQL), "'a\\\\b'");
    }

    #[test]
    fn test_literal_bool_styles() {
        assert_eq!(
            FieldValue::Bool(true).to_sql_literal(LiteralStyle::KEYWORDS),
            "TRUE"
        );
        assert_eq!(
            FieldValue::Bool(true).to_sql_literal(LiteralStyle::NUMERIC_BOOLS),
            "1"
        );
        assert_eq!(
            FieldValue::Bool(false).to_sql_literal(LiteralStyle::NUMERIC_BOOLS),
            "0"
        );
    }

    #[test]
    fn test_literal_list_joins() {
        let v = FieldValue::List(vec!["red".to_string(), "blue".to_string()]);
        assert_eq!(v.to_sql_literal(LiteralStyle::KEYWORDS), "'red, blue'");
    }

    #[test]
    fn test_empty_payload_rejected() {
        let payload = PushPayload {
            schema: "public".to_string(),
            table: "visits".to_string(),
            rows: vec![],
        };
        let err = payload.validate().unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }
}
