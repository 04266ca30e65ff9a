//! Helpers shared by the SQL dialect strategies: native error-code
//! normalization, row alignment, and CREATE TABLE assembly.

use tracing::warn;

use crate::core::field::{ColumnValue, FieldType, FieldValue, LiteralStyle, PushPayload, Row};
use crate::error::ConnectorError;

/// Bound on concurrent per-table introspection round trips.
pub const INTROSPECT_CONCURRENCY: usize = 4;

/// Name of the synthetic auto-increment primary key added to created tables.
pub const GENERATED_ID_COLUMN: &str = "id";

/// The three constraint kinds a native driver error can normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    Unique,
    ForeignKey,
    TableMissing,
}

/// Per-dialect lookup table from native error code to semantic kind.
pub type ErrorCodeTable = &'static [(&'static str, SqlErrorKind)];

/// Normalize a native driver error into the semantic taxonomy.
///
/// An unrecognized code degrades to `Internal` carrying the original
/// message, never silently swallowed.
pub fn map_native_error(
    table: ErrorCodeTable,
    code: Option<&str>,
    message: &str,
) -> ConnectorError {
    if let Some(code) = code {
        for (native, kind) in table {
            if *native == code {
                return match kind {
                    SqlErrorKind::Unique => {
                        ConnectorError::UniqueConstraintViolation(message.to_string())
                    }
                    SqlErrorKind::ForeignKey => {
                        ConnectorError::ForeignKeyViolation(message.to_string())
                    }
                    SqlErrorKind::TableMissing => {
                        ConnectorError::TableNotFound(message.to_string())
                    }
                };
            }
        }
    }
    ConnectorError::Internal(message.to_string())
}

/// Align a row to the shape of the first row in the batch.
///
/// Returns the values for exactly the first row's columns, in its order;
/// columns absent from the row become NULL. Excess columns are dropped with
/// a warning naming the column and row index.
pub fn align_row(first: &Row, row: &Row, row_idx: usize) -> Vec<FieldValue> {
    for extra in row {
        if !first.iter().any(|c| c.name == extra.name) {
            warn!(
                column = %extra.name,
                row = row_idx,
                "dropping column not present in the first row of the batch"
            );
        }
    }

    first
        .iter()
        .map(|template| {
            row.iter()
                .find(|c| c.name == template.name)
                .map(|c| c.value.clone())
                .unwrap_or(FieldValue::Null)
        })
        .collect()
}

/// Align every row of the batch to the first row's shape, preserving the
/// first row's column names and declared types.
pub fn aligned_batch(payload: &PushPayload) -> Vec<Row> {
    let first = payload.first_row();
    payload
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let values = align_row(first, row, i);
            first
                .iter()
                .zip(values)
                .map(|(template, value)| {
                    ColumnValue::new(template.name.clone(), template.field_type, value)
                })
                .collect()
        })
        .collect()
}

/// Render a VALUES tuple for one aligned row.
pub fn row_values_tuple(row: &Row, style: LiteralStyle) -> String {
    let rendered: Vec<String> = row.iter().map(|c| c.value.to_sql_literal(style)).collect();
    format!("({})", rendered.join(", "))
}

/// Build the column-definition list for CREATE TABLE from the first row.
///
/// `quote` is the dialect identifier quoter; `native_type` maps a FieldType
/// to the dialect's column type string. The synthetic id column is the
/// caller's responsibility (its syntax varies too much per dialect).
pub fn column_definitions(
    first: &Row,
    quote: impl Fn(&str) -> String,
    native_type: impl Fn(FieldType) -> &'static str,
) -> Vec<String> {
    first
        .iter()
        .map(|c| format!("{} {}", quote(&c.name), native_type(c.field_type)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: ErrorCodeTable = &[
        ("23505", SqlErrorKind::Unique),
        ("23503", SqlErrorKind::ForeignKey),
        ("42P01", SqlErrorKind::TableMissing),
    ];

    #[test]
    fn test_map_native_error_known_codes() {
        let err = map_native_error(TEST_TABLE, Some("23505"), "duplicate key");
        assert_eq!(err.kind(), "unique_constraint_violation");

        let err = map_native_error(TEST_TABLE, Some("23503"), "fk");
        assert_eq!(err.kind(), "foreign_key_violation");

        let err = map_native_error(TEST_TABLE, Some("42P01"), "missing");
        assert_eq!(err.kind(), "table_not_found");
    }

    #[test]
    fn test_map_native_error_unknown_degrades_to_internal() {
        let err = map_native_error(TEST_TABLE, Some("55000"), "object_not_in_prerequisite_state");
        assert_eq!(err.kind(), "internal_failure");
        assert!(err.to_string().contains("object_not_in_prerequisite_state"));

        let err = map_native_error(TEST_TABLE, None, "connection reset");
        assert_eq!(err.kind(), "internal_failure");
    }

    fn row(pairs: &[(&str, f64)]) -> Row {
        pairs
            .iter()
            .map(|(name, v)| ColumnValue::new(*name, FieldType::Number, FieldValue::Number(*v)))
            .collect()
    }

    #[test]
    fn test_align_row_fills_missing_with_null() {
        let first = row(&[("a", 1.0), ("b", 2.0)]);
        let second = row(&[("a", 3.0)]);
        let aligned = align_row(&first, &second, 1);
        assert_eq!(aligned, vec![FieldValue::Number(3.0), FieldValue::Null]);
    }

    #[test]
    fn test_align_row_drops_excess_columns() {
        let first = row(&[("a", 1.0)]);
        let second = row(&[("a", 3.0), ("surprise", 4.0)]);
        let aligned = align_row(&first, &second, 1);
        assert_eq!(aligned, vec![FieldValue::Number(3.0)]);
    }

    #[test]
    fn test_align_row_reorders_to_first_shape() {
        let first = row(&[("a", 1.0), ("b", 2.0)]);
        let second = row(&[("b", 20.0), ("a", 10.0)]);
        let aligned = align_row(&first, &second, 1);
        assert_eq!(
            aligned,
            vec![FieldValue::Number(10.0), FieldValue::Number(20.0)]
        );
    }

    #[test]
    fn test_values_tuple_rendering() {
        let row = vec![
            ColumnValue::new("name", FieldType::Text, FieldValue::Text("Bob".to_string())),
            ColumnValue::new("age", FieldType::Number, FieldValue::Number(5.0)),
            ColumnValue::new("notes", FieldType::TextArea, FieldValue::Null),
        ];
        assert_eq!(
            row_values_tuple(&row, LiteralStyle::KEYWORDS),
            "('Bob', 5, NULL)"
        );
    }

    #[test]
    fn test_aligned_batch_keeps_first_row_shape() {
        let payload = PushPayload {
            schema: "public".to_string(),
            table: "visits".to_string(),
            rows: vec![row(&[("a", 1.0), ("b", 2.0)]), row(&[("b", 4.0)])],
        };
        let batch = aligned_batch(&payload);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1][0].name, "a");
        assert_eq!(batch[1][0].value, FieldValue::Null);
        assert_eq!(batch[1][1].value, FieldValue::Number(4.0));
    }
}
