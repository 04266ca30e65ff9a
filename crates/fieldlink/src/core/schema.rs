//! Database-agnostic schema metadata returned by introspection.
//!
//! These trees are read-only snapshots, reconstructed fresh on every
//! un-cached fetch; they carry no identity beyond their names.

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,

    /// Native type string as reported by the engine (e.g. "varchar",
    /// "NUMBER", "timestamp without time zone").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnMetadata>,
}

/// Schema metadata: a namespace of tables.
///
/// What "schema" means depends on the dialect: a catalog schema (Postgres,
/// MSSQL), an owner (Oracle), the connected database (MySQL), or the fixed
/// `main` namespace (SQLite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Schema name.
    pub name: String,

    /// Base tables in this schema.
    pub tables: Vec<TableMetadata>,
}

impl SchemaMetadata {
    /// Create an empty schema entry.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_round_trips_through_json() {
        let schema = SchemaMetadata {
            name: "public".to_string(),
            tables: vec![TableMetadata {
                name: "visits".to_string(),
                columns: vec![ColumnMetadata {
                    name: "id".to_string(),
                    data_type: "bigint".to_string(),
                    is_nullable: false,
                }],
            }],
        };

        let json = serde_json::to_string(&schema).unwrap();
        let back: SchemaMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }
}
