//! Registry entities: programs, datasets, organisation units, and the
//! field trees returned by schema discovery.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConnectorError, Result};

/// A program in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A dataset in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An organisation unit. The parent is a back-reference only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgUnit {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// A data element within a program stage or dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataElement {
    pub id: String,
    pub name: String,
    pub value_type: String,
    pub mandatory: bool,
}

/// A program stage with its data elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramStage {
    pub id: String,
    pub name: String,
    pub data_elements: Vec<DataElement>,
}

/// Field tree of a program: stages and their data elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramFields {
    pub id: String,
    pub name: String,
    pub stages: Vec<ProgramStage>,
}

/// Field tree of a dataset: its data elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetFields {
    pub id: String,
    pub name: String,
    pub data_elements: Vec<DataElement>,
}

/// Result of registry schema discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RegistrySchema {
    Program(ProgramFields),
    Dataset(DatasetFields),
}

/// Whether a registry query targets a program or a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaTarget {
    Program,
    Dataset,
}

impl std::str::FromStr for SchemaTarget {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "program" => Ok(SchemaTarget::Program),
            "dataset" => Ok(SchemaTarget::Dataset),
            other => Err(ConnectorError::InvalidConfiguration(format!(
                "type must be 'program' or 'dataset', got '{}'",
                other
            ))),
        }
    }
}

/// A registry lookup: an entity id plus what kind of entity it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryQuery {
    pub id: String,
    pub target: SchemaTarget,
}

/// Pagination parameters for list endpoints. Defaults are the caller's
/// concern, not this layer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
}

/// Pager block returned alongside list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Pager {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page_size: u32,
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paged<T> {
    pub pager: Pager,
    pub items: Vec<T>,
}

/// Outcome of a registry data push, decoded leniently from either the
/// tracker response (`stats`) or the data-value-set response
/// (`importCount`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub status: String,
    pub imported: u64,
    pub updated: u64,
    pub ignored: u64,
}

impl ImportSummary {
    pub fn from_value(value: &Value) -> Self {
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();

        let counts = value
            .get("stats")
            .or_else(|| value.get("importCount"))
            .cloned()
            .unwrap_or(Value::Null);
        let count = |keys: &[&str]| -> u64 {
            keys.iter()
                .find_map(|k| counts.get(k).and_then(Value::as_u64))
                .unwrap_or(0)
        };

        ImportSummary {
            status,
            imported: count(&["created", "imported"]),
            updated: count(&["updated"]),
            ignored: count(&["ignored"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_target_parsing() {
        assert_eq!("program".parse::<SchemaTarget>().unwrap(), SchemaTarget::Program);
        assert_eq!("Dataset".parse::<SchemaTarget>().unwrap(), SchemaTarget::Dataset);
        assert!("tracker".parse::<SchemaTarget>().is_err());
    }

    #[test]
    fn test_import_summary_from_tracker_response() {
        let v = json!({
            "status": "OK",
            "stats": {"created": 3, "updated": 1, "ignored": 0, "deleted": 0}
        });
        let summary = ImportSummary::from_value(&v);
        assert_eq!(summary.status, "OK");
        assert_eq!(summary.imported, 3);
        assert_eq!(summary.updated, 1);
    }

    #[test]
    fn test_import_summary_from_data_value_set_response() {
        let v = json!({
            "status": "SUCCESS",
            "importCount": {"imported": 10, "updated": 2, "ignored": 1}
        });
        let summary = ImportSummary::from_value(&v);
        assert_eq!(summary.status, "SUCCESS");
        assert_eq!(summary.imported, 10);
        assert_eq!(summary.ignored, 1);
    }

    #[test]
    fn test_import_summary_tolerates_missing_blocks() {
        let summary = ImportSummary::from_value(&json!({}));
        assert_eq!(summary.status, "UNKNOWN");
        assert_eq!(summary.imported, 0);
    }
}
