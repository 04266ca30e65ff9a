//! Registry REST strategy.
//!
//! Speaks HTTP/JSON against a DHIS2-style health registry: all endpoints
//! live under `/api/...`, authenticated with an
//! `Authorization: ApiToken <token>` header. Field-selector strings are
//! fixed and percent-encoded; callers never supply field lists.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{validate_registry_config, RegistryConfig};
use crate::error::{ConnectorError, Result};

use super::payload::{to_tracker_events, RegistryPayload};
use super::types::{
    DataElement, Dataset, DatasetFields, ImportSummary, OrgUnit, PageQuery, Paged, Pager,
    Program, ProgramFields, ProgramStage, RegistryQuery, RegistrySchema, SchemaTarget,
};

/// Connect timeout for registry requests. There is no overall request
/// timeout: a slow instance blocks its calling request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Field selector for program schema discovery.
const PROGRAM_FIELDS: &str =
    "id,name,programStages[id,name,programStageDataElements[compulsory,dataElement[id,name,valueType]]]";

/// Field selector for dataset schema discovery.
const DATASET_FIELDS: &str = "id,name,dataSetElements[dataElement[id,name,valueType]]";

/// Field selector for organisation-unit discovery.
const ORG_UNIT_FIELDS: &str = "organisationUnits[id,displayName,parent[id]]";

/// Field selector for paginated list endpoints.
const LIST_FIELDS: &str = "id,name";

/// Registry REST connector implementation.
#[derive(Debug, Clone)]
pub struct RegistryConnector {
    client: reqwest::Client,
}

impl Default for RegistryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConnector {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("default reqwest client");
        Self { client }
    }

    /// Use an externally constructed HTTP client (shared across the facade).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build an `/api/...` URL relative to the configured base.
    fn api_url(cfg: &RegistryConfig, path_and_query: &str) -> String {
        format!(
            "{}/api/{}",
            cfg.base_url.trim_end_matches('/'),
            path_and_query
        )
    }

    /// Classify a transport-layer failure by what actually went wrong.
    fn classify_transport(err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            return ConnectorError::UpstreamTimeout(format!("request timed out: {}", err));
        }

        if err.is_connect() {
            let mut refused = false;
            let mut messages = vec![err.to_string()];
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                    if io.kind() == std::io::ErrorKind::ConnectionRefused {
                        refused = true;
                    }
                }
                messages.push(cause.to_string());
                source = cause.source();
            }
            let detail = messages.join(": ");

            if detail.to_lowercase().contains("dns")
                || detail.to_lowercase().contains("resolve")
            {
                return ConnectorError::UpstreamUnreachable(format!(
                    "host could not be resolved: {}",
                    detail
                ));
            }
            if refused {
                return ConnectorError::UpstreamUnreachable(format!(
                    "connection refused: {}",
                    detail
                ));
            }
            return ConnectorError::UpstreamUnreachable(detail);
        }

        ConnectorError::Internal(err.to_string())
    }

    /// Classify an HTTP-layer failure by status code, attaching the
    /// upstream body to the generic case.
    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => ConnectorError::UpstreamUnauthorized(body),
            StatusCode::FORBIDDEN => ConnectorError::UpstreamForbidden(body),
            StatusCode::NOT_FOUND => ConnectorError::UpstreamNotFound(body),
            other => ConnectorError::Internal(format!("registry returned {}: {}", other, body)),
        })
    }

    async fn get_value(&self, cfg: &RegistryConfig, path_and_query: &str) -> Result<Value> {
        let url = Self::api_url(cfg, path_and_query);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("ApiToken {}", cfg.api_token))
            .send()
            .await
            .map_err(Self::classify_transport)?;
        let resp = Self::check_status(resp).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| ConnectorError::Internal(format!("malformed registry response: {}", e)))
    }

    async fn post_value(
        &self,
        cfg: &RegistryConfig,
        path_and_query: &str,
        body: &Value,
    ) -> Result<Value> {
        let url = Self::api_url(cfg, path_and_query);
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("ApiToken {}", cfg.api_token))
            .json(body)
            .send()
            .await
            .map_err(Self::classify_transport)?;
        let resp = Self::check_status(resp).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| ConnectorError::Internal(format!("malformed registry response: {}", e)))
    }

    fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T> {
        serde_json::from_value(value)
            .map_err(|e| ConnectorError::Internal(format!("unexpected {} response: {}", what, e)))
    }

    /// Check that both token and URL actually point at a registry instance.
    pub fn validate_config(&self, cfg: &RegistryConfig) -> Result<()> {
        validate_registry_config(cfg)
    }

    /// Probe the system-info endpoint; a real instance reports both a
    /// version and a context path.
    pub async fn test_connection(&self, cfg: &RegistryConfig) -> Result<()> {
        let info = self.get_value(cfg, "system/info").await?;
        if info.get("version").is_some() && info.get("contextPath").is_some() {
            info!("registry connection ok: {}", cfg.base_url);
            Ok(())
        } else {
            Err(ConnectorError::ConnectionFailed(
                "the configured URL does not point at a valid registry instance".to_string(),
            ))
        }
    }

    /// Fetch the field tree of a program or dataset.
    pub async fn fetch_schemas(
        &self,
        cfg: &RegistryConfig,
        query: &RegistryQuery,
    ) -> Result<RegistrySchema> {
        match query.target {
            SchemaTarget::Program => {
                let path = format!(
                    "programs/{}?fields={}",
                    query.id,
                    urlencoding::encode(PROGRAM_FIELDS)
                );
                let dto: ProgramDto = Self::decode(self.get_value(cfg, &path).await?, "program")?;
                Ok(RegistrySchema::Program(dto.into()))
            }
            SchemaTarget::Dataset => {
                let path = format!(
                    "dataSets/{}?fields={}",
                    query.id,
                    urlencoding::encode(DATASET_FIELDS)
                );
                let dto: DatasetDto = Self::decode(self.get_value(cfg, &path).await?, "dataset")?;
                Ok(RegistrySchema::Dataset(dto.into()))
            }
        }
    }

    /// Paginated program listing.
    pub async fn get_programs(
        &self,
        cfg: &RegistryConfig,
        page: PageQuery,
    ) -> Result<Paged<Program>> {
        let path = format!(
            "programs?page={}&pageSize={}&totalPages=true&fields={}",
            page.page,
            page.page_size,
            urlencoding::encode(LIST_FIELDS)
        );
        let dto: ProgramListDto = Self::decode(self.get_value(cfg, &path).await?, "program list")?;
        Ok(Paged {
            pager: dto.pager.unwrap_or_default(),
            items: dto.programs,
        })
    }

    /// Paginated dataset listing.
    pub async fn get_datasets(
        &self,
        cfg: &RegistryConfig,
        page: PageQuery,
    ) -> Result<Paged<Dataset>> {
        let path = format!(
            "dataSets?page={}&pageSize={}&totalPages=true&fields={}",
            page.page,
            page.page_size,
            urlencoding::encode(LIST_FIELDS)
        );
        let dto: DatasetListDto = Self::decode(self.get_value(cfg, &path).await?, "dataset list")?;
        Ok(Paged {
            pager: dto.pager.unwrap_or_default(),
            items: dto.data_sets,
        })
    }

    /// Organisation units assigned to a program or dataset. Returns an
    /// empty sequence, never null, when none are assigned.
    pub async fn get_org_units(
        &self,
        cfg: &RegistryConfig,
        query: &RegistryQuery,
    ) -> Result<Vec<OrgUnit>> {
        let resource = match query.target {
            SchemaTarget::Program => "programs",
            SchemaTarget::Dataset => "dataSets",
        };
        let path = format!(
            "{}/{}?fields={}",
            resource,
            query.id,
            urlencoding::encode(ORG_UNIT_FIELDS)
        );
        let dto: OrgUnitsDto = Self::decode(self.get_value(cfg, &path).await?, "org units")?;
        Ok(dto
            .organisation_units
            .into_iter()
            .map(OrgUnit::from)
            .collect())
    }

    /// Push a classified payload: event batches go through the tracker
    /// transformation, data-value sets are forwarded verbatim.
    pub async fn push_data(
        &self,
        cfg: &RegistryConfig,
        payload: RegistryPayload,
    ) -> Result<ImportSummary> {
        let response = match payload {
            RegistryPayload::Events(events) => {
                let body = to_tracker_events(&events);
                self.post_value(cfg, "tracker?async=false", &body).await?
            }
            RegistryPayload::DatasetValues(value) => {
                self.post_value(cfg, "dataValueSets", &value).await?
            }
        };
        Ok(ImportSummary::from_value(&response))
    }
}

// ---- wire DTOs -------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataElementDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    value_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageElementDto {
    #[serde(default)]
    compulsory: bool,
    data_element: DataElementDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    program_stage_data_elements: Vec<StageElementDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgramDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    program_stages: Vec<StageDto>,
}

impl From<ProgramDto> for ProgramFields {
    fn from(dto: ProgramDto) -> Self {
        ProgramFields {
            id: dto.id,
            name: dto.name,
            stages: dto
                .program_stages
                .into_iter()
                .map(|stage| ProgramStage {
                    id: stage.id,
                    name: stage.name,
                    data_elements: stage
                        .program_stage_data_elements
                        .into_iter()
                        .map(|e| DataElement {
                            id: e.data_element.id,
                            name: e.data_element.name,
                            value_type: e.data_element.value_type,
                            mandatory: e.compulsory,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetElementDto {
    data_element: DataElementDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    data_set_elements: Vec<DatasetElementDto>,
}

impl From<DatasetDto> for DatasetFields {
    fn from(dto: DatasetDto) -> Self {
        DatasetFields {
            id: dto.id,
            name: dto.name,
            data_elements: dto
                .data_set_elements
                .into_iter()
                .map(|e| DataElement {
                    id: e.data_element.id,
                    name: e.data_element.name,
                    value_type: e.data_element.value_type,
                    // Dataset elements carry no compulsory flag.
                    mandatory: false,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct ParentRefDto {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgUnitDto {
    id: String,
    #[serde(default)]
    display_name: String,
    parent: Option<ParentRefDto>,
}

impl From<OrgUnitDto> for OrgUnit {
    fn from(dto: OrgUnitDto) -> Self {
        OrgUnit {
            id: dto.id,
            name: dto.display_name,
            parent_id: dto.parent.map(|p| p.id),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgUnitsDto {
    #[serde(default)]
    organisation_units: Vec<OrgUnitDto>,
}

#[derive(Deserialize)]
struct ProgramListDto {
    pager: Option<Pager>,
    #[serde(default)]
    programs: Vec<Program>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetListDto {
    pager: Option<Pager>,
    #[serde(default)]
    data_sets: Vec<Dataset>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> RegistryConfig {
        RegistryConfig {
            base_url: "https://registry.example.org/site/".to_string(),
            api_token: "d2pat_x".to_string(),
        }
    }

    #[test]
    fn test_api_url_joins_base_and_path() {
        assert_eq!(
            RegistryConnector::api_url(&cfg(), "system/info"),
            "https://registry.example.org/site/api/system/info"
        );
    }

    #[test]
    fn test_field_selectors_are_percent_encoded() {
        let encoded = urlencoding::encode(PROGRAM_FIELDS);
        assert!(!encoded.contains('['));
        assert!(encoded.contains("%5B"));
        assert!(encoded.contains("%5D"));
    }

    #[test]
    fn test_program_dto_flattens_stage_elements() {
        let v = json!({
            "id": "PR1",
            "name": "Immunization",
            "programStages": [{
                "id": "PS1",
                "name": "Dose",
                "programStageDataElements": [
                    {"compulsory": true, "dataElement": {"id": "DE1", "name": "Vaccine", "valueType": "TEXT"}},
                    {"dataElement": {"id": "DE2", "name": "Batch", "valueType": "TEXT"}}
                ]
            }]
        });
        let dto: ProgramDto = serde_json::from_value(v).unwrap();
        let fields: ProgramFields = dto.into();
        assert_eq!(fields.stages.len(), 1);
        let elements = &fields.stages[0].data_elements;
        assert_eq!(elements.len(), 2);
        assert!(elements[0].mandatory);
        assert!(!elements[1].mandatory);
        assert_eq!(elements[1].id, "DE2");
    }

    #[test]
    fn test_org_unit_dto_keeps_parent_back_reference() {
        let v = json!({
            "organisationUnits": [
                {"id": "OU1", "displayName": "District A", "parent": {"id": "OU0"}},
                {"id": "OU2", "displayName": "District B"}
            ]
        });
        let dto: OrgUnitsDto = serde_json::from_value(v).unwrap();
        let units: Vec<OrgUnit> = dto.organisation_units.into_iter().map(OrgUnit::from).collect();
        assert_eq!(units[0].parent_id.as_deref(), Some("OU0"));
        assert_eq!(units[1].parent_id, None);
    }

    #[test]
    fn test_org_units_absent_decodes_to_empty() {
        let dto: OrgUnitsDto = serde_json::from_value(json!({})).unwrap();
        assert!(dto.organisation_units.is_empty());
    }

    #[test]
    fn test_dataset_list_dto_field_name() {
        let v = json!({
            "pager": {"page": 1, "pageCount": 2, "total": 60, "pageSize": 50},
            "dataSets": [{"id": "DS1", "name": "Monthly"}]
        });
        let dto: DatasetListDto = serde_json::from_value(v).unwrap();
        assert_eq!(dto.data_sets.len(), 1);
        assert_eq!(dto.pager.unwrap().total, 60);
    }
}
