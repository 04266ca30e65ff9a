//! Integration facade: the single entry point the workflow layer calls.
//!
//! Each operation resolves the owning strategy for a connection profile and
//! delegates; the facade adds no business logic beyond cache consultation
//! around schema discovery.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{MemorySchemaCache, SchemaCache, SchemaCacheKey};
use crate::config::{ConnectorKind, RegistryConfig, SqlConnectionConfig};
use crate::core::field::{InsertedRow, PushPayload};
use crate::core::schema::SchemaMetadata;
use crate::core::traits::SqlConnector;
use crate::drivers::SqlConnectorImpl;
use crate::error::{ConnectorError, Result};
use crate::registry::{
    Dataset, ImportSummary, OrgUnit, PageQuery, Paged, Program, RegistryConnector,
    RegistryPayload, RegistryQuery, RegistrySchema,
};

/// One external-connection record: which system it is and how to reach it.
#[derive(Debug, Clone)]
pub enum ConnectionProfile {
    Sql {
        kind: ConnectorKind,
        config: SqlConnectionConfig,
    },
    Registry {
        config: RegistryConfig,
    },
}

impl ConnectionProfile {
    pub fn kind(&self) -> ConnectorKind {
        match self {
            ConnectionProfile::Sql { kind, .. } => *kind,
            ConnectionProfile::Registry { .. } => ConnectorKind::Registry,
        }
    }
}

/// Outcome of a connection test, shaped for direct presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
}

/// Schema discovery result: a SQL metadata tree or a registry field tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaTree {
    Sql(Vec<SchemaMetadata>),
    Registry(RegistrySchema),
}

/// Data destined for one connection.
#[derive(Debug, Clone)]
pub enum PushRequest {
    /// Rows for a SQL table.
    Sql(PushPayload),
    /// Raw registry payload, classified at this boundary.
    Registry(Value),
}

/// Outcome of a data push.
#[derive(Debug, Clone)]
pub enum PushOutcome {
    Rows(Vec<InsertedRow>),
    Import(ImportSummary),
}

/// The integration facade.
pub struct Integrations {
    cache: Arc<dyn SchemaCache>,
    registry: RegistryConnector,
}

impl Integrations {
    /// Facade with the standard five-minute schema cache.
    pub fn new() -> Self {
        Self::with_cache(Arc::new(MemorySchemaCache::new()))
    }

    /// Facade with an injected cache (tests use a short TTL).
    pub fn with_cache(cache: Arc<dyn SchemaCache>) -> Self {
        Self {
            cache,
            registry: RegistryConnector::new(),
        }
    }

    /// Test a connection; failures become a presentable message instead of
    /// an error, since an unreachable system is an expected answer here.
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> ConnectionTestResult {
        let outcome = match profile {
            ConnectionProfile::Sql { kind, config } => match SqlConnectorImpl::from_kind(*kind) {
                Ok(connector) => match connector.validate_config(config) {
                    Ok(()) => connector.test_connection(config).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            ConnectionProfile::Registry { config } => {
                match self.registry.validate_config(config) {
                    Ok(()) => self.registry.test_connection(config).await,
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(()) => ConnectionTestResult {
                success: true,
                message: "Connection successful".to_string(),
            },
            Err(e) => ConnectionTestResult {
                success: false,
                message: e.to_string(),
            },
        }
    }

    /// Discover schemas. SQL results go through the TTL cache; registry
    /// discovery requires an entity query and is never cached.
    pub async fn fetch_schemas(
        &self,
        profile: &ConnectionProfile,
        query: Option<&RegistryQuery>,
    ) -> Result<SchemaTree> {
        match profile {
            ConnectionProfile::Sql { kind, config } => {
                let key = SchemaCacheKey::for_connection(*kind, config);
                if let Some(cached) = self.cache.get(&key) {
                    return Ok(SchemaTree::Sql(cached));
                }

                let connector = SqlConnectorImpl::from_kind(*kind)?;
                let schemas = connector.fetch_schemas(config).await?;
                self.cache.put(key, schemas.clone());
                Ok(SchemaTree::Sql(schemas))
            }
            ConnectionProfile::Registry { config } => {
                let query = query.ok_or_else(|| {
                    ConnectorError::InvalidConfiguration(
                        "registry schema discovery requires an id and type".to_string(),
                    )
                })?;
                let schema = self.registry.fetch_schemas(config, query).await?;
                Ok(SchemaTree::Registry(schema))
            }
        }
    }

    /// Push data into the connection's system of record.
    pub async fn push_data(
        &self,
        profile: &ConnectionProfile,
        request: PushRequest,
    ) -> Result<PushOutcome> {
        match (profile, request) {
            (ConnectionProfile::Sql { kind, config }, PushRequest::Sql(payload)) => {
                let connector = SqlConnectorImpl::from_kind(*kind)?;
                debug!(
                    dialect = connector.dialect(),
                    table = %payload.table,
                    rows = payload.rows.len(),
                    "pushing rows"
                );
                let inserted = connector.push_data(config, &payload).await?;
                Ok(PushOutcome::Rows(inserted))
            }
            (ConnectionProfile::Registry { config }, PushRequest::Registry(value)) => {
                let payload = RegistryPayload::from_value(value)?;
                let summary = self.registry.push_data(config, payload).await?;
                Ok(PushOutcome::Import(summary))
            }
            (profile, _) => Err(ConnectorError::InvalidConfiguration(format!(
                "payload shape does not match a {} connection",
                profile.kind()
            ))),
        }
    }

    /// Paginated program listing (registry connections only).
    pub async fn get_programs(
        &self,
        profile: &ConnectionProfile,
        page: PageQuery,
    ) -> Result<Paged<Program>> {
        let config = self.registry_config(profile)?;
        self.registry.get_programs(config, page).await
    }

    /// Paginated dataset listing (registry connections only).
    pub async fn get_datasets(
        &self,
        profile: &ConnectionProfile,
        page: PageQuery,
    ) -> Result<Paged<Dataset>> {
        let config = self.registry_config(profile)?;
        self.registry.get_datasets(config, page).await
    }

    /// Organisation units of a program or dataset (registry connections only).
    pub async fn get_org_units(
        &self,
        profile: &ConnectionProfile,
        query: &RegistryQuery,
    ) -> Result<Vec<OrgUnit>> {
        let config = self.registry_config(profile)?;
        self.registry.get_org_units(config, query).await
    }

    fn registry_config<'a>(&self, profile: &'a ConnectionProfile) -> Result<&'a RegistryConfig> {
        match profile {
            ConnectionProfile::Registry { config } => Ok(config),
            ConnectionProfile::Sql { kind, .. } => {
                Err(ConnectorError::UnsupportedConnector(kind.name().to_string()))
            }
        }
    }
}

impl Default for Integrations {
    fn default() -> Self {
        Self::new()
    }
}
