//! Registry (DHIS2-style) REST strategy.

mod client;
mod payload;
mod types;

pub use client::RegistryConnector;
pub use payload::{coerce_value, to_tracker_events, EventRecord, RegistryPayload,
    DEFAULT_EVENT_STATUS};
pub use types::{
    DataElement, Dataset, DatasetFields, ImportSummary, OrgUnit, PageQuery, Paged, Pager,
    Program, ProgramFields, ProgramStage, RegistryQuery, RegistrySchema, SchemaTarget,
};
