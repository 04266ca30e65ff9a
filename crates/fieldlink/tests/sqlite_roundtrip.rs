//! End-to-end push and discovery against SQLite, the one dialect that
//! needs no external server.

use std::sync::Arc;
use std::time::Duration;

use fieldlink::cache::MemorySchemaCache;
use fieldlink::{
    ColumnValue, ConnectionProfile, ConnectorKind, FieldType, FieldValue, Integrations,
    PushOutcome, PushPayload, PushRequest, SchemaTree, SqlConnectionConfig,
};

fn temp_config(name: &str) -> (SqlConnectionConfig, String) {
    let path = std::env::temp_dir()
        .join(format!("fieldlink_{}_{}.db", name, std::process::id()))
        .to_string_lossy()
        .into_owned();
    let _ = std::fs::remove_file(&path);
    let cfg = SqlConnectionConfig {
        file_path: Some(path.clone()),
        ..Default::default()
    };
    (cfg, path)
}

fn profile(cfg: &SqlConnectionConfig) -> ConnectionProfile {
    ConnectionProfile::Sql {
        kind: ConnectorKind::Sqlite,
        config: cfg.clone(),
    }
}

fn visit_row(name: &str, age: f64) -> Vec<ColumnValue> {
    vec![
        ColumnValue::new("name", FieldType::Text, FieldValue::Text(name.to_string())),
        ColumnValue::new("age", FieldType::Number, FieldValue::Number(age)),
    ]
}

fn visits_payload(rows: Vec<Vec<ColumnValue>>) -> PushRequest {
    PushRequest::Sql(PushPayload {
        schema: "main".to_string(),
        table: "visits".to_string(),
        rows,
    })
}

#[tokio::test]
async fn push_creates_table_and_returns_generated_ids() {
    let (cfg, path) = temp_config("roundtrip");
    let facade = Integrations::new();

    let outcome = facade
        .push_data(&profile(&cfg), visits_payload(vec![visit_row("Bob", 5.0)]))
        .await
        .unwrap();

    let rows = match outcome {
        PushOutcome::Rows(rows) => rows,
        other => panic!("expected rows, got {:?}", other),
    };
    assert_eq!(rows.len(), 1);
    // The generated identifier was not present in the input.
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].columns.len(), 2);

    // The created table's columns match the first row's field names.
    let tree = facade.fetch_schemas(&profile(&cfg), None).await.unwrap();
    let schemas = match tree {
        SchemaTree::Sql(s) => s,
        other => panic!("expected SQL schemas, got {:?}", other),
    };
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].name, "main");
    let table = schemas[0]
        .tables
        .iter()
        .find(|t| t.name == "visits")
        .expect("visits table created");
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "age"]);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn second_push_detects_existing_table_and_only_inserts() {
    let (cfg, path) = temp_config("idempotent");
    let facade = Integrations::new();

    facade
        .push_data(&profile(&cfg), visits_payload(vec![visit_row("Bob", 5.0)]))
        .await
        .unwrap();

    let outcome = facade
        .push_data(
            &profile(&cfg),
            visits_payload(vec![visit_row("Alice", 7.0), visit_row("Carol", 9.0)]),
        )
        .await
        .unwrap();

    let rows = match outcome {
        PushOutcome::Rows(rows) => rows,
        other => panic!("expected rows, got {:?}", other),
    };
    // The table was created once; ids continue from the first batch.
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn empty_batch_is_rejected_without_touching_the_database() {
    let (cfg, path) = temp_config("empty");
    let facade = Integrations::new();

    let err = facade
        .push_data(&profile(&cfg), visits_payload(vec![]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_configuration");
    // No database file was created.
    assert!(!std::path::Path::new(&path).exists());
}

#[tokio::test]
async fn schema_cache_hides_new_tables_until_expiry() {
    let (cfg, path) = temp_config("cache");
    let facade = Integrations::with_cache(Arc::new(MemorySchemaCache::with_ttl(
        Duration::from_millis(1500),
    )));

    facade
        .push_data(&profile(&cfg), visits_payload(vec![visit_row("Bob", 5.0)]))
        .await
        .unwrap();

    let first = facade.fetch_schemas(&profile(&cfg), None).await.unwrap();

    // Create a second table after the cache was populated.
    facade
        .push_data(
            &profile(&cfg),
            PushRequest::Sql(PushPayload {
                schema: "main".to_string(),
                table: "followups".to_string(),
                rows: vec![visit_row("Bob", 5.0)],
            }),
        )
        .await
        .unwrap();

    // Within the TTL the cached snapshot is returned unchanged.
    let second = facade.fetch_schemas(&profile(&cfg), None).await.unwrap();
    assert_eq!(first, second);

    // After expiry a fresh round trip sees the new table.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    let third = facade.fetch_schemas(&profile(&cfg), None).await.unwrap();
    let schemas = match third {
        SchemaTree::Sql(s) => s,
        other => panic!("expected SQL schemas, got {:?}", other),
    };
    assert!(schemas[0].tables.iter().any(|t| t.name == "followups"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn multiselect_and_boolean_values_degrade_to_storable_forms() {
    let (cfg, path) = temp_config("coercion");
    let facade = Integrations::new();

    let row = vec![
        ColumnValue::new(
            "symptoms",
            FieldType::MultiSelect,
            FieldValue::List(vec!["fever".to_string(), "cough".to_string()]),
        ),
        ColumnValue::new("consented", FieldType::Boolean, FieldValue::Bool(true)),
        ColumnValue::new("notes", FieldType::TextArea, FieldValue::Null),
    ];

    let outcome = facade
        .push_data(
            &profile(&cfg),
            PushRequest::Sql(PushPayload {
                schema: "main".to_string(),
                table: "screenings".to_string(),
                rows: vec![row],
            }),
        )
        .await
        .unwrap();

    match outcome {
        PushOutcome::Rows(rows) => assert_eq!(rows[0].id, 1),
        other => panic!("expected rows, got {:?}", other),
    }

    let _ = std::fs::remove_file(&path);
}
