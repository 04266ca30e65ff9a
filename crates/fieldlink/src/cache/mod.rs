//! Time-boxed cache for introspected schema metadata.
//!
//! A pure performance optimization: correctness never depends on an entry
//! being present, only on it expiring. Entries are replaced atomically, so
//! staleness is the only failure mode under concurrent access.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{ConnectorKind, SqlConnectionConfig};
use crate::core::SchemaMetadata;

/// Cache entries expire after five minutes.
pub const SCHEMA_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache key: one entry per (dialect, host, port, database).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaCacheKey {
    pub dialect: &'static str,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl SchemaCacheKey {
    /// Build the key for a SQL connection. SQLite keys on the file path.
    pub fn for_connection(kind: ConnectorKind, cfg: &SqlConnectionConfig) -> Self {
        let database = match kind {
            ConnectorKind::Sqlite => cfg.sqlite_path().unwrap_or_default().to_string(),
            _ => cfg.database.clone(),
        };
        Self {
            dialect: kind.name(),
            host: cfg.host.clone(),
            port: cfg.port,
            database,
        }
    }
}

/// Key-value store with TTL semantics, injected into the facade so tests
/// can swap in a short-TTL map.
pub trait SchemaCache: Send + Sync {
    /// Return the cached schemas if present and not expired.
    fn get(&self, key: &SchemaCacheKey) -> Option<Vec<SchemaMetadata>>;

    /// Replace the entry for this key.
    fn put(&self, key: SchemaCacheKey, schemas: Vec<SchemaMetadata>);
}

/// In-memory TTL cache.
pub struct MemorySchemaCache {
    ttl: Duration,
    entries: RwLock<HashMap<SchemaCacheKey, (Instant, Vec<SchemaMetadata>)>>,
}

impl MemorySchemaCache {
    /// Cache with the standard five-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(SCHEMA_CACHE_TTL)
    }

    /// Cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCache for MemorySchemaCache {
    fn get(&self, key: &SchemaCacheKey) -> Option<Vec<SchemaMetadata>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((stored_at, schemas)) if stored_at.elapsed() < self.ttl => {
                debug!(dialect = key.dialect, host = %key.host, "schema cache hit");
                Some(schemas.clone())
            }
            _ => None,
        }
    }

    fn put(&self, key: SchemaCacheKey, schemas: Vec<SchemaMetadata>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, (Instant::now(), schemas));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SchemaMetadata;

    fn key() -> SchemaCacheKey {
        SchemaCacheKey {
            dialect: "postgres",
            host: "localhost".to_string(),
            port: 5432,
            database: "field_data".to_string(),
        }
    }

    fn schemas() -> Vec<SchemaMetadata> {
        vec![SchemaMetadata::named("public")]
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = MemorySchemaCache::new();
        cache.put(key(), schemas());
        assert_eq!(cache.get(&key()), Some(schemas()));
    }

    #[test]
    fn test_miss_after_expiry() {
        let cache = MemorySchemaCache::with_ttl(Duration::from_millis(10));
        cache.put(key(), schemas());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&key()), None);
    }

    #[test]
    fn test_distinct_databases_do_not_collide() {
        let cache = MemorySchemaCache::new();
        cache.put(key(), schemas());

        let mut other = key();
        other.database = "other_db".to_string();
        assert_eq!(cache.get(&other), None);
    }

    #[test]
    fn test_put_replaces_entry() {
        let cache = MemorySchemaCache::new();
        cache.put(key(), schemas());
        cache.put(key(), vec![SchemaMetadata::named("reporting")]);
        let got = cache.get(&key()).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "reporting");
    }

    #[test]
    fn test_sqlite_key_uses_file_path() {
        let cfg = SqlConnectionConfig {
            file_path: Some("/tmp/app.db".to_string()),
            ..Default::default()
        };
        let k = SchemaCacheKey::for_connection(ConnectorKind::Sqlite, &cfg);
        assert_eq!(k.database, "/tmp/app.db");
        assert_eq!(k.dialect, "sqlite");
    }
}
