use std::path::PathBuf;

use rusqlite::Connection;

/// Caller-supplied table definitions for one cache database.
///
/// The core creates no tables of its own; each per-network cache injects its
/// DDL through this trait when opening a [`crate::Database`].
///
/// `create_tables` must be idempotent (`CREATE TABLE IF NOT EXISTS ...`): it
/// runs on every open, not only after a version bump, so a fresh file and a
/// file already at the required version both end up with the full schema.
/// `drop_tables` runs only when the stored schema version is below the
/// required one.
pub trait SchemaDefinition {
    fn create_tables(&self, conn: &Connection) -> rusqlite::Result<()>;
    fn drop_tables(&self, conn: &Connection) -> rusqlite::Result<()>;
}

/// Where per-service databases live.
///
/// The default root is the platform data directory; tests and embedders
/// override it with an explicit path.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl StorageConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().join("feedcache"))
            .unwrap_or_else(|| PathBuf::from(".feedcache"));
        Self { root }
    }
}

/// Deterministic on-disk location for one `(service, data_type)` database:
/// `<root>/<service>/<data_type>/<file_name>`.
pub fn database_path(
    config: &StorageConfig,
    service: &str,
    data_type: &str,
    file_name: &str,
) -> PathBuf {
    config.root.join(service).join(data_type).join(file_name)
}

/// Read the schema version stored in the file (`PRAGMA user_version`).
pub(crate) fn read_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map(|version| u32::try_from(version).unwrap_or(0))
}

pub(crate) fn write_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", i64::from(version))
}
