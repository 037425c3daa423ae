use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params_from_iter, Connection};
use thiserror::Error;
use uuid::Uuid;

use crate::batch::{plan_write, EntrySet, WriteMode};
use crate::lock::CrossProcessLock;
use crate::schema::{self, database_path, SchemaDefinition, StorageConfig};
use crate::value::{Row, Value};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database handle is not valid")]
    InvalidHandle,
    #[error("cross-process lock acquisition failed for {0}")]
    LockFailed(PathBuf),
    #[error("malformed batch: {0}")]
    MalformedBatch(&'static str),
    #[error("{0}")]
    TransactionState(&'static str),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Handle to one per-service cache database.
///
/// Created once per cache instance and kept for the life of the process.
/// Opening never panics and never returns early: a handle whose
/// initialization failed is permanently invalid and rejects every operation
/// cheaply, without touching the disk again. Callers gate on
/// [`is_valid`](Self::is_valid).
///
/// The handle is `Send` but not `Sync` (it wraps a rusqlite connection); the
/// expected owner is a single background worker thread. Dropping the handle
/// mid-transaction closes the connection without committing; SQLite rolls
/// the transaction back and the lock file descriptor is released.
pub struct Database {
    conn: Option<Connection>,
    lock: CrossProcessLock,
    path: PathBuf,
    instance: Uuid,
    in_transaction: bool,
}

impl Database {
    /// Open (creating if absent) and migrate the database for
    /// `(service, data_type)` at its deterministic path under the config
    /// root.
    ///
    /// If the stored schema version is below `required_version`, the
    /// caller's `drop_tables` runs first; `create_tables` runs on every open.
    /// Any failure along the way leaves the handle invalid. The file is
    /// deliberately left on disk in that case: deleting a possibly-corrupt
    /// database is the operator's call, not ours.
    pub fn open(
        config: &StorageConfig,
        service: &str,
        data_type: &str,
        file_name: &str,
        required_version: u32,
        schema_def: &dyn SchemaDefinition,
    ) -> Database {
        let path = database_path(config, service, data_type, file_name);
        let instance = Uuid::new_v4();
        let conn = match Self::initialize(&path, required_version, schema_def) {
            Ok(conn) => {
                tracing::debug!(%instance, path = %path.display(), "cache database opened");
                Some(conn)
            }
            Err(err) => {
                tracing::error!(%instance, path = %path.display(), %err, "cache database initialization failed");
                None
            }
        };
        Database {
            lock: CrossProcessLock::new(&path),
            conn,
            path,
            instance,
            in_transaction: false,
        }
    }

    fn initialize(
        path: &Path,
        required_version: u32,
        schema_def: &dyn SchemaDefinition,
    ) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // WAL keeps readers unblocked while a worker holds the write
        // transaction; the cross-process lock only serializes writers.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // An unreadable version is treated as 0, i.e. always too low.
        let stored = schema::read_version(&conn).unwrap_or(0);
        if stored < required_version {
            tracing::debug!(stored, required_version, "schema below required version, recreating tables");
            schema_def.drop_tables(&conn)?;
        }
        schema_def.create_tables(&conn)?;
        schema::write_version(&conn, required_version)?;
        Ok(conn)
    }

    pub fn is_valid(&self) -> bool {
        self.conn.is_some()
    }

    /// Resolved on-disk path of this database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Process-unique id distinguishing handles to the same file in logs.
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Schema version currently stored in the file.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        schema::read_version(conn).map_err(Into::into)
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(StorageError::InvalidHandle)
    }

    /// Take the cross-process lock, then open an immediate transaction.
    ///
    /// The lock is held until the matching [`commit_transaction`] or
    /// [`rollback_transaction`], across arbitrarily many [`write`] calls, so
    /// a whole logical batch (e.g. "replace all posts for one account"
    /// spanning several tables) is serialized against other processes.
    ///
    /// [`commit_transaction`]: Self::commit_transaction
    /// [`rollback_transaction`]: Self::rollback_transaction
    /// [`write`]: Self::write
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(StorageError::TransactionState("transaction already in progress"));
        }
        let Some(conn) = self.conn.as_ref() else {
            return Err(StorageError::InvalidHandle);
        };
        if !self.lock.lock() {
            return Err(StorageError::LockFailed(self.path.clone()));
        }
        if let Err(err) = conn.execute_batch("BEGIN IMMEDIATE TRANSACTION") {
            // The lock must not outlive a failed BEGIN.
            self.lock.unlock();
            return Err(err.into());
        }
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. The lock is released afterward whether
    /// or not the COMMIT itself succeeded.
    pub fn commit_transaction(&mut self) -> Result<()> {
        self.end_transaction("COMMIT")
    }

    /// Roll the open transaction back, releasing the lock afterward.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        self.end_transaction("ROLLBACK")
    }

    fn end_transaction(&mut self, sql: &str) -> Result<()> {
        if !self.in_transaction {
            return Err(StorageError::TransactionState("no transaction in progress"));
        }
        let result = match self.conn.as_ref() {
            Some(conn) => conn.execute_batch(sql).map_err(StorageError::from),
            None => Err(StorageError::InvalidHandle),
        };
        self.in_transaction = false;
        self.lock.unlock();
        if let Err(err) = &result {
            tracing::error!(instance = %self.instance, sql, %err, "failed to end transaction");
        }
        result
    }

    /// Execute one batched write: the statement is prepared once and
    /// executed per logical row of `entries`.
    ///
    /// Precondition violations reject the whole call before any SQL runs;
    /// an execution failure aborts the remaining rows and surfaces the
    /// error. Rolling back the enclosing transaction is the caller's
    /// decision; this method never retries and never rolls back on its own.
    pub fn write(
        &self,
        table: &str,
        keys: &[&str],
        entries: &EntrySet,
        mode: WriteMode<'_>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let Some(plan) = plan_write(table, keys, entries, mode)? else {
            return Ok(());
        };
        let mut stmt = conn.prepare(&plan.sql).map_err(|err| {
            tracing::error!(instance = %self.instance, sql = %plan.sql, %err, "statement preparation failed");
            StorageError::from(err)
        })?;
        for index in 0..plan.rows {
            let row_params = plan.bind_lists.iter().map(|list| &list[index]);
            if let Err(err) = stmt.execute(params_from_iter(row_params)) {
                tracing::error!(instance = %self.instance, table, row = index, %err, "batched write failed");
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Run a read query, materializing every result row as an ordered
    /// column → value mapping.
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(sql_row) = rows.next()? {
            let mut row = Row::with_capacity(column_names.len());
            for (index, name) in column_names.iter().enumerate() {
                row.set(name.clone(), sql_row.get::<_, Value>(index)?);
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Execute a single non-batched statement (maintenance, ad-hoc DDL).
    /// Returns the number of affected rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute(sql, params_from_iter(params.iter()))
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSchema;

    impl SchemaDefinition for BrokenSchema {
        fn create_tables(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch("CREATE TABLE syntax error (")
        }

        fn drop_tables(&self, _conn: &Connection) -> rusqlite::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_initialization_leaves_an_invalid_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig::with_root(dir.path());
        let mut db = Database::open(&config, "facebook", "posts", "posts.db", 1, &BrokenSchema);

        assert!(!db.is_valid());
        assert!(matches!(db.schema_version(), Err(StorageError::InvalidHandle)));
        assert!(matches!(
            db.query_rows("SELECT 1", &[]),
            Err(StorageError::InvalidHandle)
        ));
        assert!(matches!(db.begin_transaction(), Err(StorageError::InvalidHandle)));

        let mut entries = EntrySet::new();
        entries.push("id", "p1");
        assert!(matches!(
            db.write("posts", &["id"], &entries, WriteMode::Insert),
            Err(StorageError::InvalidHandle)
        ));

        // The file itself stays on disk for inspection.
        assert!(db.path().exists());
    }

    #[test]
    fn transaction_misuse_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig::with_root(dir.path());

        struct NoTables;
        impl SchemaDefinition for NoTables {
            fn create_tables(&self, _conn: &Connection) -> rusqlite::Result<()> {
                Ok(())
            }
            fn drop_tables(&self, _conn: &Connection) -> rusqlite::Result<()> {
                Ok(())
            }
        }

        let mut db = Database::open(&config, "twitter", "posts", "posts.db", 1, &NoTables);
        assert!(db.is_valid());
        assert!(matches!(
            db.commit_transaction(),
            Err(StorageError::TransactionState(_))
        ));
        db.begin_transaction().expect("begin");
        assert!(matches!(
            db.begin_transaction(),
            Err(StorageError::TransactionState(_))
        ));
        db.rollback_transaction().expect("rollback");
    }
}
