//! OD-007: SQLite session — connection plus an open transaction.

use super::ManagedResource;
use crate::core::error::ResourceError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// A connection with a transaction opened at acquisition.
#[derive(Debug)]
pub struct SqlSession {
    conn: Connection,
    path: PathBuf,
    open: bool,
}

impl SqlSession {
    /// Open the database file and start a deferred transaction.
    pub fn begin(path: &Path) -> Result<Self, ResourceError> {
        let conn = Connection::open(path).map_err(|source| ResourceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::begin_on(conn, path.to_path_buf())
    }

    /// Start a transaction on an in-memory database.
    pub fn in_memory() -> Result<Self, ResourceError> {
        let conn = Connection::open_in_memory().map_err(|source| ResourceError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Self::begin_on(conn, PathBuf::from(":memory:"))
    }

    fn begin_on(conn: Connection, path: PathBuf) -> Result<Self, ResourceError> {
        conn.execute_batch("BEGIN")
            .map_err(|source| ResourceError::Transaction {
                action: "begin",
                resource: path.display().to_string(),
                source,
            })?;
        tracing::debug!(db = %path.display(), "sql session opened");
        Ok(Self {
            conn,
            path,
            open: true,
        })
    }

    fn finish(&mut self, action: &'static str, sql: &str) -> Result<(), ResourceError> {
        if !self.open {
            return Ok(());
        }
        self.conn
            .execute_batch(sql)
            .map_err(|source| ResourceError::Transaction {
                action,
                resource: self.describe(),
                source,
            })?;
        self.open = false;
        Ok(())
    }
}

impl ManagedResource for SqlSession {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn is_transactional(&self) -> bool {
        true
    }

    fn commit(&mut self) -> Result<(), ResourceError> {
        self.finish("commit", "COMMIT")?;
        tracing::debug!(resource = %self.describe(), "committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ResourceError> {
        self.finish("rollback", "ROLLBACK")?;
        tracing::debug!(resource = %self.describe(), "rolled back");
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), ResourceError> {
        let resource = self.describe();
        // An unfinished transaction is rolled back by SQLite on close.
        self.conn
            .close()
            .map_err(|(_, e)| ResourceError::Release {
                resource,
                message: e.to_string(),
            })
    }

    fn connection(&self) -> Option<&Connection> {
        Some(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(path: &Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap()
    }

    fn seed(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
    }

    #[test]
    fn test_od007_commit_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("t.db");
        seed(&db);
        let mut s = SqlSession::begin(&db).unwrap();
        s.connection()
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();
        s.commit().unwrap();
        Box::new(s).release().unwrap();
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_od007_rollback_discards() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("t.db");
        seed(&db);
        let mut s = SqlSession::begin(&db).unwrap();
        s.connection()
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();
        s.rollback().unwrap();
        Box::new(s).release().unwrap();
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_od007_release_without_commit_discards() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("t.db");
        seed(&db);
        let s = SqlSession::begin(&db).unwrap();
        s.connection()
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();
        Box::new(s).release().unwrap();
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_od007_double_commit_is_noop() {
        let mut s = SqlSession::in_memory().unwrap();
        s.commit().unwrap();
        s.commit().unwrap();
        s.rollback().unwrap();
    }

    #[test]
    fn test_od007_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("missing-dir").join("x.db");
        assert!(matches!(
            SqlSession::begin(&bad),
            Err(ResourceError::Open { .. })
        ));
    }
}
