//! Test doubles: resources and providers that record every lifecycle call.

use super::document::{Collection, DocumentStore};
use super::{ManagedResource, ResourceProvider};
use crate::core::error::ResourceError;
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared record of `"<action> #<id>"` entries.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries starting with `action`.
    pub fn count(&self, action: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.split(' ').next() == Some(action))
            .count()
    }

    pub fn count_for(&self, action: &str, id: usize) -> usize {
        let wanted = format!("{} #{}", action, id);
        self.entries().iter().filter(|e| **e == wanted).count()
    }
}

/// Transactional resource backed by an in-memory connection.
pub struct TrackedResource {
    id: usize,
    log: Log,
    conn: Connection,
    fail_commit: bool,
    fail_release: bool,
}

impl TrackedResource {
    pub fn new(id: usize, log: &Log) -> Self {
        log.push(format!("open #{}", id));
        Self {
            id,
            log: log.clone(),
            conn: Connection::open_in_memory().unwrap(),
            fail_commit: false,
            fail_release: false,
        }
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

impl ManagedResource for TrackedResource {
    fn describe(&self) -> String {
        format!("tracked #{}", self.id)
    }

    fn is_transactional(&self) -> bool {
        true
    }

    fn commit(&mut self) -> Result<(), ResourceError> {
        self.log.push(format!("commit #{}", self.id));
        if self.fail_commit {
            return Err(ResourceError::Transaction {
                action: "commit",
                resource: self.describe(),
                source: rusqlite::Error::InvalidQuery,
            });
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ResourceError> {
        self.log.push(format!("rollback #{}", self.id));
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), ResourceError> {
        self.log.push(format!("release #{}", self.id));
        if self.fail_release {
            return Err(ResourceError::Release {
                resource: self.describe(),
                message: "close refused".to_string(),
            });
        }
        Ok(())
    }

    fn connection(&self) -> Option<&Connection> {
        Some(&self.conn)
    }
}

/// Provider handing out [`TrackedResource`]s, optionally failing the nth cursor.
pub struct FakeProvider {
    pub log: Log,
    opened: AtomicUsize,
    fail_cursor_at: Option<usize>,
    fail_commit_at: Option<usize>,
    store: tempfile::TempDir,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            log: Log::default(),
            opened: AtomicUsize::new(0),
            fail_cursor_at: None,
            fail_commit_at: None,
            store: tempfile::tempdir().unwrap(),
        }
    }

    /// The nth cursor (1-based) fails to open.
    pub fn failing_cursor(mut self, nth: usize) -> Self {
        self.fail_cursor_at = Some(nth);
        self
    }

    /// The nth cursor (1-based) fails to commit.
    pub fn failing_commit(mut self, nth: usize) -> Self {
        self.fail_commit_at = Some(nth);
        self
    }
}

impl ResourceProvider for FakeProvider {
    fn open_cursor(&self) -> Result<Box<dyn ManagedResource>, ResourceError> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_cursor_at == Some(id) {
            return Err(ResourceError::UnsupportedDriver(format!("fake #{}", id)));
        }
        let mut resource = TrackedResource::new(id, &self.log);
        if self.fail_commit_at == Some(id) {
            resource = resource.failing_commit();
        }
        Ok(Box::new(resource))
    }

    fn open_collection(&self) -> Result<Collection, ResourceError> {
        DocumentStore::open(self.store.path())?.collection("records")
    }
}
