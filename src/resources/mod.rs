//! Managed resources — handles acquired for one invocation and released after it.
//!
//! Each resource-typed parameter gets exactly one resource per invocation:
//! 1. a SQL session (transactional: commit on success, rollback on failure)
//! 2. a document collection (no transaction semantics)
//!
//! Bulk-data ingestion lives here too since it is the other non-prompt input path.

pub mod document;
pub mod ingest;
pub mod sql;
#[cfg(test)]
pub(crate) mod testing;

use crate::core::config::AppConfig;
use crate::core::error::ResourceError;
use document::{Collection, DocumentStore};
use rusqlite::Connection;

/// An acquired handle with an explicit commit/rollback/release contract.
///
/// `release` consumes the resource, so a handle cannot be released twice.
pub trait ManagedResource {
    /// Short description for logs and errors.
    fn describe(&self) -> String;

    fn is_transactional(&self) -> bool {
        false
    }

    fn commit(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), ResourceError>;

    /// Database connection, for cursor-like resources.
    fn connection(&self) -> Option<&Connection> {
        None
    }
}

/// Source of resources for the parameter resolver.
pub trait ResourceProvider {
    fn open_cursor(&self) -> Result<Box<dyn ManagedResource>, ResourceError>;

    fn open_collection(&self) -> Result<Collection, ResourceError>;
}

/// Release every resource once, in acquisition order. Failures are logged,
/// not returned; the count of failed releases is.
pub fn release_all(resources: Vec<Box<dyn ManagedResource>>) -> usize {
    let mut failed = 0;
    for resource in resources {
        let name = resource.describe();
        match resource.release() {
            Ok(()) => tracing::debug!(resource = %name, "released"),
            Err(e) => {
                failed += 1;
                tracing::warn!(resource = %name, error = %e, "release failed");
            }
        }
    }
    failed
}

/// Resources described by the persisted configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredResources {
    config: AppConfig,
}

impl ConfiguredResources {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl ResourceProvider for ConfiguredResources {
    fn open_cursor(&self) -> Result<Box<dyn ManagedResource>, ResourceError> {
        if !self.config.database.driver.eq_ignore_ascii_case("sqlite") {
            return Err(ResourceError::UnsupportedDriver(
                self.config.database.driver.clone(),
            ));
        }
        let session = sql::SqlSession::begin(&self.config.database_path())?;
        Ok(Box::new(session))
    }

    fn open_collection(&self) -> Result<Collection, ResourceError> {
        DocumentStore::open(&self.config.document_dir())?
            .collection(&self.config.documents.collection)
    }
}
