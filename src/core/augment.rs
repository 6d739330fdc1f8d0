//! OD-011: Code augmentation — parse, check name, synthesize binding, persist.
//!
//! The whole read-modify-write cycle runs under an in-process mutex and the
//! definition's lock file. A failure at any step leaves the persisted
//! definition untouched.

use super::codegen::{render_binding, render_operation, synthesize_binding};
use super::error::{Error, Result};
use super::parser::{locate_anchors, parse_definition, parse_operation};
use super::registry::{display_label, Registry};
use super::state::{atomic_write, load_definition, DefinitionLock};
use super::types::{AuditEvent, PromptBinding};
use crate::audit::{eventlog, hasher};
use crate::transport::DefinitionValidator;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

static WRITER: Mutex<()> = Mutex::new(());

/// Outcome of a successful augmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub name: String,
    pub label: String,
    pub binding: PromptBinding,
}

/// Adds script operations to an application definition.
pub struct Augmenter {
    definition: PathBuf,
    state_dir: PathBuf,
    validator: Box<dyn DefinitionValidator>,
    lock_timeout: Duration,
}

impl Augmenter {
    pub fn new(
        definition: &Path,
        state_dir: &Path,
        validator: Box<dyn DefinitionValidator>,
    ) -> Self {
        Self {
            definition: definition.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
            validator,
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Add the operation in `source` and persist it with its generated binding.
    pub fn add_operation(&self, source: &str) -> Result<Added> {
        let outcome = {
            let _guard = WRITER.lock().unwrap_or_else(|p| p.into_inner());
            DefinitionLock::acquire(&self.definition, self.lock_timeout)
                .and_then(|_lock| self.splice_and_persist(source))
        };
        match outcome {
            Ok((added, before, after)) => {
                tracing::info!(name = %added.name, label = %added.label, "operation added");
                eventlog::record(
                    &self.state_dir,
                    AuditEvent::OperationAdded {
                        name: added.name.clone(),
                        label: added.label.clone(),
                        params: added.binding.fields.len(),
                        definition_before: before,
                        definition_after: after,
                    },
                );
                Ok(added)
            }
            Err(e) => {
                tracing::warn!(error = %e, "augmentation rejected");
                eventlog::record(
                    &self.state_dir,
                    AuditEvent::AugmentationRejected {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Returns the result plus BLAKE3 hashes of the definition before and after.
    fn splice_and_persist(&self, source: &str) -> Result<(Added, String, String)> {
        let submitted = parse_operation(source)?;
        let name = submitted.spec.name.clone();
        let label = display_label(&name);
        tracing::debug!(%name, %label, "submission parsed");

        let current_text = load_definition(&self.definition)?;
        let current = parse_definition(&current_text)?;
        let registry = Registry::load(&current)?;
        if registry.contains_label(&label) {
            return Err(Error::DuplicateOperation { name, label });
        }

        let binding = synthesize_binding(&submitted.spec);
        let anchors = locate_anchors(&current_text)?;
        let candidate = format!(
            "{}{}\n{}{}\n{}",
            &current_text[..anchors.begin],
            render_operation(&submitted),
            &current_text[anchors.begin..anchors.end],
            render_binding(&binding),
            &current_text[anchors.end..],
        );

        let reparsed = parse_definition(&candidate)?;
        Registry::load(&reparsed)?;
        self.validator
            .validate(&candidate)
            .map_err(|reason| Error::parse(format!("validation failed: {}", reason)))?;

        atomic_write(&self.definition, &candidate)?;
        Ok((
            Added {
                name,
                label,
                binding,
            },
            hasher::hash_text(&current_text),
            hasher::hash_text(&candidate),
        ))
    }
}
