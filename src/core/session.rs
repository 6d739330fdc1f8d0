//! OD-016: Operator session — select, bind, execute, render, journal.
//!
//! One request/response cycle per call. Nothing is shared between cycles
//! except the registry, which is read-only here.

use super::error::{Error, Result};
use super::executor::execute;
use super::registry::Registry;
use super::resolver::{bind_parameters, Environment};
use super::types::{AuditEvent, Rendered};
use crate::audit::eventlog;
use crate::prompt::Notice;
use std::path::Path;

/// Runs registered operations against an environment.
pub struct Session<'a> {
    registry: &'a Registry,
    state_dir: &'a Path,
}

impl<'a> Session<'a> {
    pub fn new(registry: &'a Registry, state_dir: &'a Path) -> Self {
        Self {
            registry,
            state_dir,
        }
    }

    /// Run the operation with display label `label`, rendering the outcome
    /// through the environment's prompter.
    pub fn run(&self, label: &str, env: &mut Environment<'_>) -> Result<Rendered> {
        let entry = self.registry.resolve(label)?;
        let name = entry.name().to_string();
        let run_id = eventlog::generate_run_id();
        eventlog::record(
            self.state_dir,
            AuditEvent::ExecutionStarted {
                run_id: run_id.clone(),
                operation: name.clone(),
            },
        );

        let resolved = match bind_parameters(entry.operation.spec(), entry.binding.as_ref(), env) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(env, &run_id, &name, e, 0)),
        };
        let transactional = resolved
            .resources
            .iter()
            .filter(|r| r.is_transactional())
            .count() as u32;

        match execute(entry.operation.as_ref(), resolved) {
            Ok(done) => {
                match &done.rendered {
                    Rendered::Table(table) => env.prompter.table(table)?,
                    Rendered::Text(text) => env.prompter.notice(Notice::Success(text.clone()))?,
                }
                eventlog::record(
                    self.state_dir,
                    AuditEvent::ExecutionSucceeded {
                        run_id,
                        operation: name,
                        result: done.rendered.kind().to_string(),
                        committed: done.committed,
                        duration_seconds: done.duration.as_secs_f64(),
                    },
                );
                Ok(done.rendered)
            }
            Err(e) => {
                let rolled_back = match e {
                    Error::Execution { .. } => transactional,
                    Error::CommitFailed { rolled_back, .. } => rolled_back,
                    _ => 0,
                };
                Err(self.fail(env, &run_id, &name, e, rolled_back))
            }
        }
    }

    fn fail(
        &self,
        env: &mut Environment<'_>,
        run_id: &str,
        name: &str,
        error: Error,
        rolled_back: u32,
    ) -> Error {
        let message = match &error {
            Error::Execution { cause, .. } => format!("Error: {}", cause),
            other => format!("Error: {}", other),
        };
        if let Err(e) = env.prompter.notice(Notice::Error(message)) {
            tracing::warn!(error = %e, "cannot display error notice");
        }
        eventlog::record(
            self.state_dir,
            AuditEvent::ExecutionFailed {
                run_id: run_id.to_string(),
                operation: name.to_string(),
                error: error.to_string(),
                rolled_back,
            },
        );
        error
    }
}
