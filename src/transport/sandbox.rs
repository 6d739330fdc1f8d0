//! OD-020: Restricted validation — parse, then compile every script without running it.

use super::DefinitionValidator;
use crate::core::config::AppConfig;
use crate::core::parser::parse_definition;
use crate::core::script;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;

/// Compiles script operations against a read-only view of the configured
/// database, or against an empty in-memory database when there is none.
///
/// Unknown-table and unknown-column errors are tolerated without a real
/// schema, or when the script creates schema of its own; anything else
/// still fails validation.
#[derive(Debug, Clone, Default)]
pub struct SandboxValidator {
    database: Option<PathBuf>,
}

impl SandboxValidator {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Use the configured database if it exists.
    pub fn for_config(config: &AppConfig) -> Self {
        let path = config.database_path();
        Self {
            database: path.exists().then_some(path),
        }
    }

    fn connect(&self) -> Result<(Connection, bool), String> {
        match &self.database {
            Some(path) => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|e| format!("cannot open {} read-only: {}", path.display(), e))?;
                Ok((conn, true))
            }
            None => Connection::open_in_memory()
                .map(|c| (c, false))
                .map_err(|e| format!("cannot open scratch database: {}", e)),
        }
    }
}

fn is_schema_error(message: &str) -> bool {
    message.contains("no such table") || message.contains("no such column")
}

/// Statements after a `CREATE` cannot be prepared until it has run.
fn creates_schema(body: &str) -> bool {
    body.to_ascii_uppercase().contains("CREATE ")
}

impl DefinitionValidator for SandboxValidator {
    fn validate(&self, candidate: &str) -> Result<(), String> {
        let definition = parse_definition(candidate).map_err(|e| e.to_string())?;
        let (conn, schema_known) = self.connect()?;
        for op in &definition.operations {
            if let Err(e) = script::compile(&conn, op) {
                let message = format!("{:#}", e);
                let tolerated = !schema_known || creates_schema(&op.body);
                if tolerated && is_schema_error(&message) {
                    tracing::debug!(operation = %op.spec.name, %message, "schema unavailable, skipping rest of body");
                    continue;
                }
                return Err(message);
            }
        }
        tracing::debug!(operations = definition.operations.len(), "definition validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::definition_template;

    fn with_op(op: &str, binding: &str) -> String {
        definition_template()
            .replacen("-- opdeck:dispatch-begin", &format!("{}\n-- opdeck:dispatch-begin", op), 1)
            .replacen("-- opdeck:dispatch-end", &format!("{}\n-- opdeck:dispatch-end", binding), 1)
    }

    #[test]
    fn test_od020_sandbox_accepts_template() {
        assert!(SandboxValidator::in_memory()
            .validate(&definition_template())
            .is_ok());
    }

    #[test]
    fn test_od020_sandbox_tolerates_unknown_schema_in_memory() {
        let text = with_op(
            "fn orders(cursor, record_id) {\n    SELECT id FROM orders WHERE customer = :record_id;\n}\n",
            "binding orders {\n    record_id: text\n}\n",
        );
        assert!(SandboxValidator::in_memory().validate(&text).is_ok());
    }

    #[test]
    fn test_od020_sandbox_rejects_syntax_errors() {
        let text = with_op(
            "fn broken(a) {\n    SELEC :a;\n}\n",
            "binding broken {\n    a: text\n}\n",
        );
        let err = SandboxValidator::in_memory().validate(&text).unwrap_err();
        assert!(err.contains("broken"));
    }

    #[test]
    fn test_od020_sandbox_rejects_bad_placeholders() {
        let text = with_op(
            "fn f(a) {\n    SELECT :nope;\n}\n",
            "binding f {\n    a: text\n}\n",
        );
        assert!(SandboxValidator::in_memory().validate(&text).is_err());
    }

    #[test]
    fn test_od020_sandbox_rejects_structural_problems() {
        let err = SandboxValidator::in_memory().validate("fn f() { SELECT 1; }").unwrap_err();
        assert!(err.contains("marker"));
    }

    #[test]
    fn test_od020_sandbox_uses_real_schema_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("opdeck.db");
        Connection::open(&db)
            .unwrap()
            .execute_batch("CREATE TABLE orders (id INTEGER, customer TEXT)")
            .unwrap();
        let config = AppConfig {
            base_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let validator = SandboxValidator::for_config(&config);

        let good = with_op(
            "fn orders(cursor, record_id) {\n    DELETE FROM orders WHERE customer = :record_id;\n}\n",
            "binding orders {\n    record_id: text\n}\n",
        );
        assert!(validator.validate(&good).is_ok());
        let rows: i64 = Connection::open(&db)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);

        let bad = with_op(
            "fn totals(cursor) {\n    SELECT total FROM invoices;\n}\n",
            "binding totals {\n}\n",
        );
        assert!(validator.validate(&bad).unwrap_err().contains("no such table"));

        let creates = with_op(
            "fn notes(cursor, note) {\n    CREATE TABLE notes (body TEXT);\n    INSERT INTO notes VALUES (:note);\n}\n",
            "binding notes {\n    note: text\n}\n",
        );
        assert!(validator.validate(&creates).is_ok());
    }
}
