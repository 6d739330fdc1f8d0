//! OD-004: Operation registry — discovery order, display labels, lookup.
//!
//! Built-in operations are registered first, in catalog order, followed by the
//! script operations of the application definition in file order. The order is
//! therefore stable across runs.

use super::builtin;
use super::error::{Error, Result};
use super::operation::Operation;
use super::parser::Definition;
use super::script::ScriptOperation;
use super::types::PromptBinding;
use std::sync::Arc;

/// Derive the human-readable label for an internal operation name.
///
/// Underscores become spaces, each word is title-cased (a letter following a
/// non-letter is upper-cased, all other letters lower-cased), then the
/// acronym rules apply: `Sql`→`SQL`, `Mongo Db`→`MongoDB`, `Db`→`DB`.
pub fn display_label(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut titled = String::with_capacity(spaced.len());
    let mut prev_letter = false;
    for ch in spaced.chars() {
        if ch.is_alphabetic() {
            if prev_letter {
                titled.extend(ch.to_lowercase());
            } else {
                titled.extend(ch.to_uppercase());
            }
            prev_letter = true;
        } else {
            titled.push(ch);
            prev_letter = false;
        }
    }
    titled
        .replace("Sql", "SQL")
        .replace("Mongo Db", "MongoDB")
        .replace("Db", "DB")
}

/// A registered operation with its label and optional prompt binding.
#[derive(Clone)]
pub struct Entry {
    pub label: String,
    pub operation: Arc<dyn Operation>,
    pub binding: Option<PromptBinding>,
}

impl Entry {
    pub fn name(&self) -> &str {
        self.operation.name()
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("label", &self.label)
            .field("name", &self.name())
            .field("binding", &self.binding)
            .finish()
    }
}

/// Ordered table of known operations.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the built-in catalog.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for op in builtin::catalog() {
            registry.register(op, None)?;
        }
        Ok(registry)
    }

    /// Built-ins followed by every script operation of `definition`.
    pub fn load(definition: &Definition) -> Result<Self> {
        let mut registry = Self::with_builtins()?;
        for script in &definition.operations {
            let binding = definition.binding_for(&script.spec.name).cloned();
            registry.register(Arc::new(ScriptOperation::new(script.clone())), binding)?;
        }
        tracing::debug!(count = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Register an operation. Two names deriving the same label is an error.
    pub fn register(
        &mut self,
        operation: Arc<dyn Operation>,
        binding: Option<PromptBinding>,
    ) -> Result<()> {
        let label = display_label(operation.name());
        if let Some(existing) = self.entries.iter().find(|e| e.label == label) {
            return Err(Error::LabelCollision {
                label,
                first: existing.name().to_string(),
                second: operation.name().to_string(),
            });
        }
        self.entries.push(Entry {
            label,
            operation,
            binding,
        });
        Ok(())
    }

    /// `(internal_name, display_label)` in registration order.
    pub fn list_operations(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (e.name().to_string(), e.label.clone()))
            .collect()
    }

    pub fn resolve(&self, label: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .ok_or_else(|| Error::NotFound(label.to_string()))
    }

    /// Lookup by internal name; falls back to label lookup.
    pub fn resolve_name(&self, name: &str) -> Result<&Entry> {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .map(Ok)
            .unwrap_or_else(|| self.resolve(name))
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.entries.iter().any(|e| e.label == label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::NativeOperation;
    use crate::core::parser::parse_definition;
    use crate::core::types::OperationSpec;
    use proptest::prelude::*;

    fn noop(_: &mut crate::core::operation::Call<'_>) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    fn native(name: &str) -> Arc<dyn Operation> {
        Arc::new(NativeOperation::new(OperationSpec::builder(name).build(), noop))
    }

    #[test]
    fn test_od004_label_acronyms() {
        assert_eq!(display_label("list_sql_tables"), "List SQL Tables");
        assert_eq!(display_label("count_mongo_db_documents"), "Count MongoDB Documents");
        assert_eq!(display_label("db_stats"), "DB Stats");
        assert_eq!(display_label("export_db"), "Export DB");
    }

    #[test]
    fn test_od004_label_title_case() {
        assert_eq!(display_label("getURL"), "Geturl");
        assert_eq!(display_label("add_2d_points"), "Add 2D Points");
        assert_eq!(display_label("plain"), "Plain");
    }

    #[test]
    fn test_od004_label_casing_collides() {
        assert_eq!(display_label("SQL_dump"), display_label("sql_dump"));
    }

    #[test]
    fn test_od004_register_collision() {
        let mut r = Registry::new();
        r.register(native("sql_dump"), None).unwrap();
        let err = r.register(native("SQL_dump"), None).unwrap_err();
        assert!(matches!(err, Error::LabelCollision { .. }));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_od004_resolve_unknown() {
        let r = Registry::with_builtins().unwrap();
        assert!(matches!(r.resolve("Launch Rockets"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_od004_builtins_listed_in_catalog_order() {
        let r = Registry::with_builtins().unwrap();
        let ops = r.list_operations();
        assert_eq!(ops[0], ("list_sql_tables".to_string(), "List SQL Tables".to_string()));
        assert!(ops.iter().any(|(_, l)| l == "Count MongoDB Documents"));
    }

    #[test]
    fn test_od004_load_appends_definition_in_file_order() {
        let text = "\
fn zeta(a: int) {
    SELECT :a;
}

fn alpha(b) {
    SELECT :b;
}

-- opdeck:dispatch-begin
binding zeta {
    a: stepper
}
binding alpha {
    b: text
}
-- opdeck:dispatch-end
";
        let def = parse_definition(text).unwrap();
        let r = Registry::load(&def).unwrap();
        let ops = r.list_operations();
        let n = ops.len();
        assert_eq!(ops[n - 2].0, "zeta");
        assert_eq!(ops[n - 1].0, "alpha");
        let entry = r.resolve("Zeta").unwrap();
        assert!(entry.binding.is_some());
        assert_eq!(r.resolve_name("alpha").unwrap().label, "Alpha");
    }

    #[test]
    fn test_od004_listing_is_stable() {
        let a = Registry::with_builtins().unwrap().list_operations();
        let b = Registry::with_builtins().unwrap().list_operations();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_od004_label_is_deterministic(name in "[a-z_][a-z0-9_]{0,24}") {
            prop_assert_eq!(display_label(&name), display_label(&name));
        }

        #[test]
        fn prop_od004_label_has_no_underscores(name in "[A-Za-z_][A-Za-z0-9_]{0,24}") {
            prop_assert!(!display_label(&name).contains('_'));
        }
    }
}
