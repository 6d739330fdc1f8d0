//! OD-001: Core types — operations, parameters, prompt bindings, bound arguments.
//!
//! An operation is identified by its internal name and carries an ordered
//! parameter list. Each parameter has a declared type (used only when
//! synthesizing prompt bindings) and a kind (used by the resolver). Kinds are
//! attached at registration time; script operations derive them once from the
//! reserved parameter names.

use crate::resources::document::Collection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Parameters
// ============================================================================

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Int,
    Float,
    Str,
    /// Reserved-name parameter satisfied by the resolver, not by a prompt.
    Resource,
}

impl ParamType {
    /// Map a source annotation to a declared type. Unknown annotations fall back to `Str`.
    pub fn from_annotation(annotation: &str) -> Self {
        match annotation {
            "int" | "i64" | "integer" => Self::Int,
            "float" | "f64" | "real" => Self::Float,
            _ => Self::Str,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "str"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// How the resolver satisfies a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    DatabaseCursor,
    DocumentHandle,
    RecordId,
    BulkRows,
    Accumulator,
    FreeText,
}

impl ParamKind {
    /// Reserved parameter names and the kind they bind to.
    pub fn from_name(name: &str) -> Self {
        match name {
            "cursor" => Self::DatabaseCursor,
            "collection" => Self::DocumentHandle,
            "record_id" => Self::RecordId,
            "data" => Self::BulkRows,
            "rf" => Self::Accumulator,
            _ => Self::FreeText,
        }
    }

    /// Kinds filled from a prompt widget rather than from a resource or ingestion path.
    pub fn is_prompted(self) -> bool {
        matches!(self, Self::RecordId | Self::FreeText)
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatabaseCursor => write!(f, "database-cursor"),
            Self::DocumentHandle => write!(f, "document-handle"),
            Self::RecordId => write!(f, "record-id"),
            Self::BulkRows => write!(f, "bulk-rows"),
            Self::Accumulator => write!(f, "accumulator"),
            Self::FreeText => write!(f, "free-text"),
        }
    }
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub declared_type: ParamType,
    pub kind: ParamKind,
    pub position: usize,
}

// ============================================================================
// Operation spec
// ============================================================================

/// Name and ordered parameter list of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub params: Vec<Parameter>,
}

impl OperationSpec {
    pub fn builder(name: &str) -> OperationSpecBuilder {
        OperationSpecBuilder {
            spec: OperationSpec {
                name: name.to_string(),
                params: Vec::new(),
            },
        }
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// First parameter of the given kind, in declaration order.
    pub fn first_of_kind(&self, kind: ParamKind) -> Option<&Parameter> {
        self.params.iter().find(|p| p.kind == kind)
    }
}

/// Explicit registration of a parameter list for native operations.
pub struct OperationSpecBuilder {
    spec: OperationSpec,
}

impl OperationSpecBuilder {
    /// Add a parameter with an explicit kind and declared type.
    pub fn param(mut self, name: &str, kind: ParamKind, declared_type: ParamType) -> Self {
        let position = self.spec.params.len();
        self.spec.params.push(Parameter {
            name: name.to_string(),
            declared_type,
            kind,
            position,
        });
        self
    }

    /// Add a parameter whose kind is fixed by a resource contract.
    pub fn resource(self, name: &str, kind: ParamKind) -> Self {
        self.param(name, kind, ParamType::Resource)
    }

    /// Add a free-text parameter.
    pub fn text(self, name: &str) -> Self {
        self.param(name, ParamKind::FreeText, ParamType::Str)
    }

    pub fn build(self) -> OperationSpec {
        self.spec
    }
}

// ============================================================================
// Prompt bindings
// ============================================================================

/// Prompt widget chosen for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    /// Integer stepper, default 0, step 1.
    Stepper,
    /// Floating-point input, default 0.0.
    Number,
    /// Single-line free text.
    Text,
}

impl Widget {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Stepper => "stepper",
            Self::Number => "number",
            Self::Text => "text",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "stepper" => Some(Self::Stepper),
            "number" => Some(Self::Number),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One prompted field of a binding block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptField {
    pub param: String,
    pub widget: Widget,
}

/// Input-collection binding persisted next to a script operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBinding {
    pub operation: String,
    pub fields: Vec<PromptField>,
}

impl PromptBinding {
    pub fn widget_for(&self, param: &str) -> Option<Widget> {
        self.fields
            .iter()
            .find(|f| f.param == param)
            .map(|f| f.widget)
    }
}

// ============================================================================
// Bound arguments
// ============================================================================

/// A concrete runtime value bound to one parameter.
#[derive(Debug)]
pub enum ArgValue {
    /// Index into the invocation's managed resources.
    Cursor(usize),
    Collection(Collection),
    Text(String),
    Int(i64),
    Float(f64),
    Rows(Vec<String>),
    Accumulator(Vec<serde_json::Value>),
}

impl ArgValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Cursor(_) => "cursor",
            Self::Collection(_) => "collection",
            Self::Text(_) => "text",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Rows(_) => "rows",
            Self::Accumulator(_) => "accumulator",
        }
    }
}

/// Parameter name → bound value, in declaration order. Built fresh per invocation.
#[derive(Debug, Default)]
pub struct Binding {
    values: IndexMap<String, ArgValue>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: ArgValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArgValue> {
        self.values.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.values.iter()
    }
}

// ============================================================================
// Rendered results
// ============================================================================

/// Tabular result, already stringified for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Classified operation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Table(Table),
    Text(String),
}

impl Rendered {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Text(_) => "text",
        }
    }
}

// ============================================================================
// Audit events
// ============================================================================

/// Event for the JSONL audit journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    OperationAdded {
        name: String,
        label: String,
        params: usize,
        definition_before: String,
        definition_after: String,
    },
    AugmentationRejected {
        reason: String,
    },
    ExecutionStarted {
        run_id: String,
        operation: String,
    },
    ExecutionSucceeded {
        run_id: String,
        operation: String,
        result: String,
        committed: u32,
        duration_seconds: f64,
    },
    ExecutionFailed {
        run_id: String,
        operation: String,
        error: String,
        rolled_back: u32,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: AuditEvent,
}
