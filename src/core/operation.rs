//! OD-004a: The operation contract and the per-invocation argument view.

use super::types::{ArgValue, Binding, OperationSpec};
use crate::resources::document::Collection;
use crate::resources::ManagedResource;
use anyhow::{anyhow, bail};
use rusqlite::Connection;

/// A registered callable exposed to the operator.
pub trait Operation: Send + Sync {
    fn spec(&self) -> &OperationSpec;

    /// Run with bound arguments. The returned JSON value is classified by the engine.
    fn invoke(&self, call: &mut Call<'_>) -> anyhow::Result<serde_json::Value>;

    fn name(&self) -> &str {
        &self.spec().name
    }
}

/// Arguments of one invocation: the binding plus the resources it references.
pub struct Call<'a> {
    binding: &'a mut Binding,
    resources: &'a [Box<dyn ManagedResource>],
}

impl<'a> Call<'a> {
    pub fn new(binding: &'a mut Binding, resources: &'a [Box<dyn ManagedResource>]) -> Self {
        Self { binding, resources }
    }

    pub fn binding(&self) -> &Binding {
        self.binding
    }

    fn value(&self, name: &str) -> anyhow::Result<&ArgValue> {
        self.binding
            .get(name)
            .ok_or_else(|| anyhow!("parameter '{}' is not bound", name))
    }

    /// Connection behind a cursor parameter.
    pub fn cursor(&self, name: &str) -> anyhow::Result<&Connection> {
        match self.value(name)? {
            ArgValue::Cursor(idx) => self
                .resources
                .get(*idx)
                .and_then(|r| r.connection())
                .ok_or_else(|| anyhow!("parameter '{}' has no open connection", name)),
            other => bail!("parameter '{}' is {}, not a cursor", name, other.kind_name()),
        }
    }

    pub fn collection(&self, name: &str) -> anyhow::Result<&Collection> {
        match self.value(name)? {
            ArgValue::Collection(c) => Ok(c),
            other => bail!(
                "parameter '{}' is {}, not a collection",
                name,
                other.kind_name()
            ),
        }
    }

    /// Text of a prompted parameter. Numeric prompts are rendered as text.
    pub fn text(&self, name: &str) -> anyhow::Result<String> {
        match self.value(name)? {
            ArgValue::Text(s) => Ok(s.clone()),
            ArgValue::Int(i) => Ok(i.to_string()),
            ArgValue::Float(f) => Ok(f.to_string()),
            other => bail!("parameter '{}' is {}, not text", name, other.kind_name()),
        }
    }

    pub fn rows(&self, name: &str) -> anyhow::Result<&[String]> {
        match self.value(name)? {
            ArgValue::Rows(rows) => Ok(rows),
            other => bail!("parameter '{}' is {}, not bulk rows", name, other.kind_name()),
        }
    }

    pub fn accumulator(&mut self, name: &str) -> anyhow::Result<&mut Vec<serde_json::Value>> {
        match self.binding.get_mut(name) {
            Some(ArgValue::Accumulator(acc)) => Ok(acc),
            Some(other) => bail!(
                "parameter '{}' is {}, not an accumulator",
                name,
                other.kind_name()
            ),
            None => bail!("parameter '{}' is not bound", name),
        }
    }
}

/// Native operation backed by a plain function.
pub struct NativeOperation {
    spec: OperationSpec,
    body: fn(&mut Call<'_>) -> anyhow::Result<serde_json::Value>,
}

impl NativeOperation {
    pub fn new(
        spec: OperationSpec,
        body: fn(&mut Call<'_>) -> anyhow::Result<serde_json::Value>,
    ) -> Self {
        Self { spec, body }
    }
}

impl Operation for NativeOperation {
    fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    fn invoke(&self, call: &mut Call<'_>) -> anyhow::Result<serde_json::Value> {
        (self.body)(call)
    }
}
