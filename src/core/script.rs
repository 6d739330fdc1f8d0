//! OD-005: Script operations — SQL bodies run against the bound cursor.
//!
//! Statements run in order. `:name` placeholders take prompt values; a
//! statement referencing the bulk parameter runs once per item. Query rows are
//! collected as JSON records; if no statement returned rows the result is a
//! row-count message.

use super::operation::{Call, Operation};
use super::parser::ScriptSource;
use super::types::{ArgValue, Binding, OperationSpec, ParamKind};
use anyhow::{anyhow, bail, Context};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Batch, Connection, Statement};
use serde_json::{Map, Value};

/// A runtime-added operation backed by a SQL body.
#[derive(Debug, Clone)]
pub struct ScriptOperation {
    source: ScriptSource,
}

impl ScriptOperation {
    pub fn new(source: ScriptSource) -> Self {
        Self { source }
    }
}

impl Operation for ScriptOperation {
    fn spec(&self) -> &OperationSpec {
        &self.source.spec
    }

    fn invoke(&self, call: &mut Call<'_>) -> anyhow::Result<Value> {
        let spec = &self.source.spec;
        let outcome = {
            let scratch;
            let conn = match spec.first_of_kind(ParamKind::DatabaseCursor) {
                Some(p) => call.cursor(&p.name)?,
                None => {
                    scratch = Connection::open_in_memory()
                        .context("cannot open scratch database")?;
                    &scratch
                }
            };
            run_body(conn, spec, &self.source.body, call.binding())?
        };

        match outcome.records {
            Some(records) => {
                if let Some(acc) = spec.first_of_kind(ParamKind::Accumulator) {
                    call.accumulator(&acc.name)?.extend(records.iter().cloned());
                }
                Ok(Value::Array(records))
            }
            None => Ok(Value::String(format!("{} row(s) affected", outcome.changes))),
        }
    }
}

#[derive(Debug, Default)]
struct Outcome {
    /// Present once any query statement has run.
    records: Option<Vec<Value>>,
    changes: usize,
}

/// Value source for one placeholder.
enum Slot<'b> {
    Scalar(SqlValue),
    Items(&'b [String]),
}

fn run_body(
    conn: &Connection,
    spec: &OperationSpec,
    body: &str,
    binding: &Binding,
) -> anyhow::Result<Outcome> {
    let mut outcome = Outcome::default();
    let mut batch = Batch::new(conn, body);
    let mut index = 0;
    while let Some(mut stmt) = batch.next()? {
        index += 1;
        let slots = bind_slots(&stmt, spec, Some(binding))
            .with_context(|| format!("statement {}", index))?;
        let items = slots.iter().find_map(|(_, slot)| match slot {
            Slot::Items(items) => Some(*items),
            Slot::Scalar(_) => None,
        });
        match items {
            Some(items) => {
                for item in items {
                    run_statement(&mut stmt, &slots, Some(item), &mut outcome)
                        .with_context(|| format!("statement {} (item '{}')", index, item))?;
                }
            }
            None => run_statement(&mut stmt, &slots, None, &mut outcome)
                .with_context(|| format!("statement {}", index))?,
        }
    }
    Ok(outcome)
}

fn run_statement(
    stmt: &mut Statement<'_>,
    slots: &[(usize, Slot<'_>)],
    item: Option<&str>,
    outcome: &mut Outcome,
) -> anyhow::Result<()> {
    for (idx, slot) in slots {
        match slot {
            Slot::Scalar(v) => stmt.raw_bind_parameter(*idx, v)?,
            Slot::Items(_) => stmt.raw_bind_parameter(*idx, item.unwrap_or_default())?,
        }
    }

    if stmt.column_count() == 0 {
        outcome.changes += stmt.raw_execute()?;
        return Ok(());
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let records = outcome.records.get_or_insert_with(Vec::new);
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut record = Map::new();
        for (i, col) in columns.iter().enumerate() {
            record.insert(col.clone(), json_value(row.get_ref(i)?));
        }
        records.push(Value::Object(record));
    }
    Ok(())
}

/// Resolve every placeholder of a prepared statement. Without a binding only
/// the references are checked.
fn bind_slots<'b>(
    stmt: &Statement<'_>,
    spec: &OperationSpec,
    binding: Option<&'b Binding>,
) -> anyhow::Result<Vec<(usize, Slot<'b>)>> {
    let mut slots = Vec::new();
    let mut bulk: Option<&str> = None;
    for idx in 1..=stmt.parameter_count() {
        let raw = stmt
            .parameter_name(idx)
            .ok_or_else(|| anyhow!("positional placeholders are not supported; use :name"))?;
        let name = &raw[1..];
        let param = spec
            .param(name)
            .ok_or_else(|| anyhow!("placeholder '{}' does not name a parameter", raw))?;
        match param.kind {
            ParamKind::DatabaseCursor | ParamKind::DocumentHandle | ParamKind::Accumulator => {
                bail!(
                    "parameter '{}' is a {} and cannot be used as a SQL value",
                    name,
                    param.kind
                )
            }
            ParamKind::BulkRows => match bulk {
                Some(other) if other != name => {
                    bail!("a statement may iterate only one bulk parameter ('{}' and '{}')", other, name)
                }
                _ => bulk = Some(&param.name),
            },
            ParamKind::RecordId | ParamKind::FreeText => {}
        }

        let Some(binding) = binding else {
            continue;
        };
        let value = binding
            .get(name)
            .ok_or_else(|| anyhow!("parameter '{}' is not bound", name))?;
        let slot = match value {
            ArgValue::Text(s) => Slot::Scalar(SqlValue::Text(s.clone())),
            ArgValue::Int(i) => Slot::Scalar(SqlValue::Integer(*i)),
            ArgValue::Float(f) => Slot::Scalar(SqlValue::Real(*f)),
            ArgValue::Rows(items) => Slot::Items(items),
            other => bail!(
                "parameter '{}' is bound to {}, which has no SQL value",
                name,
                other.kind_name()
            ),
        };
        slots.push((idx, slot));
    }
    Ok(slots)
}

fn json_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
    }
}

/// Prepare every statement of a script without running it, checking
/// placeholder references. Preparation stops at the first failing statement.
pub fn compile(conn: &Connection, source: &ScriptSource) -> anyhow::Result<()> {
    let mut batch = Batch::new(conn, &source.body);
    let mut index = 0;
    while let Some(stmt) = batch
        .next()
        .with_context(|| format!("{}: statement {}", source.spec.name, index + 1))?
    {
        index += 1;
        bind_slots(&stmt, &source.spec, None)
            .with_context(|| format!("{}: statement {}", source.spec.name, index))?;
    }
    if index == 0 {
        bail!("{}: body contains no SQL statements", source.spec.name);
    }
    Ok(())
}
