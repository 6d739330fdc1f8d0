//! OD-012: Execution engine — invoke, classify, commit or roll back, release.
//!
//! invoke → success: commit every transactional resource → release all
//!        → failure: roll back every transactional resource → release all
//!
//! Every resource handed to [`execute`] is released exactly once, on whichever
//! path is taken. Release failures are logged and never mask the outcome.

use super::error::{Error, Result};
use super::operation::{Call, Operation};
use super::resolver::Resolved;
use super::types::{Rendered, Table};
use crate::resources::{release_all, ManagedResource};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Outcome of a successful execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub rendered: Rendered,
    /// Transactional resources committed.
    pub committed: u32,
    pub duration: Duration,
}

/// Run `operation` with a resolved binding.
pub fn execute(operation: &dyn Operation, resolved: Resolved) -> Result<Execution> {
    let started = Instant::now();
    let Resolved {
        mut binding,
        mut resources,
    } = resolved;
    let name = operation.name().to_string();
    tracing::info!(operation = %name, resources = resources.len(), "executing");

    let outcome = operation.invoke(&mut Call::new(&mut binding, &resources));

    let value = match outcome {
        Ok(value) => value,
        Err(cause) => {
            let rolled_back = rollback_all(&mut resources);
            release_all(resources);
            tracing::info!(operation = %name, rolled_back, "operation failed");
            return Err(Error::Execution {
                operation: name,
                cause: format!("{:#}", cause),
            });
        }
    };

    let committed = match commit_all(&mut resources) {
        Ok(n) => n,
        Err(e) => {
            release_all(resources);
            return Err(e);
        }
    };
    release_all(resources);

    let rendered = classify(&value);
    tracing::info!(
        operation = %name,
        committed,
        result = rendered.kind(),
        "operation succeeded"
    );
    Ok(Execution {
        rendered,
        committed,
        duration: started.elapsed(),
    })
}

/// Commit transactional resources in order. On the first failure the failed
/// resource and every later one are rolled back; [`Error::CommitFailed`]
/// reports both counts.
fn commit_all(resources: &mut [Box<dyn ManagedResource>]) -> Result<u32> {
    let mut committed = 0;
    for i in 0..resources.len() {
        if !resources[i].is_transactional() {
            continue;
        }
        if let Err(source) = resources[i].commit() {
            tracing::warn!(resource = %resources[i].describe(), error = %source, "commit failed");
            let rolled_back = rollback_all(&mut resources[i..]);
            return Err(Error::CommitFailed {
                committed,
                rolled_back,
                source,
            });
        }
        committed += 1;
    }
    Ok(committed)
}

/// Roll back every transactional resource; returns how many were rolled back.
fn rollback_all(resources: &mut [Box<dyn ManagedResource>]) -> u32 {
    let mut rolled_back = 0;
    for resource in resources.iter_mut().filter(|r| r.is_transactional()) {
        match resource.rollback() {
            Ok(()) => rolled_back += 1,
            Err(e) => {
                tracing::warn!(resource = %resource.describe(), error = %e, "rollback failed")
            }
        }
    }
    rolled_back
}

/// Classify an operation result as a table or text.
///
/// Arrays of objects use the union of keys (first-seen order) as columns,
/// arrays of arrays use positions, arrays of scalars a single `value` column.
/// Strings render bare; anything else renders as JSON text.
pub fn classify(value: &Value) -> Rendered {
    match value {
        Value::Array(items) => match tabulate(items) {
            Some(table) => Rendered::Table(table),
            None => Rendered::Text(value.to_string()),
        },
        Value::String(s) => Rendered::Text(s.clone()),
        other => Rendered::Text(other.to_string()),
    }
}

fn tabulate(items: &[Value]) -> Option<Table> {
    if items.iter().all(Value::is_object) {
        let mut columns: Vec<String> = Vec::new();
        for item in items {
            if let Value::Object(map) = item {
                for key in map.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
        let rows = items
            .iter()
            .map(|item| {
                columns
                    .iter()
                    .map(|c| item.get(c).map(cell).unwrap_or_default())
                    .collect()
            })
            .collect();
        return Some(Table { columns, rows });
    }

    if items.iter().all(Value::is_array) {
        let width = items
            .iter()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        let columns = (0..width).map(|i| i.to_string()).collect();
        let rows = items
            .iter()
            .filter_map(Value::as_array)
            .map(|row| {
                (0..width)
                    .map(|i| row.get(i).map(cell).unwrap_or_default())
                    .collect()
            })
            .collect();
        return Some(Table { columns, rows });
    }

    if items.iter().all(|v| !v.is_object() && !v.is_array()) {
        return Some(Table {
            columns: vec!["value".to_string()],
            rows: items.iter().map(|v| vec![cell(v)]).collect(),
        });
    }
    None
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::NativeOperation;
    use crate::core::types::{ArgValue, Binding, OperationSpec, ParamKind};
    use crate::resources::testing::{Log, TrackedResource};
    use proptest::prelude::*;
    use serde_json::json;

    fn ok_body(call: &mut Call<'_>) -> anyhow::Result<Value> {
        call.cursor("cursor")?;
        Ok(json!([{"a": 1}, {"b": "x"}]))
    }

    fn failing_body(_call: &mut Call<'_>) -> anyhow::Result<Value> {
        anyhow::bail!("division by zero")
    }

    fn plain_body(_call: &mut Call<'_>) -> anyhow::Result<Value> {
        Ok(json!("ok"))
    }

    fn op(body: fn(&mut Call<'_>) -> anyhow::Result<Value>) -> NativeOperation {
        NativeOperation::new(
            OperationSpec::builder("divide")
                .resource("cursor", ParamKind::DatabaseCursor)
                .build(),
            body,
        )
    }

    fn resolved(log: &Log, n: usize, failing_commit: Option<usize>) -> Resolved {
        let mut binding = Binding::new();
        binding.insert("cursor", ArgValue::Cursor(0));
        let resources = (1..=n)
            .map(|id| {
                let r = TrackedResource::new(id, log);
                let r = if failing_commit == Some(id) {
                    r.failing_commit()
                } else {
                    r
                };
                Box::new(r) as Box<dyn ManagedResource>
            })
            .collect();
        Resolved { binding, resources }
    }

    fn assert_released_once(log: &Log, n: usize) {
        for id in 1..=n {
            assert_eq!(log.count_for("release", id), 1, "resource #{}", id);
        }
    }

    #[test]
    fn test_od012_success_commits_then_releases() {
        let log = Log::default();
        let out = execute(&op(ok_body), resolved(&log, 2, None)).unwrap();
        assert_eq!(out.committed, 2);
        assert_eq!(log.count("rollback"), 0);
        assert_released_once(&log, 2);
        assert_eq!(
            log.entries(),
            vec!["open #1", "open #2", "commit #1", "commit #2", "release #1", "release #2"]
        );
        assert_eq!(
            out.rendered,
            Rendered::Table(Table {
                columns: vec!["a".into(), "b".into()],
                rows: vec![vec!["1".into(), "".into()], vec!["".into(), "x".into()]],
            })
        );
    }

    #[test]
    fn test_od012_failure_rolls_back_then_releases() {
        let log = Log::default();
        let err = execute(&op(failing_body), resolved(&log, 2, None)).unwrap_err();
        match err {
            Error::Execution { operation, cause } => {
                assert_eq!(operation, "divide");
                assert!(cause.contains("division by zero"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(log.count("commit"), 0);
        assert_eq!(log.count("rollback"), 2);
        assert_released_once(&log, 2);
    }

    #[test]
    fn test_od012_commit_failure_reports_counts() {
        let log = Log::default();
        let err = execute(&op(ok_body), resolved(&log, 3, Some(2))).unwrap_err();
        assert!(matches!(
            err,
            Error::CommitFailed {
                committed: 1,
                rolled_back: 2,
                ..
            }
        ));
        assert_eq!(log.count_for("commit", 1), 1);
        assert_eq!(log.count_for("rollback", 1), 0);
        assert_eq!(log.count_for("rollback", 2), 1);
        assert_eq!(log.count_for("rollback", 3), 1);
        assert_released_once(&log, 3);
    }

    #[test]
    fn test_od012_release_failure_does_not_mask_success() {
        let log = Log::default();
        let mut binding = Binding::new();
        binding.insert("cursor", ArgValue::Cursor(0));
        let resources: Vec<Box<dyn ManagedResource>> =
            vec![Box::new(TrackedResource::new(1, &log).failing_release())];
        let out = execute(&op(ok_body), Resolved { binding, resources }).unwrap();
        assert_eq!(out.committed, 1);
        assert_released_once(&log, 1);
    }

    #[test]
    fn test_od012_classify() {
        assert_eq!(classify(&json!("done")), Rendered::Text("done".into()));
        assert_eq!(classify(&json!(3)), Rendered::Text("3".into()));
        assert_eq!(classify(&json!({"k": 1})), Rendered::Text("{\"k\":1}".into()));
        assert_eq!(classify(&json!(null)), Rendered::Text("null".into()));
        assert_eq!(classify(&json!([])), Rendered::Table(Table::default()));
        assert_eq!(
            classify(&json!([[1, 2], [3]])),
            Rendered::Table(Table {
                columns: vec!["0".into(), "1".into()],
                rows: vec![vec!["1".into(), "2".into()], vec!["3".into(), "".into()]],
            })
        );
        assert_eq!(
            classify(&json!(["x", 2])),
            Rendered::Table(Table {
                columns: vec!["value".into()],
                rows: vec![vec!["x".into()], vec!["2".into()]],
            })
        );
        assert_eq!(classify(&json!([{"a": 1}, 2])).kind(), "text");
    }

    proptest! {
        #[test]
        fn prop_od012_release_exactly_once(n in 0usize..5, fail in any::<bool>(), bad_commit in proptest::option::of(1usize..5)) {
            let log = Log::default();
            let body: fn(&mut Call<'_>) -> anyhow::Result<Value> = match (n, fail) {
                (0, _) => plain_body,
                (_, true) => failing_body,
                _ => ok_body,
            };
            let result = execute(&op(body), resolved(&log, n, bad_commit));
            let commit_failed = matches!(result, Err(Error::CommitFailed { .. }));
            for id in 1..=n {
                prop_assert_eq!(log.count_for("release", id), 1);
                let committed = log.count_for("commit", id);
                let rolled = log.count_for("rollback", id);
                if commit_failed && bad_commit == Some(id) {
                    // The failed commit is followed by its rollback.
                    prop_assert_eq!((committed, rolled), (1, 1));
                } else {
                    prop_assert_eq!(committed + rolled, 1, "resource #{}", id);
                }
            }
            if let Err(Error::CommitFailed { committed, rolled_back, .. }) = result {
                prop_assert_eq!(committed as usize, log.count("commit") - 1);
                prop_assert_eq!(rolled_back as usize, log.count("rollback"));
            }
        }
    }
}
