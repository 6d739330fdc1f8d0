//! OD-006: Built-in operations compiled into the binary.
//!
//! These are registered before any script operation and cover every
//! parameter kind: cursor, collection, record id, bulk rows, accumulator
//! and free text.

use super::operation::{Call, NativeOperation, Operation};
use super::types::{OperationSpec, ParamKind};
use crate::resources::document::document_id;
use anyhow::{bail, Context};
use serde_json::{json, Value};
use std::sync::Arc;

/// The built-in catalog, in registration order.
pub fn catalog() -> Vec<Arc<dyn Operation>> {
    vec![
        native(
            OperationSpec::builder("list_sql_tables")
                .resource("cursor", ParamKind::DatabaseCursor)
                .build(),
            list_sql_tables,
        ),
        native(
            OperationSpec::builder("describe_sql_table")
                .resource("cursor", ParamKind::DatabaseCursor)
                .text("table")
                .build(),
            describe_sql_table,
        ),
        native(
            OperationSpec::builder("count_mongo_db_documents")
                .resource("collection", ParamKind::DocumentHandle)
                .build(),
            count_documents,
        ),
        native(
            OperationSpec::builder("find_mongo_db_record")
                .resource("collection", ParamKind::DocumentHandle)
                .resource("record_id", ParamKind::RecordId)
                .build(),
            find_record,
        ),
        native(
            OperationSpec::builder("insert_mongo_db_record")
                .resource("collection", ParamKind::DocumentHandle)
                .resource("record_id", ParamKind::RecordId)
                .text("payload")
                .build(),
            insert_record,
        ),
        native(
            OperationSpec::builder("lookup_records")
                .resource("collection", ParamKind::DocumentHandle)
                .resource("data", ParamKind::BulkRows)
                .resource("rf", ParamKind::Accumulator)
                .build(),
            lookup_records,
        ),
    ]
}

fn native(
    spec: OperationSpec,
    body: fn(&mut Call<'_>) -> anyhow::Result<Value>,
) -> Arc<dyn Operation> {
    Arc::new(NativeOperation::new(spec, body))
}

fn list_sql_tables(call: &mut Call<'_>) -> anyhow::Result<Value> {
    let conn = call.cursor("cursor")?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(
        names.into_iter().map(|n| json!({ "table": n })).collect(),
    ))
}

fn describe_sql_table(call: &mut Call<'_>) -> anyhow::Result<Value> {
    let table = call.text("table")?;
    let table = table.trim();
    if table.is_empty() {
        bail!("table name is required");
    }
    let conn = call.cursor("cursor")?;
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(json!({
                "column": row.get::<_, String>(0)?,
                "type": row.get::<_, String>(1)?,
                "not_null": row.get::<_, i64>(2)? != 0,
                "default": row.get::<_, Option<String>>(3)?,
                "primary_key": row.get::<_, i64>(4)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        bail!("no such table: {}", table);
    }
    Ok(Value::Array(columns))
}

fn count_documents(call: &mut Call<'_>) -> anyhow::Result<Value> {
    let count = call.collection("collection")?.count()?;
    Ok(json!(count))
}

fn find_record(call: &mut Call<'_>) -> anyhow::Result<Value> {
    let id = required_id(call)?;
    match call.collection("collection")?.find_by_id(&id)? {
        Some(doc) => Ok(Value::Array(vec![doc])),
        None => bail!("no record with id '{}'", id),
    }
}

fn insert_record(call: &mut Call<'_>) -> anyhow::Result<Value> {
    let id = required_id(call)?;
    let payload = call.text("payload")?;
    let mut doc: Value = if payload.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&payload).context("payload must be a JSON object")?
    };
    let Some(fields) = doc.as_object_mut() else {
        bail!("payload must be a JSON object");
    };
    fields.insert("_id".to_string(), Value::String(id.clone()));

    let collection = call.collection("collection")?;
    if collection.find_by_id(&id)?.is_some() {
        bail!("a record with id '{}' already exists", id);
    }
    collection.insert(&doc)?;
    Ok(Value::String(format!(
        "Inserted record '{}' into {}",
        id,
        collection.name()
    )))
}

fn lookup_records(call: &mut Call<'_>) -> anyhow::Result<Value> {
    let docs = call.collection("collection")?.documents()?;
    let mut found = Vec::new();
    for id in call.rows("data")? {
        match docs
            .iter()
            .find(|doc| document_id(doc).as_deref() == Some(id.as_str()))
        {
            Some(doc) => found.push(doc.clone()),
            None => tracing::debug!(id = %id, "lookup miss"),
        }
    }
    let acc = call.accumulator("rf")?;
    acc.extend(found);
    Ok(Value::Array(acc.clone()))
}

fn required_id(call: &Call<'_>) -> anyhow::Result<String> {
    let id = call.text("record_id")?;
    let id = id.trim();
    if id.is_empty() {
        bail!("record id is required");
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::display_label;
    use crate::core::types::{ArgValue, Binding};
    use crate::resources::document::{Collection, DocumentStore};
    use crate::resources::sql::SqlSession;
    use crate::resources::ManagedResource;

    fn find(name: &str) -> Arc<dyn Operation> {
        catalog()
            .into_iter()
            .find(|op| op.name() == name)
            .unwrap()
    }

    fn collection(dir: &tempfile::TempDir) -> Collection {
        let coll = DocumentStore::open(dir.path())
            .unwrap()
            .collection("records")
            .unwrap();
        coll.insert(&json!({"_id": "C1", "owner": "ann"})).unwrap();
        coll.insert(&json!({"_id": "C2", "owner": "bo"})).unwrap();
        coll
    }

    #[test]
    fn test_od006_catalog_labels() {
        let labels: Vec<String> = catalog().iter().map(|op| display_label(op.name())).collect();
        assert_eq!(
            labels,
            vec![
                "List SQL Tables",
                "Describe SQL Table",
                "Count MongoDB Documents",
                "Find MongoDB Record",
                "Insert MongoDB Record",
                "Lookup Records",
            ]
        );
    }

    #[test]
    fn test_od006_catalog_covers_every_kind() {
        let ops = catalog();
        for kind in [
            ParamKind::DatabaseCursor,
            ParamKind::DocumentHandle,
            ParamKind::RecordId,
            ParamKind::BulkRows,
            ParamKind::Accumulator,
            ParamKind::FreeText,
        ] {
            assert!(
                ops.iter().any(|op| op.spec().first_of_kind(kind).is_some()),
                "no built-in uses {}",
                kind
            );
        }
    }

    #[test]
    fn test_od006_sql_tables_and_describe() {
        let session = SqlSession::in_memory().unwrap();
        session
            .connection()
            .unwrap()
            .execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL NOT NULL)")
            .unwrap();
        let resources: Vec<Box<dyn ManagedResource>> = vec![Box::new(session)];

        let mut binding = Binding::new();
        binding.insert("cursor", ArgValue::Cursor(0));
        let out = find("list_sql_tables")
            .invoke(&mut Call::new(&mut binding, &resources))
            .unwrap();
        assert_eq!(out, json!([{"table": "orders"}]));

        binding.insert("table", ArgValue::Text("orders".into()));
        let out = find("describe_sql_table")
            .invoke(&mut Call::new(&mut binding, &resources))
            .unwrap();
        assert_eq!(out[1]["column"], "total");
        assert_eq!(out[1]["not_null"], true);
        assert_eq!(out[0]["primary_key"], true);

        binding.insert("table", ArgValue::Text("nope".into()));
        assert!(find("describe_sql_table")
            .invoke(&mut Call::new(&mut binding, &resources))
            .is_err());
    }

    #[test]
    fn test_od006_document_operations() {
        let dir = tempfile::tempdir().unwrap();
        let coll = collection(&dir);

        let mut binding = Binding::new();
        binding.insert("collection", ArgValue::Collection(coll.clone()));
        let out = find("count_mongo_db_documents")
            .invoke(&mut Call::new(&mut binding, &[]))
            .unwrap();
        assert_eq!(out, json!(2));

        binding.insert("record_id", ArgValue::Text("C2".into()));
        let out = find("find_mongo_db_record")
            .invoke(&mut Call::new(&mut binding, &[]))
            .unwrap();
        assert_eq!(out[0]["owner"], "bo");

        binding.insert("record_id", ArgValue::Text("C3".into()));
        binding.insert("payload", ArgValue::Text(r#"{"owner": "cy"}"#.into()));
        let out = find("insert_mongo_db_record")
            .invoke(&mut Call::new(&mut binding, &[]))
            .unwrap();
        assert_eq!(out, json!("Inserted record 'C3' into records"));
        assert_eq!(coll.count().unwrap(), 3);

        let again = find("insert_mongo_db_record").invoke(&mut Call::new(&mut binding, &[]));
        assert!(again.is_err());
        assert_eq!(coll.count().unwrap(), 3);
    }

    #[test]
    fn test_od006_blank_record_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut binding = Binding::new();
        binding.insert("collection", ArgValue::Collection(collection(&dir)));
        binding.insert("record_id", ArgValue::Text("  ".into()));
        let err = find("find_mongo_db_record")
            .invoke(&mut Call::new(&mut binding, &[]))
            .unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_od006_lookup_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let mut binding = Binding::new();
        binding.insert("collection", ArgValue::Collection(collection(&dir)));
        binding.insert(
            "data",
            ArgValue::Rows(vec!["C2".into(), "missing".into(), "C1".into()]),
        );
        binding.insert("rf", ArgValue::Accumulator(Vec::new()));
        let out = find("lookup_records")
            .invoke(&mut Call::new(&mut binding, &[]))
            .unwrap();
        assert_eq!(out.as_array().unwrap().len(), 2);
        assert_eq!(out[0]["_id"], "C2");
    }
}
