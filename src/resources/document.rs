//! OD-008: Document store — JSON-lines collections in a directory.
//!
//! Each collection is `<dir>/<name>.jsonl`, one JSON object per line.
//! Documents are matched by `_id`, falling back to `id`.

use crate::core::error::ResourceError;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A directory of collections.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    /// Open (creating if needed) a store directory.
    pub fn open(dir: &Path) -> Result<Self, ResourceError> {
        std::fs::create_dir_all(dir).map_err(|e| store_error(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn collection(&self, name: &str) -> Result<Collection, ResourceError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ResourceError::DocumentStore {
                path: self.dir.display().to_string(),
                message: format!("invalid collection name '{}'", name),
            });
        }
        Ok(Collection {
            name: name.to_string(),
            path: self.dir.join(format!("{}.jsonl", name)),
        })
    }
}

/// Handle to one collection. Opening it touches no files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    name: String,
    path: PathBuf,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All documents, in insertion order. A missing file is an empty collection.
    pub fn documents(&self) -> Result<Vec<Value>, ResourceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error(&self.path, e)),
        };
        let mut docs = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let doc: Value =
                serde_json::from_str(line).map_err(|e| ResourceError::DocumentStore {
                    path: self.path.display().to_string(),
                    message: format!("line {}: {}", i + 1, e),
                })?;
            docs.push(doc);
        }
        Ok(docs)
    }

    pub fn count(&self) -> Result<usize, ResourceError> {
        Ok(self.documents()?.len())
    }

    /// First document whose `_id` (or `id`) equals `id`.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Value>, ResourceError> {
        Ok(self
            .documents()?
            .into_iter()
            .find(|doc| document_id(doc).as_deref() == Some(id)))
    }

    /// Append one document. Must be a JSON object.
    pub fn insert(&self, doc: &Value) -> Result<(), ResourceError> {
        if !doc.is_object() {
            return Err(ResourceError::DocumentStore {
                path: self.path.display().to_string(),
                message: "documents must be JSON objects".to_string(),
            });
        }
        let line = serde_json::to_string(doc).map_err(|e| ResourceError::DocumentStore {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| store_error(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| store_error(&self.path, e))
    }
}

/// Identifier of a document as text, if it has one.
pub fn document_id(doc: &Value) -> Option<String> {
    let id = doc.get("_id").or_else(|| doc.get("id"))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn store_error(path: &Path, e: std::io::Error) -> ResourceError {
    ResourceError::DocumentStore {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
