//! OD-019: Prompt/render collaborator — how the operator supplies values and sees results.
//!
//! The resolver and session talk only to the [`Prompter`] trait:
//! - [`terminal::TerminalPrompter`] for interactive line-oriented use
//! - [`scripted::ScriptedPrompter`] for preset answers (`run --arg`, tests)

pub mod scripted;
pub mod terminal;

use crate::core::error::Result;
use crate::core::types::Table;
use std::fmt;

/// A request for one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Stable key; the parameter name, or `param.step` for multi-step inputs.
    pub key: String,
    /// Text shown to the operator.
    pub label: String,
}

impl Prompt {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Status message shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Warning(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Warning(m) | Self::Error(m) => m,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(m) => write!(f, "[ok] {}", m),
            Self::Warning(m) => write!(f, "[warn] {}", m),
            Self::Error(m) => write!(f, "[error] {}", m),
        }
    }
}

/// Interactive input and result display.
///
/// `Ok(None)` means the operator declined to answer; the caller binds a default.
pub trait Prompter {
    fn text(&mut self, prompt: &Prompt) -> Result<Option<String>>;

    /// Multi-line free text.
    fn text_area(&mut self, prompt: &Prompt) -> Result<Option<String>>;

    fn integer(&mut self, prompt: &Prompt, default: i64) -> Result<Option<i64>>;

    fn number(&mut self, prompt: &Prompt, default: f64) -> Result<Option<f64>>;

    /// Index into `options`.
    fn choose(&mut self, prompt: &Prompt, options: &[&str]) -> Result<Option<usize>>;

    /// Content of an uploaded file.
    fn upload(&mut self, prompt: &Prompt) -> Result<Option<String>>;

    fn checkbox(&mut self, prompt: &Prompt) -> Result<bool>;

    fn notice(&mut self, notice: Notice) -> Result<()>;

    fn table(&mut self, table: &Table) -> Result<()>;
}

/// Plain-text table with columns padded to their widest cell.
pub fn format_table(table: &Table) -> String {
    if table.columns.is_empty() {
        return "(no rows)\n".to_string();
    }
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(&table.columns);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("  ")));
    for row in &table.rows {
        out.push_str(&line(row));
    }
    if table.rows.is_empty() {
        out.push_str("(no rows)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_od019_notice_display() {
        assert_eq!(Notice::Success("done".into()).to_string(), "[ok] done");
        assert_eq!(Notice::Warning("hm".into()).message(), "hm");
    }

    #[test]
    fn test_od019_format_table() {
        let table = Table {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec!["1".into(), "alpha".into()],
                vec!["22".into(), "b".into()],
            ],
        };
        assert_eq!(
            format_table(&table),
            "id  name\n--  -----\n1   alpha\n22  b\n"
        );
    }

    #[test]
    fn test_od019_format_empty_table() {
        assert_eq!(format_table(&Table::default()), "(no rows)\n");
        let table = Table {
            columns: vec!["x".into()],
            rows: vec![],
        };
        assert!(format_table(&table).ends_with("(no rows)\n"));
    }
}
