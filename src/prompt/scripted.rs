//! Preset answers keyed by prompt key, with an optional interactive fallback.

use super::{Notice, Prompt, Prompter};
use crate::core::error::{Error, Result};
use crate::core::types::Table;
use std::collections::HashMap;
use std::path::Path;

/// Answers prompts from a map; unanswered prompts go to the fallback or are cancelled.
///
/// Upload answers are file paths. Notices and tables are recorded, and also
/// forwarded to the fallback when there is one.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: HashMap<String, String>,
    fallback: Option<Box<dyn Prompter>>,
    pub notices: Vec<Notice>,
    pub tables: Vec<Table>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: Box<dyn Prompter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn answer(mut self, key: &str, value: &str) -> Self {
        self.answers.insert(key.to_string(), value.to_string());
        self
    }

    /// Parse `key=value` pairs as given on the command line.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut prompter = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("argument '{}' must look like key=value", pair))
            })?;
            prompter.answers.insert(key.trim().to_string(), value.to_string());
        }
        Ok(prompter)
    }

    fn preset(&self, prompt: &Prompt) -> Option<&str> {
        self.answers.get(&prompt.key).map(String::as_str)
    }

    /// An answer that does not parse cancels the prompt.
    fn parsed<T: std::str::FromStr>(prompt: &Prompt, raw: &str, what: &str) -> Option<T> {
        let value = raw.trim().parse().ok();
        if value.is_none() {
            tracing::warn!(key = %prompt.key, answer = raw, "answer is not {}, using default", what);
        }
        value
    }
}

impl Prompter for ScriptedPrompter {
    fn text(&mut self, prompt: &Prompt) -> Result<Option<String>> {
        match self.preset(prompt) {
            Some(v) => Ok(Some(v.to_string())),
            None => match self.fallback.as_mut() {
                Some(f) => f.text(prompt),
                None => Ok(None),
            },
        }
    }

    fn text_area(&mut self, prompt: &Prompt) -> Result<Option<String>> {
        match self.preset(prompt) {
            // `\n` in a command-line answer separates items.
            Some(v) => Ok(Some(v.replace("\\n", "\n"))),
            None => match self.fallback.as_mut() {
                Some(f) => f.text_area(prompt),
                None => Ok(None),
            },
        }
    }

    fn integer(&mut self, prompt: &Prompt, default: i64) -> Result<Option<i64>> {
        match self.preset(prompt) {
            Some(v) => Ok(Self::parsed(prompt, v, "an integer")),
            None => match self.fallback.as_mut() {
                Some(f) => f.integer(prompt, default),
                None => Ok(None),
            },
        }
    }

    fn number(&mut self, prompt: &Prompt, default: f64) -> Result<Option<f64>> {
        match self.preset(prompt) {
            Some(v) => Ok(Self::parsed(prompt, v, "a number")),
            None => match self.fallback.as_mut() {
                Some(f) => f.number(prompt, default),
                None => Ok(None),
            },
        }
    }

    fn choose(&mut self, prompt: &Prompt, options: &[&str]) -> Result<Option<usize>> {
        let Some(v) = self.preset(prompt) else {
            return match self.fallback.as_mut() {
                Some(f) => f.choose(prompt, options),
                None => Ok(None),
            };
        };
        let v = v.trim();
        let lower = v.to_ascii_lowercase();
        options
            .iter()
            .position(|o| o.eq_ignore_ascii_case(v))
            .or_else(|| {
                options
                    .iter()
                    .position(|o| o.to_ascii_lowercase().starts_with(&lower))
            })
            .map(Some)
            .ok_or_else(|| {
                Error::Config(format!(
                    "answer '{}' for '{}' is not one of: {}",
                    v,
                    prompt.key,
                    options.join(", ")
                ))
            })
    }

    fn upload(&mut self, prompt: &Prompt) -> Result<Option<String>> {
        match self.preset(prompt) {
            Some(path) if path.trim().is_empty() => Ok(None),
            Some(path) => {
                let path = Path::new(path.trim());
                std::fs::read_to_string(path)
                    .map(Some)
                    .map_err(|e| Error::io("read", path, e))
            }
            None => match self.fallback.as_mut() {
                Some(f) => f.upload(prompt),
                None => Ok(None),
            },
        }
    }

    fn checkbox(&mut self, prompt: &Prompt) -> Result<bool> {
        match self.preset(prompt) {
            Some(v) => Ok(matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "1" | "on"
            )),
            None => match self.fallback.as_mut() {
                Some(f) => f.checkbox(prompt),
                None => Ok(false),
            },
        }
    }

    fn notice(&mut self, notice: Notice) -> Result<()> {
        if let Some(f) = self.fallback.as_mut() {
            f.notice(notice.clone())?;
        }
        self.notices.push(notice);
        Ok(())
    }

    fn table(&mut self, table: &Table) -> Result<()> {
        if let Some(f) = self.fallback.as_mut() {
            f.table(table)?;
        }
        self.tables.push(table.clone());
        Ok(())
    }
}
