//! Line-oriented prompter over any reader/writer pair.

use super::{format_table, Notice, Prompt, Prompter};
use crate::core::error::{Error, Result};
use crate::core::types::Table;
use std::io::{BufRead, Write};
use std::path::Path;

/// Prompts on `output`, reads answers from `input`. End of input cancels.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|e| Error::io("write", Path::new("<terminal>"), e))
    }

    /// One line without its terminator, or `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .map_err(|e| Error::io("read", Path::new("<terminal>"), e))?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn ask(&mut self, label: &str) -> Result<Option<String>> {
        self.say(&format!("{}: ", label))?;
        self.read_line()
    }

    fn ask_parsed<T: std::str::FromStr + std::fmt::Display + Copy>(
        &mut self,
        prompt: &Prompt,
        default: T,
        what: &str,
    ) -> Result<Option<T>> {
        loop {
            let Some(answer) = self.ask(&format!("{} [{}]", prompt.label, default))? else {
                return Ok(None);
            };
            let answer = answer.trim();
            if answer.is_empty() {
                return Ok(Some(default));
            }
            match answer.parse() {
                Ok(v) => return Ok(Some(v)),
                Err(_) => self.say(&format!("  '{}' is not {}\n", answer, what))?,
            }
        }
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn text(&mut self, prompt: &Prompt) -> Result<Option<String>> {
        self.ask(&prompt.label)
    }

    fn text_area(&mut self, prompt: &Prompt) -> Result<Option<String>> {
        self.say(&format!(
            "{} (one item per line, finish with a line containing only '.'):\n",
            prompt.label
        ))?;
        let mut lines = Vec::new();
        loop {
            match self.read_line()? {
                Some(line) if line.trim() == "." => break,
                Some(line) => lines.push(line),
                None if lines.is_empty() => return Ok(None),
                None => break,
            }
        }
        Ok(Some(lines.join("\n")))
    }

    fn integer(&mut self, prompt: &Prompt, default: i64) -> Result<Option<i64>> {
        self.ask_parsed(prompt, default, "an integer")
    }

    fn number(&mut self, prompt: &Prompt, default: f64) -> Result<Option<f64>> {
        self.ask_parsed(prompt, default, "a number")
    }

    fn choose(&mut self, prompt: &Prompt, options: &[&str]) -> Result<Option<usize>> {
        let mut menu = format!("{}:\n", prompt.label);
        for (i, opt) in options.iter().enumerate() {
            menu.push_str(&format!("  {}) {}\n", i + 1, opt));
        }
        self.say(&menu)?;
        loop {
            let Some(answer) = self.ask("choice [1]")? else {
                return Ok(None);
            };
            let answer = answer.trim();
            if answer.is_empty() && !options.is_empty() {
                return Ok(Some(0));
            }
            if let Ok(n) = answer.parse::<usize>() {
                if (1..=options.len()).contains(&n) {
                    return Ok(Some(n - 1));
                }
            }
            if let Some(i) = options.iter().position(|o| o.eq_ignore_ascii_case(answer)) {
                return Ok(Some(i));
            }
            self.say(&format!("  choose 1-{}\n", options.len()))?;
        }
    }

    fn upload(&mut self, prompt: &Prompt) -> Result<Option<String>> {
        let Some(path) = self.ask(&format!("{} (file path)", prompt.label))? else {
            return Ok(None);
        };
        let path = path.trim();
        if path.is_empty() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io("read", Path::new(path), e))?;
        Ok(Some(content))
    }

    fn checkbox(&mut self, prompt: &Prompt) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N]", prompt.label))?;
        Ok(matches!(
            answer.as_deref().map(str::trim),
            Some("y" | "Y" | "yes" | "Yes" | "YES")
        ))
    }

    fn notice(&mut self, notice: Notice) -> Result<()> {
        self.say(&format!("{}\n", notice))
    }

    fn table(&mut self, table: &Table) -> Result<()> {
        self.say(&format_table(table))
    }
}
