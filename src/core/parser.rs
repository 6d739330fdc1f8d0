//! OD-002: Operation source and application definition parsing.
//!
//! An application definition is a text artifact with two marker lines:
//! - script operations (`fn name(params) { SQL }`) sit above `-- opdeck:dispatch-begin`
//! - prompt bindings (`binding name { param: widget }`) sit between the two markers
//! - anything after `-- opdeck:dispatch-end` is carried through untouched
//!
//! Syntax problems are `Error::Parse` with a line number; broken invariants
//! (missing markers, unpaired bindings, duplicate names) are `Error::Structural`.

use super::error::{Error, Result};
use super::types::*;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Marker line closing the operations section.
pub const DISPATCH_BEGIN: &str = "-- opdeck:dispatch-begin";

/// Marker line closing the bindings section.
pub const DISPATCH_END: &str = "-- opdeck:dispatch-end";

static FN_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^fn\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)\s*\{").expect("valid regex")
});

static BINDING_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^binding\s+([A-Za-z_][A-Za-z0-9_]*)\s*\{").expect("valid regex")
});

static BINDING_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*:\s*([A-Za-z]+)$").expect("valid regex")
});

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// A parsed script operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub spec: OperationSpec,
    /// SQL between the braces, trimmed.
    pub body: String,
    /// Full definition text as written.
    pub source: String,
}

/// The parsed application definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definition {
    pub operations: Vec<ScriptSource>,
    pub bindings: Vec<PromptBinding>,
}

impl Definition {
    pub fn binding_for(&self, operation: &str) -> Option<&PromptBinding> {
        self.bindings.iter().find(|b| b.operation == operation)
    }

    pub fn operation(&self, name: &str) -> Option<&ScriptSource> {
        self.operations.iter().find(|o| o.spec.name == name)
    }
}

/// Byte offsets of the two marker lines (start of each line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchors {
    pub begin: usize,
    pub end: usize,
}

/// Locate both marker lines. Missing, repeated, or out-of-order markers are structural errors.
pub fn locate_anchors(text: &str) -> Result<Anchors> {
    let begin = find_marker(text, DISPATCH_BEGIN)?;
    let end = find_marker(text, DISPATCH_END)?;
    if end <= begin {
        return Err(Error::Structural(format!(
            "'{}' must come after '{}'",
            DISPATCH_END, DISPATCH_BEGIN
        )));
    }
    Ok(Anchors { begin, end })
}

fn find_marker(text: &str, marker: &str) -> Result<usize> {
    let mut found = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == marker {
            if found.is_some() {
                return Err(Error::Structural(format!(
                    "marker '{}' appears more than once",
                    marker
                )));
            }
            found = Some(offset);
        }
        offset += line.len();
    }
    found.ok_or_else(|| Error::Structural(format!("missing marker '{}'", marker)))
}

/// Parse submitted source text holding exactly one operation definition.
pub fn parse_operation(source: &str) -> Result<ScriptSource> {
    let mut scanner = Scanner::new(source, 0, source.len());
    scanner.skip_trivia();
    if scanner.at_end() {
        return Err(Error::parse("no operation definition found"));
    }
    let op = parse_fn(&mut scanner)?;
    scanner.skip_trivia();
    if !scanner.at_end() {
        return Err(Error::parse_at(
            scanner.line(),
            "unexpected text after the operation definition (submit one operation at a time)",
        ));
    }
    Ok(op)
}

/// Parse and check a whole application definition.
pub fn parse_definition(text: &str) -> Result<Definition> {
    let anchors = locate_anchors(text)?;
    let bindings_start = line_end(text, anchors.begin);

    let mut operations = Vec::new();
    let mut scanner = Scanner::new(text, 0, anchors.begin);
    loop {
        scanner.skip_trivia();
        if scanner.at_end() {
            break;
        }
        operations.push(parse_fn(&mut scanner)?);
    }

    let mut bindings = Vec::new();
    let mut scanner = Scanner::new(text, bindings_start, anchors.end);
    loop {
        scanner.skip_trivia();
        if scanner.at_end() {
            break;
        }
        bindings.push(parse_binding(&mut scanner)?);
    }

    let definition = Definition {
        operations,
        bindings,
    };
    check_definition(&definition)?;
    Ok(definition)
}

/// Every operation has one binding, every binding names an operation, names are unique.
fn check_definition(def: &Definition) -> Result<()> {
    let mut names = HashSet::new();
    for op in &def.operations {
        if !names.insert(op.spec.name.as_str()) {
            return Err(Error::Structural(format!(
                "operation '{}' is defined more than once",
                op.spec.name
            )));
        }
    }

    let mut bound = HashSet::new();
    for binding in &def.bindings {
        let op = def.operation(&binding.operation).ok_or_else(|| {
            Error::Structural(format!(
                "binding '{}' has no matching operation",
                binding.operation
            ))
        })?;
        if !bound.insert(binding.operation.as_str()) {
            return Err(Error::Structural(format!(
                "operation '{}' has more than one binding",
                binding.operation
            )));
        }
        for field in &binding.fields {
            if op.spec.param(&field.param).is_none() {
                return Err(Error::Structural(format!(
                    "binding '{}' prompts for undeclared parameter '{}'",
                    binding.operation, field.param
                )));
            }
        }
    }

    if let Some(op) = def
        .operations
        .iter()
        .find(|o| !bound.contains(o.spec.name.as_str()))
    {
        return Err(Error::Structural(format!(
            "operation '{}' has no binding",
            op.spec.name
        )));
    }
    Ok(())
}

fn line_end(text: &str, from: usize) -> usize {
    text[from..]
        .find('\n')
        .map(|i| from + i + 1)
        .unwrap_or(text.len())
}

// ============================================================================
// Scanner
// ============================================================================

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, pos: usize, end: usize) -> Self {
        Self { text, pos, end }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..self.end]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    fn line(&self) -> usize {
        line_of(self.text, self.pos)
    }

    /// Skip whitespace and `--` comment lines.
    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("--") {
                self.pos = line_end(self.text, self.pos).min(self.end);
            } else {
                break;
            }
        }
    }
}

fn line_of(text: &str, pos: usize) -> usize {
    text[..pos].matches('\n').count() + 1
}

fn parse_fn(scanner: &mut Scanner<'_>) -> Result<ScriptSource> {
    let start = scanner.pos;
    let line = scanner.line();
    let rest = scanner.rest();
    let caps = FN_HEADER.captures(rest).ok_or_else(|| {
        if rest.starts_with("fn") {
            Error::parse_at(line, "malformed operation header, expected `fn name(params) {`")
        } else {
            Error::parse_at(line, "expected an operation definition starting with `fn`")
        }
    })?;
    let header_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let name = caps[1].to_string();
    let params = parse_params(&caps[2], line)?;

    let body_start = start + header_len;
    let close = find_closing_brace(scanner.text, body_start, scanner.end).ok_or_else(|| {
        Error::parse_at(line, format!("body of '{}' is not closed with '}}'", name))
    })?;
    let body = scanner.text[body_start..close].trim().to_string();
    if body.is_empty() {
        return Err(Error::parse_at(
            line,
            format!("operation '{}' has an empty body", name),
        ));
    }
    scanner.pos = close + 1;

    Ok(ScriptSource {
        spec: OperationSpec { name, params },
        body,
        source: scanner.text[start..close + 1].to_string(),
    })
}

fn parse_params(list: &str, line: usize) -> Result<Vec<Parameter>> {
    let mut params: Vec<Parameter> = Vec::new();
    let pieces: Vec<&str> = list.split(',').map(str::trim).collect();
    let count = pieces.len();
    for (i, piece) in pieces.into_iter().enumerate() {
        if piece.is_empty() {
            // `fn f()` and a trailing comma are fine.
            if i + 1 == count {
                continue;
            }
            return Err(Error::parse_at(line, "empty parameter in parameter list"));
        }
        if piece.contains('=') {
            return Err(Error::parse_at(
                line,
                format!("parameter '{}': default values are not supported", piece),
            ));
        }
        let (name, annotation) = match piece.split_once(':') {
            Some((n, t)) => (n.trim(), Some(t.trim())),
            None => (piece, None),
        };
        if !IDENT.is_match(name) {
            return Err(Error::parse_at(
                line,
                format!("invalid parameter name '{}'", name),
            ));
        }
        if annotation.is_some_and(str::is_empty) {
            return Err(Error::parse_at(
                line,
                format!("parameter '{}' has an empty type annotation", name),
            ));
        }
        if params.iter().any(|p| p.name == name) {
            return Err(Error::parse_at(
                line,
                format!("duplicate parameter '{}'", name),
            ));
        }
        let kind = ParamKind::from_name(name);
        let declared_type = if kind == ParamKind::FreeText {
            annotation.map(ParamType::from_annotation).unwrap_or(ParamType::Str)
        } else {
            if let Some(annotation) = annotation {
                tracing::debug!(param = name, annotation, "annotation ignored on reserved parameter");
            }
            ParamType::Resource
        };
        params.push(Parameter {
            name: name.to_string(),
            declared_type,
            kind,
            position: params.len(),
        });
    }
    Ok(params)
}

/// Index of the `}` closing a body opened just before `from`. Quoted literals
/// and SQL comments are skipped.
fn find_closing_brace(text: &str, from: usize, end: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = from;
    while i < end {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < end && bytes[i] != quote {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < end && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < end && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn parse_binding(scanner: &mut Scanner<'_>) -> Result<PromptBinding> {
    let line = scanner.line();
    let rest = scanner.rest();
    let caps = BINDING_HEADER.captures(rest).ok_or_else(|| {
        Error::parse_at(line, "expected a binding block `binding name {`")
    })?;
    let header_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let operation = caps[1].to_string();

    let body_start = scanner.pos + header_len;
    let close = scanner.text[body_start..scanner.end]
        .find('}')
        .map(|i| body_start + i)
        .ok_or_else(|| {
            Error::parse_at(line, format!("binding '{}' is not closed with '}}'", operation))
        })?;

    let mut fields = Vec::new();
    let mut offset = body_start;
    for raw in scanner.text[body_start..close].split_inclusive('\n') {
        let field_line = line_of(scanner.text, offset);
        offset += raw.len();
        let entry = raw.trim();
        if entry.is_empty() || entry.starts_with("--") {
            continue;
        }
        let caps = BINDING_FIELD.captures(entry).ok_or_else(|| {
            Error::parse_at(field_line, format!("expected `param: widget`, got '{}'", entry))
        })?;
        let widget = Widget::from_keyword(&caps[2]).ok_or_else(|| {
            Error::parse_at(
                field_line,
                format!("unknown widget '{}' (stepper, number, text)", &caps[2]),
            )
        })?;
        fields.push(PromptField {
            param: caps[1].to_string(),
            widget,
        });
    }
    scanner.pos = close + 1;

    Ok(PromptBinding { operation, fields })
}
