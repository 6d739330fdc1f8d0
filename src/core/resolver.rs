//! OD-003: Parameter resolution — one concrete value per declared parameter.
//!
//! Each parameter's kind picks its source:
//! - cursor and collection parameters acquire a managed resource
//! - record ids and free text are prompted, using the widget from the binding
//! - bulk rows go through the text or CSV ingestion path
//! - accumulators start empty
//!
//! Resolution is all-or-nothing: if any parameter fails, every resource
//! acquired so far is released before the error is returned.

use super::error::Result;
use super::types::*;
use crate::prompt::{Notice, Prompt, Prompter};
use crate::resources::ingest::{ingest_rows, ingest_text, parse_csv};
use crate::resources::{release_all, ManagedResource, ResourceProvider};

/// Bulk input modes offered to the operator, in menu order.
pub const INPUT_METHODS: [&str; 2] = ["Text Input", "CSV Upload"];

/// What the resolver draws on.
pub struct Environment<'e> {
    pub resources: &'e dyn ResourceProvider,
    pub prompter: &'e mut dyn Prompter,
}

impl<'e> Environment<'e> {
    pub fn new(resources: &'e dyn ResourceProvider, prompter: &'e mut dyn Prompter) -> Self {
        Self {
            resources,
            prompter,
        }
    }
}

/// A fully bound invocation: arguments plus the resources to release afterwards.
#[derive(Default)]
pub struct Resolved {
    pub binding: Binding,
    pub resources: Vec<Box<dyn ManagedResource>>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.resources.iter().map(|r| r.describe()).collect();
        f.debug_struct("Resolved")
            .field("binding", &self.binding)
            .field("resources", &names)
            .finish()
    }
}

/// Bind every parameter of `spec`, in declaration order.
pub fn bind_parameters(
    spec: &OperationSpec,
    prompts: Option<&PromptBinding>,
    env: &mut Environment<'_>,
) -> Result<Resolved> {
    let mut resolved = Resolved::default();
    for param in &spec.params {
        if let Err(e) = bind_one(param, prompts, env, &mut resolved) {
            let acquired = resolved.resources.len();
            release_all(std::mem::take(&mut resolved.resources));
            tracing::debug!(
                operation = %spec.name,
                param = %param.name,
                released = acquired,
                "binding failed"
            );
            return Err(e);
        }
    }
    tracing::debug!(
        operation = %spec.name,
        params = resolved.binding.len(),
        resources = resolved.resources.len(),
        "parameters bound"
    );
    Ok(resolved)
}

fn bind_one(
    param: &Parameter,
    prompts: Option<&PromptBinding>,
    env: &mut Environment<'_>,
    resolved: &mut Resolved,
) -> Result<()> {
    let value = match param.kind {
        ParamKind::DatabaseCursor => {
            let resource = env.resources.open_cursor()?;
            tracing::debug!(param = %param.name, resource = %resource.describe(), "acquired");
            resolved.resources.push(resource);
            ArgValue::Cursor(resolved.resources.len() - 1)
        }
        ParamKind::DocumentHandle => ArgValue::Collection(env.resources.open_collection()?),
        ParamKind::RecordId => {
            let prompt = Prompt::new(&param.name, "Enter Record ID");
            ArgValue::Text(env.prompter.text(&prompt)?.unwrap_or_default())
        }
        ParamKind::FreeText => {
            let widget = prompts
                .and_then(|b| b.widget_for(&param.name))
                .unwrap_or(Widget::Text);
            prompt_value(param, widget, env.prompter)?
        }
        ParamKind::BulkRows => ArgValue::Rows(collect_rows(&param.name, env.prompter)?),
        ParamKind::Accumulator => ArgValue::Accumulator(Vec::new()),
    };
    resolved.binding.insert(&param.name, value);
    Ok(())
}

fn prompt_value(param: &Parameter, widget: Widget, prompter: &mut dyn Prompter) -> Result<ArgValue> {
    Ok(match widget {
        Widget::Stepper => {
            let prompt = Prompt::new(&param.name, format!("{} (int)", param.name));
            ArgValue::Int(prompter.integer(&prompt, 0)?.unwrap_or(0))
        }
        Widget::Number => {
            let prompt = Prompt::new(&param.name, format!("{} (float)", param.name));
            ArgValue::Float(prompter.number(&prompt, 0.0)?.unwrap_or(0.0))
        }
        Widget::Text => {
            let prompt = Prompt::new(&param.name, format!("{} (str)", param.name));
            ArgValue::Text(prompter.text(&prompt)?.unwrap_or_default())
        }
    })
}

/// Run the bulk ingestion flow for one parameter.
pub fn collect_rows(name: &str, prompter: &mut dyn Prompter) -> Result<Vec<String>> {
    let method = prompter
        .choose(&Prompt::new(format!("{}.method", name), "Input method"), &INPUT_METHODS)?
        .unwrap_or(0);

    if method == 0 {
        let text = prompter
            .text_area(&Prompt::new(name, "Paste items (one per line)"))?
            .unwrap_or_default();
        return Ok(ingest_text(&text));
    }

    let Some(content) = prompter.upload(&Prompt::new(format!("{}.upload", name), "Upload CSV file"))?
    else {
        return Ok(Vec::new());
    };
    let has_header =
        prompter.checkbox(&Prompt::new(format!("{}.header", name), "CSV contains header row"))?;
    let items = ingest_rows(&parse_csv(&content), has_header);
    if items.is_empty() {
        prompter.notice(Notice::Warning("Uploaded CSV file is empty".to_string()))?;
    } else {
        prompter.notice(Notice::Success(format!(
            "Loaded {} items from CSV",
            items.len()
        )))?;
    }
    Ok(items)
}
