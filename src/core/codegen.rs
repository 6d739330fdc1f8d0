//! OD-010: Definition text generation — prompt bindings and block rendering.
//!
//! Each augmentation produces two blocks:
//! - the operation block, spliced above the dispatch-begin marker
//! - the binding block, spliced above the dispatch-end marker

use super::parser::ScriptSource;
use super::types::{OperationSpec, ParamKind, ParamType, PromptBinding, PromptField, Widget};

/// Widget for a prompted parameter of the given declared type.
pub fn widget_for(declared_type: ParamType) -> Widget {
    match declared_type {
        ParamType::Int => Widget::Stepper,
        ParamType::Float => Widget::Number,
        ParamType::Str | ParamType::Resource => Widget::Text,
    }
}

/// Derive the prompt binding of an operation: one field per prompted parameter.
///
/// Resource-bound kinds get no field; the resolver satisfies them.
pub fn synthesize_binding(spec: &OperationSpec) -> PromptBinding {
    let fields = spec
        .params
        .iter()
        .filter(|p| p.kind.is_prompted())
        .map(|p| PromptField {
            param: p.name.clone(),
            widget: match p.kind {
                ParamKind::RecordId => Widget::Text,
                _ => widget_for(p.declared_type),
            },
        })
        .collect();
    PromptBinding {
        operation: spec.name.clone(),
        fields,
    }
}

/// Operation block as it is written into the definition.
pub fn render_operation(source: &ScriptSource) -> String {
    format!("{}\n", source.source.trim_end())
}

/// Binding block as it is written into the definition.
pub fn render_binding(binding: &PromptBinding) -> String {
    let mut out = format!("binding {} {{\n", binding.operation);
    for field in &binding.fields {
        out.push_str(&format!("    {}: {}\n", field.param, field.widget));
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::{parse_definition, parse_operation, DISPATCH_BEGIN, DISPATCH_END};

    #[test]
    fn test_od010_widgets_by_type() {
        let src = parse_operation("fn add_numbers(a: int, b: float, c: str, d) { SELECT 1; }").unwrap();
        let binding = synthesize_binding(&src.spec);
        let widgets: Vec<(&str, Widget)> = binding
            .fields
            .iter()
            .map(|f| (f.param.as_str(), f.widget))
            .collect();
        assert_eq!(
            widgets,
            vec![
                ("a", Widget::Stepper),
                ("b", Widget::Number),
                ("c", Widget::Text),
                ("d", Widget::Text),
            ]
        );
    }

    #[test]
    fn test_od010_resource_params_get_no_field() {
        let src =
            parse_operation("fn lookup(cursor, collection, record_id, data, rf) { SELECT 1; }")
                .unwrap();
        let binding = synthesize_binding(&src.spec);
        assert_eq!(binding.fields.len(), 1);
        assert_eq!(binding.fields[0].param, "record_id");
        assert_eq!(binding.fields[0].widget, Widget::Text);
    }

    #[test]
    fn test_od010_record_id_annotation_keeps_text_widget() {
        let src = parse_operation("fn find_order(cursor, record_id: int, qty: int) { SELECT 1; }")
            .unwrap();
        assert_eq!(src.spec.params[1].declared_type, ParamType::Resource);
        let binding = synthesize_binding(&src.spec);
        assert_eq!(binding.widget_for("record_id"), Some(Widget::Text));
        assert_eq!(binding.widget_for("qty"), Some(Widget::Stepper));
    }

    #[test]
    fn test_od010_render_binding() {
        let src = parse_operation("fn add_numbers(a: int, b: float) { SELECT :a + :b; }").unwrap();
        assert_eq!(
            render_binding(&synthesize_binding(&src.spec)),
            "binding add_numbers {\n    a: stepper\n    b: number\n}\n"
        );
        let empty = parse_operation("fn ping() { SELECT 1; }").unwrap();
        assert_eq!(
            render_binding(&synthesize_binding(&empty.spec)),
            "binding ping {\n}\n"
        );
    }

    #[test]
    fn test_od010_rendered_blocks_parse_back() {
        let src = parse_operation("fn add_numbers(a: int, b: float) {\n    SELECT :a + :b AS total;\n}\n\n").unwrap();
        let binding = synthesize_binding(&src.spec);
        let text = format!(
            "{}\n{}\n{}{}\n",
            render_operation(&src),
            DISPATCH_BEGIN,
            render_binding(&binding),
            DISPATCH_END
        );
        let def = parse_definition(&text).unwrap();
        assert_eq!(def.operations[0].spec, src.spec);
        assert_eq!(def.binding_for("add_numbers"), Some(&binding));
    }
}
