use handlebars::Handlebars;
use serde_json::{Map, Value};

use crate::utils::error::Error;

/// Handlebars registry used for job templates: strict, so that a reference to an undefined
/// variable fails the render, and without HTML escaping since the output is YAML/JSON data.
fn registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

/// Renders every string leaf of `tree` against `values`. Keys, numbers, booleans and nulls
/// are copied through untouched.
///
/// # Arguments
/// - `tree` - A declarative metadata or spec tree, possibly holding `{{ }}` expressions.
/// - `values` - The variable context made available to the templates.
pub fn render_tree(tree: &Value, values: &Map<String, Value>) -> Result<Value, Error> {
    let handlebars = registry();
    render_value(&handlebars, tree, values)
}

fn render_value(
    handlebars: &Handlebars,
    value: &Value,
    values: &Map<String, Value>,
) -> Result<Value, Error> {
    return match value {
        Value::String(template) => {
            if !template.contains("{{") {
                return Ok(value.clone());
            }

            let rendered = handlebars.render_template(template, values)?;
            Ok(Value::String(rendered))
        }
        Value::Array(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(render_value(handlebars, item, values)?);
            }
            Ok(Value::Array(rendered))
        }
        Value::Object(fields) => {
            let mut rendered = Map::new();
            for (key, field) in fields {
                rendered.insert(key.clone(), render_value(handlebars, field, values)?);
            }
            Ok(Value::Object(rendered))
        }
        _ => Ok(value.clone()),
    };
}
