//! JSON schema generation for tool parameters.
//!
//! Tool argument schemas are derived from Rust types with `schemars`
//! and then massaged into the shape the OpenAI API expects: no
//! `$schema` or `definitions` sections, all `$ref`s inlined, and
//! `additionalProperties: false` on every object.

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// Generate an OpenAI-compatible parameter schema for `T`.
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    close_objects(&mut value);

    let definitions = value.get("definitions").cloned();
    if let Some(defs) = definitions {
        inline_refs(&mut value, &defs);
    }

    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }

    value
}

/// Add `additionalProperties: false` to every object schema, recursively.
fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                close_objects(item);
            }
        }
        _ => {}
    }
}

/// Replace `$ref` nodes with the referenced definition, recursively.
/// The OpenAI API does not traverse refs, so schemas must be self-contained.
fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(definition) = definitions.get(name) {
                        *value = definition.clone();
                        inline_refs(value, definitions);
                        return;
                    }
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}
