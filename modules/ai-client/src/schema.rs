//! Tool input schemas derived from Rust types.
//!
//! schemars emits a draft-07 document with a `definitions` map and
//! `$ref` pointers into it. The messages API wants one self-contained
//! object schema per tool, so the generator inlines every reference and
//! strips the document metadata. Optionality is left as the type
//! declares it — fields stay non-required when they are `Option`.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types usable as forced tool output.
///
/// Automatically implemented for any `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn output_schema() -> Value {
        let mut schema = serde_json::to_value(schema_for!(Self)).unwrap_or_default();
        let definitions = schema.get("definitions").cloned().unwrap_or(Value::Null);

        resolve(&mut schema, &definitions);

        if let Value::Object(map) = &mut schema {
            map.remove("definitions");
            map.remove("$schema");
        }
        schema
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Replace `$ref` pointers with their definition bodies, recursively.
/// schemars wraps referenced types in single-element `allOf` arrays;
/// those unwrap to the inner schema before resolution continues.
fn resolve(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get("$ref") {
                if let Some(name) = pointer.strip_prefix("#/definitions/") {
                    if let Some(definition) = definitions.get(name) {
                        *value = definition.clone();
                        resolve(value, definitions);
                        return;
                    }
                }
            }

            if let Some(Value::Array(wrapped)) = map.get("allOf") {
                if wrapped.len() == 1 {
                    *value = wrapped[0].clone();
                    resolve(value, definitions);
                    return;
                }
            }

            for child in map.values_mut() {
                resolve(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                resolve(item, definitions);
            }
        }
        _ => {}
    }
}
