//! Intrinsic function tokens
//!
//! Cross-resource values are never plain strings: a bucket ARN is a
//! `Fn::GetAtt` on the bucket's logical id, resolved by the deployment engine.
//! Walking these tokens gives the dependency edges of the graph.

use serde_json::{Value, json};
use std::collections::BTreeSet;

/// `{"Ref": id}`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [id, attribute]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::Sub": template}`
pub fn sub(template: impl Into<String>) -> Value {
    json!({ "Fn::Sub": template.into() })
}

/// `{"Fn::Join": [delimiter, parts]}`
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `AWS::Region`, `AWS::AccountId`, ...
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with("AWS::")
}

/// Collect every logical id referenced by `value` through `Ref`,
/// `Fn::GetAtt` or `${...}` placeholders inside `Fn::Sub`.
///
/// Pseudo parameters and `${!Literal}` escapes are skipped.
pub fn referenced_ids(value: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    collect(value, &mut ids);
    ids
}

fn collect(value: &Value, ids: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let Some((key, inner)) = map.iter().next() else {
                return;
            };
            match key.as_str() {
                "Ref" => {
                    if let Some(id) = inner.as_str()
                        && !is_pseudo_parameter(id)
                    {
                        ids.insert(id.to_string());
                    }
                }
                "Fn::GetAtt" => {
                    let id = match inner {
                        Value::Array(parts) => parts.first().and_then(Value::as_str),
                        Value::String(dotted) => dotted.split('.').next(),
                        _ => None,
                    };
                    if let Some(id) = id {
                        ids.insert(id.to_string());
                    }
                }
                "Fn::Sub" => match inner {
                    Value::String(template) => {
                        ids.extend(sub_placeholders(template));
                    }
                    Value::Array(parts) => {
                        let locals: BTreeSet<String> = parts
                            .get(1)
                            .and_then(Value::as_object)
                            .map(|vars| vars.keys().cloned().collect())
                            .unwrap_or_default();
                        if let Some(template) = parts.first().and_then(Value::as_str) {
                            ids.extend(
                                sub_placeholders(template)
                                    .into_iter()
                                    .filter(|id| !locals.contains(id)),
                            );
                        }
                        if let Some(vars) = parts.get(1) {
                            collect(vars, ids);
                        }
                    }
                    _ => {}
                },
                _ => collect(inner, ids),
            }
        }
        Value::Object(map) => {
            for inner in map.values() {
                collect(inner, ids);
            }
        }
        Value::Array(items) => {
            for inner in items {
                collect(inner, ids);
            }
        }
        _ => {}
    }
}

/// Logical ids named by `${Id}` / `${Id.Attr}` in a `Fn::Sub` template
fn sub_placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let body = &after[..end];
        if !body.starts_with('!') {
            let id = body.split('.').next().unwrap_or(body);
            if !id.is_empty() && !is_pseudo_parameter(id) {
                found.push(id.to_string());
            }
        }
        rest = &after[end + 1..];
    }

    found
}
