//! Template resolution over node params
//!
//! Grammar: `{{<prefix>.<dotted-path>}}` where `<prefix>` is one of
//! `inputs | input | nodes | steps`. Paths are dot-separated with at most one
//! bracket index per segment (`items[0].name`). A string that is exactly one
//! template yields the resolved value with its original type; templates inside
//! surrounding text stringify, with null/missing stringifying to empty.
//! Unresolved paths never raise.
//!
//! Templates are hand-scanned; the grammar is too small to justify a parser
//! dependency.

use serde_json::Value;

use crate::context::ExecutionContext;

/// Resolve every string in a params tree against the execution context.
/// Arrays and objects are resolved recursively, depth-first.
pub fn resolve_params(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_params(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_params(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// One scanned piece of a template string.
enum Part<'a> {
    Text(&'a str),
    Template(&'a str),
}

fn scan(input: &str) -> Vec<Part<'_>> {
    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            parts.push(Part::Text(&rest[..open]));
        }
        parts.push(Part::Template(rest[open + 2..open + 2 + close].trim()));
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() {
        parts.push(Part::Text(rest));
    }
    parts
}

fn resolve_string(input: &str, ctx: &ExecutionContext) -> Value {
    let parts = scan(input);

    // Full-string template: the value keeps its original type.
    if let [Part::Template(expr)] = parts.as_slice() {
        return lookup(expr, ctx).unwrap_or(Value::Null);
    }

    if !parts.iter().any(|p| matches!(p, Part::Template(_))) {
        return Value::String(input.to_string());
    }

    let mut out = String::new();
    for part in parts {
        match part {
            Part::Text(text) => out.push_str(text),
            Part::Template(expr) => out.push_str(&stringify(lookup(expr, ctx))),
        }
    }
    Value::String(out)
}

fn stringify(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Resolve one `prefix.path` expression. Unknown prefixes and missing paths
/// yield `None`.
fn lookup(expr: &str, ctx: &ExecutionContext) -> Option<Value> {
    let mut segments = expr.split('.');
    let prefix = segments.next()?;
    match prefix {
        "inputs" | "input" => walk(&ctx.inputs, segments),
        "nodes" | "steps" => {
            let (node_id, node_idx) = split_index(segments.next()?)?;
            if node_idx.is_some() {
                return None;
            }
            let result = ctx.nodes.get(node_id)?;
            let root = serde_json::to_value(result).ok()?;
            walk(&root, segments)
        }
        _ => None,
    }
}

fn walk<'a>(root: &Value, segments: impl Iterator<Item = &'a str>) -> Option<Value> {
    let mut current = root;
    for segment in segments {
        let (name, index) = split_index(segment)?;
        if !name.is_empty() {
            current = current.as_object()?.get(name)?;
        }
        if let Some(i) = index {
            current = current.as_array()?.get(i)?;
        }
    }
    Some(current.clone())
}

/// Split `items[0]` into `("items", Some(0))`; plain segments have no index.
fn split_index(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let close = segment.find(']')?;
            if close < open || close != segment.len() - 1 {
                return None;
            }
            let index = segment[open + 1..close].parse::<usize>().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}
