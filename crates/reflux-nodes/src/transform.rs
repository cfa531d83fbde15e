//! `nodes.transform.execute` — assignment statements over an outputs bag
//!
//! The `code` param holds statements of the form `outputs.<path> = <expr>`,
//! one per line (or `;`-separated). Expressions use the shared grammar and
//! read from run inputs and upstream node outputs; the node returns whatever
//! the code assigned into `outputs`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

use crate::condition::to_node_error;
use crate::expr::{evaluate, Expr, PathSegment, Scope};

pub struct TransformNode;

#[async_trait]
impl NodeHandler for TransformNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new(
            "nodes.transform.execute",
            SemVer::V1,
            "Assign expressions into an outputs bag",
        )
        .with_params(vec![ParamSpec::required("code", ParamType::String)
            .with_description("Statements like `outputs.y = inputs.a.data.n * 2`")])
        .idempotent()
    }

    async fn execute(&self, params: Value, meta: DispatchMeta) -> Result<Value, NodeError> {
        let code = params
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("code is required"))?;

        let scope = Scope::new(&meta.inputs, &meta.nodes);
        let mut outputs = Map::new();

        for statement in code.split(['\n', ';']) {
            let statement = statement.trim();
            if statement.is_empty() || statement.starts_with("//") || statement.starts_with('#') {
                continue;
            }
            let (target, expr) = parse_statement(statement)?;
            let value = evaluate(&expr, &scope).map_err(to_node_error)?;
            assign(&mut outputs, &target, value)?;
        }

        Ok(Value::Object(outputs))
    }
}

/// Parse one statement; the target must be a dotted path rooted at `outputs`.
fn parse_statement(statement: &str) -> Result<(Vec<String>, Expr), NodeError> {
    let (segments, expr) =
        crate::expr::parse_assignment(statement).map_err(to_node_error)?;

    let mut keys = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            PathSegment::Key(k) => keys.push(k),
            PathSegment::Index(_) => {
                return Err(NodeError::validation(
                    "assignment targets do not support indexing",
                ))
            }
        }
    }
    if keys.first().map(String::as_str) != Some("outputs") || keys.len() < 2 {
        return Err(NodeError::validation(
            "assignments must target `outputs.<path>`",
        ));
    }
    keys.remove(0);
    Ok((keys, expr))
}

/// Set `keys` into the bag, creating intermediate objects as needed.
fn assign(bag: &mut Map<String, Value>, keys: &[String], value: Value) -> Result<(), NodeError> {
    let (last, parents) = keys.split_last().expect("target has at least one key");
    let mut current = bag;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            NodeError::execution(format!("cannot assign into non-object field {key}"))
        })?;
    }
    current.insert(last.clone(), value);
    Ok(())
}
