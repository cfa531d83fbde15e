//! `nodes.condition.execute` — evaluate a boolean expression

use async_trait::async_trait;
use serde_json::{json, Value};

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

use crate::expr::{evaluate, parse_expression, truthy, ExprError, Scope};

pub struct ConditionNode;

#[async_trait]
impl NodeHandler for ConditionNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new(
            "nodes.condition.execute",
            SemVer::V1,
            "Evaluate a boolean expression against upstream outputs",
        )
        .with_params(vec![ParamSpec::required("condition", ParamType::String)
            .with_description("Expression, e.g. `b.y > 4 && inputs.flag`")])
        .idempotent()
    }

    async fn execute(&self, params: Value, meta: DispatchMeta) -> Result<Value, NodeError> {
        let condition = params
            .get("condition")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("condition is required"))?;

        let expr = parse_expression(condition).map_err(to_node_error)?;
        let scope = Scope::new(&meta.inputs, &meta.nodes);
        let value = evaluate(&expr, &scope).map_err(to_node_error)?;

        Ok(json!({ "result": truthy(&value) }))
    }
}

pub(crate) fn to_node_error(err: ExprError) -> NodeError {
    match err {
        ExprError::Parse(msg) => NodeError::validation(msg),
        ExprError::Eval(msg) => NodeError::execution(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn meta(inputs: Value, nodes: Value) -> DispatchMeta {
        let mut meta = DispatchMeta::new(Uuid::now_v7(), "cond");
        meta.inputs = inputs;
        meta.nodes = nodes;
        meta
    }

    #[tokio::test]
    async fn true_when_the_upstream_output_satisfies_the_comparison() {
        let nodes = json!({ "b": { "output": { "y": 6 } } });
        let out = ConditionNode
            .execute(json!({ "condition": "b.y > 4" }), meta(json!({}), nodes))
            .await
            .unwrap();
        assert_eq!(out, json!({ "result": true }));
    }

    #[tokio::test]
    async fn false_for_missing_paths() {
        let out = ConditionNode
            .execute(
                json!({ "condition": "ghost.value" }),
                meta(json!({}), json!({})),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({ "result": false }));
    }

    #[tokio::test]
    async fn syntax_errors_are_validation_failures() {
        let err = ConditionNode
            .execute(json!({ "condition": "a >" }), meta(json!({}), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_condition_param_is_rejected() {
        let err = ConditionNode
            .execute(json!({}), meta(json!({}), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }
}
