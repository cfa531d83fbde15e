//! Evaluator over `serde_json::Value`

use serde_json::{json, Value};

use super::parser::{BinaryOp, Expr, PathSegment, UnaryOp};
use super::ExprError;

/// Name resolution scope: run inputs merged with upstream node outputs.
///
/// A bare root segment resolves first against the inputs object, then against
/// node ids (yielding that node's `output`). The `inputs`/`input` aliases
/// restart resolution against the merged view, and `nodes`/`steps` address
/// node entries explicitly.
pub struct Scope<'a> {
    pub inputs: &'a Value,
    /// Serialized node results keyed by node id (`{ output, startedAt, … }`)
    pub nodes: &'a Value,
}

impl<'a> Scope<'a> {
    pub fn new(inputs: &'a Value, nodes: &'a Value) -> Self {
        Self { inputs, nodes }
    }

    fn root(&self, name: &str) -> Value {
        if let Some(value) = self.inputs.as_object().and_then(|m| m.get(name)) {
            return value.clone();
        }
        self.nodes
            .as_object()
            .and_then(|m| m.get(name))
            .and_then(|entry| entry.get("output"))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn resolve(&self, segments: &[PathSegment]) -> Value {
        let (first, rest) = match segments.split_first() {
            Some(split) => split,
            None => return Value::Null,
        };
        let PathSegment::Key(name) = first else {
            return Value::Null;
        };

        let (base, rest): (Value, &[PathSegment]) = match name.as_str() {
            "inputs" | "input" => match rest.split_first() {
                None => (self.inputs.clone(), rest),
                Some((PathSegment::Key(root), tail)) => (self.root(root), tail),
                Some(_) => return Value::Null,
            },
            "nodes" | "steps" => match rest.split_first() {
                None => (self.nodes.clone(), rest),
                Some((PathSegment::Key(id), tail)) => (
                    self.nodes
                        .as_object()
                        .and_then(|m| m.get(id))
                        .cloned()
                        .unwrap_or(Value::Null),
                    tail,
                ),
                Some(_) => return Value::Null,
            },
            root => (self.root(root), rest),
        };

        walk(&base, rest)
    }
}

fn walk(base: &Value, segments: &[PathSegment]) -> Value {
    let mut current = base;
    for segment in segments {
        let next = match segment {
            PathSegment::Key(name) => current.as_object().and_then(|m| m.get(name)),
            PathSegment::Index(i) => current.as_array().and_then(|a| a.get(*i)),
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// JS-style truthiness: null and absent are false, numbers are false at zero,
/// strings at empty; arrays and objects are always true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn number_value(n: f64) -> Result<Value, ExprError> {
    if !n.is_finite() {
        return Err(ExprError::Eval("arithmetic produced a non-finite number".into()));
    }
    // Keep integers integral so downstream JSON stays clean
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Ok(json!(n as i64))
    } else {
        Ok(json!(n))
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Evaluate an expression against a scope.
pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Number(n) => number_value(*n),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Path(segments) => Ok(scope.resolve(segments)),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => {
                    let n = as_number(&value).ok_or_else(|| {
                        ExprError::Eval(format!("cannot negate {value}"))
                    })?;
                    number_value(-n)
                }
            }
        }
        Expr::Binary { op, left, right } => match op {
            // Short-circuiting boolean operators
            BinaryOp::And => {
                let l = evaluate(left, scope)?;
                if !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = evaluate(right, scope)?;
                Ok(Value::Bool(truthy(&r)))
            }
            BinaryOp::Or => {
                let l = evaluate(left, scope)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = evaluate(right, scope)?;
                Ok(Value::Bool(truthy(&r)))
            }
            BinaryOp::Eq => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                Ok(Value::Bool(loose_eq(&l, &r)))
            }
            BinaryOp::Ne => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                Ok(Value::Bool(!loose_eq(&l, &r)))
            }
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                let ordering = compare(&l, &r)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Gt => ordering == std::cmp::Ordering::Greater,
                    BinaryOp::Lt => ordering == std::cmp::Ordering::Less,
                    BinaryOp::Ge => ordering != std::cmp::Ordering::Less,
                    BinaryOp::Le => ordering != std::cmp::Ordering::Greater,
                    _ => unreachable!(),
                }))
            }
            BinaryOp::Add => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                // `+` concatenates as soon as either side is a string
                if let (Value::String(_), _) | (_, Value::String(_)) = (&l, &r) {
                    return Ok(Value::String(format!(
                        "{}{}",
                        display(&l),
                        display(&r)
                    )));
                }
                arith(&l, &r, "+", |a, b| a + b)
            }
            BinaryOp::Sub => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                arith(&l, &r, "-", |a, b| a - b)
            }
            BinaryOp::Mul => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                arith(&l, &r, "*", |a, b| a * b)
            }
            BinaryOp::Div => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                arith(&l, &r, "/", |a, b| a / b)
            }
            BinaryOp::Rem => {
                let (l, r) = (evaluate(left, scope)?, evaluate(right, scope)?);
                arith(&l, &r, "%", |a, b| a % b)
            }
        },
    }
}

fn arith(
    left: &Value,
    right: &Value,
    op: &str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, ExprError> {
    let (Some(l), Some(r)) = (as_number(left), as_number(right)) else {
        return Err(ExprError::Eval(format!(
            "cannot apply '{op}' to {left} and {right}"
        )));
    };
    number_value(f(l, r))
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, ExprError> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l
            .partial_cmp(&r)
            .ok_or_else(|| ExprError::Eval("incomparable numbers".into()));
    }
    if let (Value::String(l), Value::String(r)) = (left, right) {
        return Ok(l.cmp(r));
    }
    Err(ExprError::Eval(format!(
        "cannot compare {left} and {right}"
    )))
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_expression;
    use super::*;

    fn eval(source: &str, inputs: Value, nodes: Value) -> Value {
        let expr = parse_expression(source).unwrap();
        evaluate(&expr, &Scope::new(&inputs, &nodes)).unwrap()
    }

    #[test]
    fn node_outputs_resolve_by_bare_id() {
        let nodes = json!({ "b": { "output": { "y": 6 } } });
        assert_eq!(eval("b.y > 4", json!({}), nodes), json!(true));
    }

    #[test]
    fn inputs_alias_reaches_node_outputs_too() {
        let nodes = json!({ "a": { "output": { "data": { "n": 3 } } } });
        assert_eq!(eval("inputs.a.data.n * 2", json!({}), nodes), json!(6));
    }

    #[test]
    fn run_inputs_shadow_node_ids() {
        let nodes = json!({ "x": { "output": 1 } });
        let inputs = json!({ "x": 2 });
        assert_eq!(eval("x", inputs, nodes), json!(2));
    }

    #[test]
    fn comparison_and_boolean_operators() {
        let inputs = json!({ "n": 5, "s": "abc" });
        assert_eq!(eval("n >= 5 && s === 'abc'", inputs.clone(), json!({})), json!(true));
        assert_eq!(eval("n < 5 || !true", inputs.clone(), json!({})), json!(false));
        assert_eq!(eval("n !== 5", inputs, json!({})), json!(false));
    }

    #[test]
    fn missing_paths_are_null_and_falsy() {
        assert_eq!(eval("ghost", json!({}), json!({})), json!(null));
        assert_eq!(eval("!ghost", json!({}), json!({})), json!(true));
        assert_eq!(eval("ghost == null", json!({}), json!({})), json!(true));
    }

    #[test]
    fn arithmetic_keeps_integers_integral() {
        assert_eq!(eval("2 * 3", json!({}), json!({})), json!(6));
        assert_eq!(eval("7 / 2", json!({}), json!({})), json!(3.5));
        assert_eq!(eval("7 % 2", json!({}), json!({})), json!(1));
        assert_eq!(eval("-(2 + 3)", json!({}), json!({})), json!(-5));
    }

    #[test]
    fn string_concatenation_with_plus() {
        let inputs = json!({ "name": "world", "n": 2 });
        assert_eq!(
            eval("'hello ' + name", inputs.clone(), json!({})),
            json!("hello world")
        );
        assert_eq!(eval("'v' + n", inputs, json!({})), json!("v2"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let expr = parse_expression("1 / 0").unwrap();
        let inputs = json!({});
        let nodes = json!({});
        assert!(evaluate(&expr, &Scope::new(&inputs, &nodes)).is_err());
    }

    #[test]
    fn type_mismatches_error_rather_than_coerce() {
        let expr = parse_expression("'a' * 2").unwrap();
        let inputs = json!({});
        let nodes = json!({});
        assert!(evaluate(&expr, &Scope::new(&inputs, &nodes)).is_err());
    }

    #[test]
    fn explicit_nodes_prefix_addresses_entries() {
        let nodes = json!({ "b": { "output": { "y": 6 }, "startedAt": "t" } });
        assert_eq!(eval("nodes.b.output.y", json!({}), nodes.clone()), json!(6));
        assert_eq!(eval("steps.b.output.y", json!({}), nodes), json!(6));
    }
}
