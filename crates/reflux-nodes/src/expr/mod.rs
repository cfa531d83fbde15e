//! Expression language for the transform and condition nodes
//!
//! A small fixed grammar, hand-parsed and evaluated over `serde_json::Value`:
//! literals (numbers, strings, booleans, null), property paths with one
//! bracket index per segment, comparison (`=== !== == != > < >= <=`), boolean
//! operators (`&& || !`), arithmetic (`+ - * / %`), and parentheses. There are
//! no loops, no calls, and no dynamic code, so evaluation is linear in the
//! expression size; the isolation boundary is the grammar itself.
//!
//! Bare paths resolve against the run's inputs merged with upstream node
//! outputs keyed by node id, so `b.y > 4` reads node `b`'s output and
//! `inputs.a.data.n` reads node `a`'s output through the `inputs` alias.

mod eval;
mod lexer;
mod parser;

pub use eval::{evaluate, truthy, Scope};
pub use parser::{parse_assignment, parse_expression, Expr, PathSegment};

use thiserror::Error;

/// Upper bound on expression source length; longer inputs are rejected
/// before parsing.
pub const MAX_SOURCE_LEN: usize = 10_000;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("invalid expression: {0}")]
    Parse(String),

    #[error("expression failed: {0}")]
    Eval(String),
}
