//! Template expression evaluation.
//!
//! Expression evaluation sits behind a narrow interface:
//! [`ExprEval::eval`] takes the expression source and a scope and
//! returns a value. The default implementation compiles expressions
//! with minijinja; anything richer (user macros, packages) plugs in
//! behind the same trait.

use minijinja::Environment;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// The variable scope visible to an expression: `config`, `env`,
/// `target`, `this`, plus loop variables introduced by `for` blocks.
pub type Scope = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expression `{expr}` failed: {message}")]
pub struct EvalError {
    pub expr: String,
    pub message: String,
}

/// Evaluates one template expression against a scope.
pub trait ExprEval: Send + Sync {
    fn eval(&self, expr: &str, scope: &Scope) -> Result<Value, EvalError>;
}

/// The minijinja-backed evaluator used by the engine.
#[derive(Default)]
pub struct MinijinjaEval;

impl ExprEval for MinijinjaEval {
    fn eval(&self, expr: &str, scope: &Scope) -> Result<Value, EvalError> {
        let env = Environment::empty();
        let compiled = env.compile_expression(expr).map_err(|err| EvalError {
            expr: expr.to_string(),
            message: err.to_string(),
        })?;
        let result = compiled
            .eval(minijinja::Value::from_serialize(scope))
            .map_err(|err| EvalError {
                expr: expr.to_string(),
                message: err.to_string(),
            })?;
        serde_json::to_value(&result).map_err(|err| EvalError {
            expr: expr.to_string(),
            message: err.to_string(),
        })
    }
}

/// Renders an evaluated value into SQL text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
