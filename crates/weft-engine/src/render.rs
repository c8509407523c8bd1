//! Template rendering for execution.
//!
//! Where analysis substitutes placeholders, execution renders the
//! template tree for real: expressions are evaluated through the
//! [`ExprEval`] collaborator, `for` blocks iterate their sequence with
//! the loop variable in scope, and `if`/`elif`/`else` pick a branch by
//! truthiness.

use crate::eval::{value_to_text, EvalError, ExprEval, Scope};
use serde_json::Value;
use weft_core::template::{parse, TemplateNode};

/// Renders a model body against a scope.
///
/// Template parse errors here are render failures: execution must not
/// guess at malformed control flow.
pub fn render_body(
    body: &str,
    evaluator: &dyn ExprEval,
    scope: &Scope,
) -> Result<String, RenderError> {
    let (nodes, errors) = parse(body);
    if let Some(error) = errors.first() {
        return Err(RenderError::Template(error.to_string()));
    }
    let mut out = String::with_capacity(body.len());
    render_nodes(&nodes, evaluator, &mut scope.clone(), &mut out)?;
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("`for` iterated a non-sequence value in `{0}`")]
    NotIterable(String),
}

fn render_nodes(
    nodes: &[TemplateNode],
    evaluator: &dyn ExprEval,
    scope: &mut Scope,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            TemplateNode::Text { text, .. } => out.push_str(text),
            TemplateNode::Expr { source, .. } => {
                let value = evaluator.eval(source, scope)?;
                out.push_str(&value_to_text(&value));
            }
            TemplateNode::For {
                var, iter, body, ..
            } => {
                let value = evaluator.eval(iter, scope)?;
                let Value::Array(items) = value else {
                    return Err(RenderError::NotIterable(iter.clone()));
                };
                let shadowed = scope.get(var).cloned();
                for item in items {
                    scope.insert(var.clone(), item);
                    render_nodes(body, evaluator, scope, out)?;
                }
                match shadowed {
                    Some(previous) => scope.insert(var.clone(), previous),
                    None => scope.remove(var),
                };
            }
            TemplateNode::If {
                cond,
                body,
                elifs,
                else_body,
                ..
            } => {
                if is_truthy(&evaluator.eval(cond, scope)?) {
                    render_nodes(body, evaluator, scope, out)?;
                    continue;
                }
                let mut taken = false;
                for branch in elifs {
                    if is_truthy(&evaluator.eval(&branch.cond, scope)?) {
                        render_nodes(&branch.body, evaluator, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(else_nodes) = else_body {
                        render_nodes(else_nodes, evaluator, scope, out)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::MinijinjaEval;
    use serde_json::json;

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.insert("this".into(), json!({"schema": "main", "name": "users"}));
        scope.insert("cols".into(), json!(["id", "email"]));
        scope.insert("flag".into(), json!(false));
        scope
    }

    #[test]
    fn renders_expressions_inline() {
        let rendered = render_body(
            "SELECT * FROM {{ this.schema }}.{{ this.name }}",
            &MinijinjaEval,
            &scope(),
        )
        .unwrap();
        assert_eq!(rendered, "SELECT * FROM main.users");
    }

    #[test]
    fn renders_for_blocks_with_loop_variable() {
        let rendered = render_body(
            "SELECT {* for c in cols: *}{{ c }}, {* endfor *}1",
            &MinijinjaEval,
            &scope(),
        )
        .unwrap();
        assert_eq!(rendered, "SELECT id, email, 1");
    }

    #[test]
    fn loop_variable_does_not_leak() {
        let mut initial = scope();
        initial.insert("c".into(), json!("outer"));
        let rendered = render_body(
            "{* for c in cols: *}{{ c }}{* endfor *}|{{ c }}",
            &MinijinjaEval,
            &initial,
        )
        .unwrap();
        assert_eq!(rendered, "idemail|outer");
    }

    #[test]
    fn if_elif_else_picks_one_branch() {
        let body = "{* if flag: *}a{* elif cols: *}b{* else: *}c{* endif *}";
        assert_eq!(render_body(body, &MinijinjaEval, &scope()).unwrap(), "b");

        let mut truthy = scope();
        truthy.insert("flag".into(), json!(true));
        assert_eq!(render_body(body, &MinijinjaEval, &truthy).unwrap(), "a");

        let mut neither = scope();
        neither.insert("cols".into(), json!([]));
        assert_eq!(render_body(body, &MinijinjaEval, &neither).unwrap(), "c");
    }

    #[test]
    fn iterating_a_scalar_is_an_error() {
        let err = render_body(
            "{* for x in this.schema: *}{{ x }}{* endfor *}",
            &MinijinjaEval,
            &scope(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::NotIterable(_)));
    }

    #[test]
    fn unmatched_blocks_fail_rendering() {
        let err = render_body("{* if flag: *}a", &MinijinjaEval, &scope()).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }
}
