//! Async expression evaluator.
//!
//! Evaluation is re-entrant: the concurrent builtins evaluate callbacks
//! against the same context object simultaneously, which only ever reads
//! the shared core scope and the self object.

use super::context::RuntimeContext;
use super::error::ExprError;
use super::parser::{self, Expr, Literal};
use super::value::Value;
use futures_util::future::BoxFuture;

/// Evaluate a parsed expression against a context.
pub fn eval<'a>(
    expr: &'a Expr,
    ctx: &'a RuntimeContext,
) -> BoxFuture<'a, Result<Value, ExprError>> {
    Box::pin(async move {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Ident(name) => ctx.get(name),
            Expr::Call { name, args } => {
                // `let` is a binding form: its first argument is a name,
                // not a value, so it cannot go through normal call
                // evaluation.
                if name == "let" {
                    return eval_let(args, ctx).await;
                }
                let callee = ctx.get(name)?;
                let Value::Method(method) = callee else {
                    return Err(ExprError::Type(format!(
                        "`{name}` is not callable (found {})",
                        callee.type_name()
                    )));
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(eval(arg, ctx).await?);
                }
                method(ctx.clone(), values).await
            }
        }
    })
}

/// Parse and evaluate an expression source string.
pub async fn eval_source(source: &str, ctx: &RuntimeContext) -> Result<Value, ExprError> {
    let expr = parser::parse(source)?;
    eval(&expr, ctx).await
}

/// `let(name, value)`: bind `name` in the calling context's local scope
/// and return the bound value.
async fn eval_let(args: &[Expr], ctx: &RuntimeContext) -> Result<Value, ExprError> {
    let [Expr::Ident(name), value_expr] = args else {
        return Err(ExprError::Type(
            "let expects (name, value) with a plain identifier name".to_string(),
        ));
    };
    let value = eval(value_expr, ctx).await?;
    ctx.bind(name.clone(), value.clone());
    Ok(value)
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Date(d) => Value::Date(*d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::builtins;

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(builtins::core_bindings())
    }

    #[tokio::test]
    async fn evaluates_literals() {
        assert_eq!(
            eval_source("'hello'", &ctx()).await.unwrap(),
            Value::Str("hello".into())
        );
        assert_eq!(eval_source("42", &ctx()).await.unwrap(), Value::Int(42));
    }

    #[tokio::test]
    async fn let_binds_into_calling_context() {
        let ctx = ctx();
        assert_eq!(
            eval_source("let(x, 3)", &ctx).await.unwrap(),
            Value::Int(3)
        );
        assert_eq!(eval_source("x", &ctx).await.unwrap(), Value::Int(3));
    }

    #[tokio::test]
    async fn calling_a_non_function_is_a_type_error() {
        let ctx = ctx();
        ctx.bind("n", Value::Int(1));
        let err = eval_source("n(2)", &ctx).await.unwrap_err();
        assert!(matches!(err, ExprError::Type(_)), "got {err}");
    }

    #[tokio::test]
    async fn unbound_identifier_fails_with_not_found() {
        let err = eval_source("nothing", &ctx()).await.unwrap_err();
        assert!(matches!(err, ExprError::NotFound(name) if name == "nothing"));
    }
}
