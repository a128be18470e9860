//! Built-in functions exposed through the core scope.
//!
//! The collection builtins (`select`, `filter`, `orderBy`, `groupBy`)
//! launch every per-element callback before awaiting any of them and
//! recombine results by original index, so output order never depends on
//! completion order.

use super::context::RuntimeContext;
use super::error::ExprError;
use super::value::{self, RuntimeMethod, Value, ValueMap};
use crate::site::{Entity, Site};
use chrono::Utc;
use futures_util::future::{BoxFuture, join_all};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::sync::Arc;

/// Wrap a function as a first-class method value.
pub fn method<F>(f: F) -> Value
where
    F: Fn(RuntimeContext, Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>>
        + Send
        + Sync
        + 'static,
{
    Value::Method(Arc::new(f))
}

/// The site-independent core bindings.
pub fn core_bindings() -> FxHashMap<String, Value> {
    let mut core = FxHashMap::default();
    core.insert("select".to_string(), method(select));
    core.insert("filter".to_string(), method(filter));
    core.insert("orderBy".to_string(), method(order_by));
    core.insert("groupBy".to_string(), method(group_by));
    core.insert("reverse".to_string(), method(reverse));
    core.insert("take".to_string(), method(take));
    core.insert("skip".to_string(), method(skip));
    core.insert("any".to_string(), method(any));
    core.insert("index".to_string(), method(index));
    core.insert("getItem".to_string(), method(get_item));
    core.insert("if".to_string(), method(if_branch));
    core.insert("dateTime".to_string(), method(date_time));
    core.insert("now".to_string(), method(now));
    core.insert("formatDate".to_string(), method(format_date));
    core.insert("join".to_string(), method(join));
    core.insert("relative".to_string(), method(relative));
    core.insert("getPath".to_string(), method(get_path));
    core.insert("compile".to_string(), method(compile));
    core
}

/// Core bindings plus the loaded site's registries, constants and
/// location-aware helpers.
pub fn site_bindings(site: &Arc<Site>) -> FxHashMap<String, Value> {
    let mut core = core_bindings();
    let entity = Entity::Site(site.clone());
    for key in ["styles", "assets", "templates", "pages", "groups", "constants"] {
        if let Some(value) = entity.get(key) {
            core.insert(key.to_string(), value);
        }
    }
    core.insert("site".to_string(), Value::Entity(entity));

    // Constants are addressable by bare name; builtins win on collision.
    for (name, value) in site.constants.iter() {
        core.entry(name.to_string()).or_insert_with(|| value.clone());
    }

    core.insert("getLink".to_string(), link_method(site.location.clone()));
    core
}

/// `getLink(item)`: the absolute link of a path-bearing value under the
/// site location, with a trailing `index.html` trimmed off.
pub fn link_method(location: String) -> Value {
    method(move |_ctx, args| {
        let location = location.clone();
        Box::pin(async move {
            expect_arity("getLink", &args, 1)?;
            let path = path_of(&args[0])?;
            let link = format!("{}/{}", location.trim_end_matches('/'), path);
            Ok(Value::Str(
                link.trim_end_matches("index.html").to_string(),
            ))
        })
    })
}

// ============================================================================
// Argument helpers
// ============================================================================

fn expect_arity(name: &'static str, args: &[Value], expected: usize) -> Result<(), ExprError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExprError::Arity {
            name,
            expected,
            got: args.len(),
        })
    }
}

fn sequence_and_callback(
    name: &'static str,
    args: &[Value],
) -> Result<(Vec<Value>, RuntimeMethod), ExprError> {
    expect_arity(name, args, 2)?;
    Ok((args[0].as_sequence()?, args[1].as_method()?))
}

/// Evaluate a callback once per element, all launched up front, results
/// in positional order.
async fn map_concurrently(
    ctx: &RuntimeContext,
    items: &[Value],
    callback: &RuntimeMethod,
) -> Result<Vec<Value>, ExprError> {
    let calls: Vec<_> = items
        .iter()
        .map(|item| callback(ctx.clone(), vec![item.clone()]))
        .collect();
    join_all(calls).await.into_iter().collect()
}

// ============================================================================
// Collection builtins
// ============================================================================

fn select(ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        let (items, callback) = sequence_and_callback("select", &args)?;
        let results = map_concurrently(&ctx, &items, &callback).await?;
        Ok(Value::list(results))
    })
}

fn filter(ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        let (items, callback) = sequence_and_callback("filter", &args)?;
        let keep = map_concurrently(&ctx, &items, &callback).await?;
        let filtered = items
            .into_iter()
            .zip(keep)
            .filter(|(_, flag)| *flag == Value::Bool(true))
            .map(|(item, _)| item)
            .collect();
        Ok(Value::list(filtered))
    })
}

fn order_by(ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        let (items, callback) = sequence_and_callback("orderBy", &args)?;
        let keys = map_concurrently(&ctx, &items, &callback).await?;

        let mut order: Vec<usize> = (0..items.len()).collect();
        let mut incomparable = None;
        // sort_by is stable: equal keys keep their original relative order
        order.sort_by(|&a, &b| match value::partial_cmp(&keys[a], &keys[b]) {
            Some(ordering) => ordering,
            None => {
                incomparable = Some((keys[a].type_name(), keys[b].type_name()));
                Ordering::Equal
            }
        });
        if let Some((a, b)) = incomparable {
            return Err(ExprError::Type(format!(
                "orderBy keys are not comparable ({a} vs {b})"
            )));
        }

        let sorted = order.into_iter().map(|i| items[i].clone()).collect();
        Ok(Value::list(sorted))
    })
}

fn group_by(ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        let (items, callback) = sequence_and_callback("groupBy", &args)?;
        let keys = map_concurrently(&ctx, &items, &callback).await?;

        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for (item, key) in items.into_iter().zip(keys) {
            if let Some((_, members)) = groups.iter_mut().find(|(k, _)| *k == key) {
                members.push(item);
            } else {
                groups.push((key, vec![item]));
            }
        }

        let result = groups
            .into_iter()
            .map(|(key, members)| {
                let mut map = ValueMap::new();
                map.insert("key", key);
                map.insert("items", Value::list(members));
                Value::map(map)
            })
            .collect();
        Ok(Value::list(result))
    })
}

fn reverse(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("reverse", &args, 1)?;
        let mut items = args[0].as_sequence()?;
        items.reverse();
        Ok(Value::list(items))
    })
}

fn take(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("take", &args, 2)?;
        let items = args[0].as_sequence()?;
        let count = args[1].as_int()?.max(0) as usize;
        Ok(Value::list(items.into_iter().take(count).collect()))
    })
}

fn skip(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("skip", &args, 2)?;
        let items = args[0].as_sequence()?;
        let count = args[1].as_int()?.max(0) as usize;
        Ok(Value::list(items.into_iter().skip(count).collect()))
    })
}

fn any(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("any", &args, 1)?;
        Ok(Value::Bool(!args[0].as_sequence()?.is_empty()))
    })
}

fn index(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("index", &args, 2)?;
        let items = args[0].as_sequence()?;
        let at = args[1].as_int()?;
        usize::try_from(at)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| {
                ExprError::Type(format!("index {at} out of bounds (len {})", items.len()))
            })
    })
}

fn get_item(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("getItem", &args, 2)?;
        let Value::Str(key) = &args[1] else {
            return Err(ExprError::Type(format!(
                "getItem key must be a string, got {}",
                args[1].type_name()
            )));
        };
        match &args[0] {
            Value::Map(map) => map
                .get(key)
                .cloned()
                .ok_or_else(|| ExprError::NotFound(key.clone())),
            Value::Entity(entity) => entity
                .get(key)
                .ok_or_else(|| ExprError::NotFound(key.clone())),
            other => Err(ExprError::Type(format!(
                "getItem expects a dictionary, got {}",
                other.type_name()
            ))),
        }
    })
}

// ============================================================================
// Control flow
// ============================================================================

/// `if(cond, then, else)`: exactly one branch is touched. A branch that
/// is a method is invoked with no arguments; a plain value is returned
/// as-is.
fn if_branch(ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("if", &args, 3)?;
        let Value::Bool(cond) = args[0] else {
            return Err(ExprError::Type(format!(
                "if condition must be a boolean, got {}",
                args[0].type_name()
            )));
        };
        let branch = if cond { &args[1] } else { &args[2] };
        match branch {
            Value::Method(m) => m(ctx.clone(), Vec::new()).await,
            value => Ok(value.clone()),
        }
    })
}

// ============================================================================
// Dates and strings
// ============================================================================

fn date_time(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("dateTime", &args, 1)?;
        let Value::Str(text) = &args[0] else {
            return Err(ExprError::Type(format!(
                "dateTime expects a string, got {}",
                args[0].type_name()
            )));
        };
        super::token::parse_date(text)
            .map(Value::Date)
            .ok_or_else(|| ExprError::Type(format!("cannot parse `{text}` as a date")))
    })
}

fn now(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("now", &args, 0)?;
        Ok(Value::Date(Utc::now().fixed_offset()))
    })
}

fn format_date(
    _ctx: RuntimeContext,
    args: Vec<Value>,
) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("formatDate", &args, 2)?;
        let (Value::Date(date), Value::Str(format)) = (&args[0], &args[1]) else {
            return Err(ExprError::Type(
                "formatDate expects (date, format string)".to_string(),
            ));
        };
        Ok(Value::Str(date.format(format).to_string()))
    })
}

fn join(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("join", &args, 2)?;
        let items = args[0].as_sequence()?;
        let Value::Str(separator) = &args[1] else {
            return Err(ExprError::Type(
                "join separator must be a string".to_string(),
            ));
        };
        let parts: Vec<String> = items.iter().map(Value::to_string).collect();
        Ok(Value::Str(parts.join(separator)))
    })
}

// ============================================================================
// Paths and links
// ============================================================================

/// The output-relative path of a path-bearing value.
fn path_of(value: &Value) -> Result<String, ExprError> {
    match value {
        Value::Str(path) => Ok(path.clone()),
        Value::Entity(Entity::Style(asset) | Entity::Asset(asset)) => Ok(asset.href.clone()),
        Value::Entity(Entity::Page(page)) => Ok(page.path.clone()),
        other => Err(ExprError::Type(format!(
            "expected a path-bearing value, got {}",
            other.type_name()
        ))),
    }
}

/// Path of `to` relative to the directory containing `from`.
fn relative_path(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = {
        let mut parts: Vec<&str> = from.split('/').filter(|p| !p.is_empty()).collect();
        parts.pop();
        parts
    };
    let to_parts: Vec<&str> = to.split('/').filter(|p| !p.is_empty()).collect();

    let common = from_dir
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut result: Vec<&str> = Vec::new();
    for _ in common..from_dir.len() {
        result.push("..");
    }
    result.extend(&to_parts[common..]);
    result.join("/")
}

fn relative(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("relative", &args, 2)?;
        let from = path_of(&args[0])?;
        let to = path_of(&args[1])?;
        Ok(Value::Str(relative_path(&from, &to)))
    })
}

fn get_path(_ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("getPath", &args, 1)?;
        Ok(Value::Str(path_of(&args[0])?))
    })
}

// ============================================================================
// Templates
// ============================================================================

/// `compile(template)`: compile a template against the current context.
/// This is how a page template pulls in its `body`.
fn compile(ctx: RuntimeContext, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> {
    Box::pin(async move {
        expect_arity("compile", &args, 1)?;
        let Value::Entity(Entity::Template(template)) = &args[0] else {
            return Err(ExprError::Type(format!(
                "compile expects a template, got {}",
                args[0].type_name()
            )));
        };
        let compiled = template.compile(&ctx).await.map_err(ExprError::Other)?;
        compiled.into_value().map_err(ExprError::Other)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(core_bindings())
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::Int(n)).collect())
    }

    /// A callback that doubles its input after a delay inversely
    /// proportional to the value, so later elements finish first.
    fn slow_double() -> Value {
        method(|_ctx, args| {
            Box::pin(async move {
                let n = args[0].as_int()?;
                tokio::time::sleep(Duration::from_millis((20 - n) as u64 * 3)).await;
                Ok(Value::Int(n * 2))
            })
        })
    }

    #[tokio::test]
    async fn select_preserves_positional_order_under_concurrency() {
        let result = select(ctx(), vec![ints(&[1, 5, 2, 9, 3]), slow_double()])
            .await
            .unwrap();
        assert_eq!(result, ints(&[2, 10, 4, 18, 6]));
    }

    #[tokio::test]
    async fn select_matches_sequential_reference() {
        let items = [4i64, 1, 7, 7, 2];
        let expected: Vec<i64> = items.iter().map(|n| n * 2).collect();
        let result = select(ctx(), vec![ints(&items), slow_double()])
            .await
            .unwrap();
        assert_eq!(result, ints(&expected));
    }

    #[tokio::test]
    async fn filter_keeps_only_boolean_true() {
        let is_even = method(|_ctx, args| {
            Box::pin(async move { Ok(Value::Bool(args[0].as_int()? % 2 == 0)) })
        });
        let result = filter(ctx(), vec![ints(&[1, 2, 3, 4, 5, 6]), is_even])
            .await
            .unwrap();
        assert_eq!(result, ints(&[2, 4, 6]));
    }

    #[tokio::test]
    async fn order_by_is_stable_for_equal_keys() {
        // Key is n / 10, so 12, 15 and 11 share a key and must keep
        // their original relative order.
        let bucket = method(|_ctx, args| {
            Box::pin(async move { Ok(Value::Int(args[0].as_int()? / 10)) })
        });
        let result = order_by(ctx(), vec![ints(&[22, 12, 15, 31, 11]), bucket])
            .await
            .unwrap();
        assert_eq!(result, ints(&[12, 15, 11, 22, 31]));
    }

    #[tokio::test]
    async fn group_by_preserves_encounter_order() {
        let bucket = method(|_ctx, args| {
            Box::pin(async move { Ok(Value::Int(args[0].as_int()? % 2)) })
        });
        let result = group_by(ctx(), vec![ints(&[1, 2, 3, 4]), bucket])
            .await
            .unwrap();
        let groups = result.as_sequence().unwrap();
        assert_eq!(groups.len(), 2);
        let Value::Map(first) = &groups[0] else {
            panic!("expected a map");
        };
        assert_eq!(first.get("key"), Some(&Value::Int(1)));
        assert_eq!(first.get("items"), Some(&ints(&[1, 3])));
    }

    #[tokio::test]
    async fn if_invokes_exactly_one_branch() {
        let counting = |calls: &Arc<AtomicUsize>, result: i64| {
            let calls = calls.clone();
            method(move |_ctx, _args| {
                let calls = calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(Value::Int(result))
                })
            })
        };
        let then_calls = Arc::new(AtomicUsize::new(0));
        let else_calls = Arc::new(AtomicUsize::new(0));

        let result = if_branch(
            ctx(),
            vec![
                Value::Bool(true),
                counting(&then_calls, 1),
                counting(&else_calls, 2),
            ],
        )
        .await
        .unwrap();
        assert_eq!(result, Value::Int(1));
        assert_eq!(then_calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(else_calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sequence_primitives() {
        assert_eq!(
            reverse(ctx(), vec![ints(&[1, 2, 3])]).await.unwrap(),
            ints(&[3, 2, 1])
        );
        assert_eq!(
            take(ctx(), vec![ints(&[1, 2, 3]), Value::Int(2)])
                .await
                .unwrap(),
            ints(&[1, 2])
        );
        assert_eq!(
            skip(ctx(), vec![ints(&[1, 2, 3]), Value::Int(2)])
                .await
                .unwrap(),
            ints(&[3])
        );
        assert_eq!(
            any(ctx(), vec![ints(&[])]).await.unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            index(ctx(), vec![ints(&[5, 6]), Value::Int(1)])
                .await
                .unwrap(),
            Value::Int(6)
        );
    }

    #[tokio::test]
    async fn get_item_reports_missing_keys() {
        let mut map = ValueMap::new();
        map.insert("a", Value::Int(1));
        let err = get_item(ctx(), vec![Value::map(map), Value::Str("b".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, ExprError::NotFound(key) if key == "b"));
    }

    #[test]
    fn relative_path_walks_up_and_down() {
        assert_eq!(
            relative_path("posts/a/index.html", "assets/css/main.css"),
            "../../assets/css/main.css"
        );
        assert_eq!(relative_path("index.html", "about/index.html"), "about/index.html");
        assert_eq!(
            relative_path("posts/a/index.html", "posts/b/index.html"),
            "../b/index.html"
        );
    }

    #[tokio::test]
    async fn date_time_parses_both_forms() {
        let date = date_time(ctx(), vec![Value::Str("2024-06-01".into())])
            .await
            .unwrap();
        let Value::Date(d) = date else {
            panic!("expected a date");
        };
        assert_eq!(d.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        assert!(
            date_time(ctx(), vec![Value::Str("not a date".into())])
                .await
                .is_err()
        );
    }
}
