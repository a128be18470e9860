//! Content resolver: locates embedded `${...}` expressions in strings
//! and XML trees and splices in their evaluated results.

use crate::expr::{ExprError, RuntimeContext, Value, runtime};
use crate::xml::{Element, Node};
use futures_util::future::BoxFuture;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// `${<expr>}`, where the body may not contain `{`.
static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^{]*)\}").unwrap());

/// Resolve a raw string into an ordered sequence of literal substrings
/// interleaved with evaluated expression results.
///
/// A result that is itself a sequence (and not a string) is spliced in
/// as multiple items. Zero matches yields the original string as a
/// single-item sequence.
pub async fn resolve_str(content: &str, ctx: &RuntimeContext) -> Result<Vec<Value>, ExprError> {
    let spans: Vec<(Range<usize>, String)> = EXPRESSION
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            Some((whole.range(), body.as_str().to_string()))
        })
        .collect();

    if spans.is_empty() {
        return Ok(vec![Value::Str(content.to_string())]);
    }

    let mut segments = Vec::new();
    let mut position = 0;
    for (range, body) in spans {
        if range.start > position {
            segments.push(Value::Str(content[position..range.start].to_string()));
        }
        let result = runtime::eval_source(&body, ctx).await?;
        match result {
            Value::List(_) | Value::Map(_) => segments.extend(result.as_sequence()?),
            value => segments.push(value),
        }
        position = range.end;
    }
    if position < content.len() {
        segments.push(Value::Str(content[position..].to_string()));
    }
    Ok(segments)
}

/// Resolve an element tree in place, post-order: every child element and
/// every attribute before this element's own text content.
///
/// Text nodes whose resolved sequence contains non-string items are
/// replaced by a matching run of sibling nodes; attribute values always
/// collapse back to a single concatenated string.
pub fn resolve_element<'a>(
    elem: &'a mut Element,
    ctx: &'a RuntimeContext,
) -> BoxFuture<'a, Result<(), ExprError>> {
    Box::pin(async move {
        for child in elem.children.iter_mut() {
            if let Node::Element(child) = child {
                resolve_element(child, ctx).await?;
            }
        }

        for i in 0..elem.attrs.len() {
            let raw = elem.attrs[i].1.clone();
            let resolved = resolve_str(&raw, ctx).await?;
            elem.attrs[i].1 = resolved.iter().map(Value::to_string).collect();
        }

        let children = std::mem::take(&mut elem.children);
        let mut resolved_children = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Node::Text(text) => {
                    for value in resolve_str(&text, ctx).await? {
                        resolved_children.push(node_from_value(value));
                    }
                }
                element => resolved_children.push(element),
            }
        }
        elem.children = resolved_children;
        Ok(())
    })
}

/// String items become literal text nodes, node items are inserted
/// as-is, anything else by its string form.
fn node_from_value(value: Value) -> Node {
    match value {
        Value::Str(text) => Node::Text(text),
        Value::Node(node) => Node::Element(node.as_ref().clone()),
        other => Node::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::builtins;
    use rustc_hash::FxHashMap;
    use std::sync::Arc;

    fn ctx_with(extra: Vec<(&str, Value)>) -> RuntimeContext {
        let mut core: FxHashMap<String, Value> = builtins::core_bindings();
        for (name, value) in extra {
            core.insert(name.to_string(), value);
        }
        RuntimeContext::new(core)
    }

    #[tokio::test]
    async fn plain_strings_pass_through_unchanged() {
        let ctx = ctx_with(vec![]);
        for s in ["", "no expressions here", "almost ${ but not", "$ {x}"] {
            let resolved = resolve_str(s, &ctx).await.unwrap();
            assert_eq!(resolved, vec![Value::Str(s.to_string())], "for {s:?}");
        }
    }

    #[tokio::test]
    async fn interleaves_literals_and_results() {
        let ctx = ctx_with(vec![("title", Value::Str("Home".into()))]);
        let resolved = resolve_str("<< ${title} / ${2} >>", &ctx).await.unwrap();
        assert_eq!(
            resolved,
            vec![
                Value::Str("<< ".into()),
                Value::Str("Home".into()),
                Value::Str(" / ".into()),
                Value::Int(2),
                Value::Str(" >>".into()),
            ]
        );
    }

    #[tokio::test]
    async fn sequence_results_are_spliced() {
        let items = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let ctx = ctx_with(vec![("items", items)]);
        let resolved = resolve_str("${items}!", &ctx).await.unwrap();
        assert_eq!(
            resolved,
            vec![Value::Int(1), Value::Int(2), Value::Str("!".into())]
        );
    }

    #[tokio::test]
    async fn expression_errors_propagate() {
        let ctx = ctx_with(vec![]);
        assert!(resolve_str("${missing}", &ctx).await.is_err());
        assert!(resolve_str("${take(}", &ctx).await.is_err());
    }

    #[tokio::test]
    async fn tree_text_splices_node_results() {
        let body = Arc::new(Element::parse(b"<section>body</section>").unwrap());
        let ctx = ctx_with(vec![("content", Value::Node(body))]);

        let mut root = Element::parse(b"<main>before ${content} after</main>").unwrap();
        resolve_element(&mut root, &ctx).await.unwrap();

        assert_eq!(
            root.to_bytes().unwrap(),
            b"<main>before <section>body</section> after</main>"
        );
    }

    #[tokio::test]
    async fn attributes_collapse_to_scalar_text() {
        let items = Value::list(vec![Value::Str("a".into()), Value::Int(7)]);
        let ctx = ctx_with(vec![("items", items)]);

        let mut root = Element::parse(b"<a href=\"x-${items}-y\"/>").unwrap();
        resolve_element(&mut root, &ctx).await.unwrap();
        assert_eq!(root.attr("href"), Some("x-a7-y"));
    }

    #[tokio::test]
    async fn resolves_nested_children() {
        let ctx = ctx_with(vec![("n", Value::Int(3))]);
        let mut root = Element::parse(b"<ul><li>item ${n}</li></ul>").unwrap();
        resolve_element(&mut root, &ctx).await.unwrap();
        assert_eq!(root.to_bytes().unwrap(), b"<ul><li>item 3</li></ul>");
    }
}
