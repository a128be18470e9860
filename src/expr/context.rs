//! Hierarchical variable/function scope for expression evaluation.

use super::error::ExprError;
use super::value::Value;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Scoped runtime environment.
///
/// The core scope (builtins plus site bindings) is shared by reference
/// across every derived context and never mutated after construction.
/// The local scope is private to one context chain and guarded by a
/// mutex, since concurrent builtin callbacks may evaluate `let` against
/// the same context. `current` is the ambient "self" object.
#[derive(Clone)]
pub struct RuntimeContext {
    core: Arc<FxHashMap<String, Value>>,
    local: Arc<Mutex<FxHashMap<String, Value>>>,
    current: Option<Value>,
}

impl RuntimeContext {
    pub fn new(core: FxHashMap<String, Value>) -> Self {
        RuntimeContext {
            core: Arc::new(core),
            local: Arc::new(Mutex::new(FxHashMap::default())),
            current: None,
        }
    }

    /// Derive a context with a fresh local scope; core and self are shared.
    pub fn copy(&self) -> Self {
        RuntimeContext {
            core: self.core.clone(),
            local: Arc::new(Mutex::new(FxHashMap::default())),
            current: self.current.clone(),
        }
    }

    /// Derive a context with a new self object and a fresh local scope
    /// seeded with `extra` bindings.
    pub fn with_self(
        &self,
        current: Value,
        extra: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        RuntimeContext {
            core: self.core.clone(),
            local: Arc::new(Mutex::new(extra.into_iter().collect())),
            current: Some(current),
        }
    }

    pub fn self_value(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// Bind a name into the local scope (the `let` builtin).
    pub fn bind(&self, name: impl Into<String>, value: Value) {
        self.local.lock().insert(name.into(), value);
    }

    /// Resolve an identifier: core bindings, then the self object's keyed
    /// lookup, then local bindings.
    pub fn get(&self, name: &str) -> Result<Value, ExprError> {
        if name == "this" {
            return self
                .current
                .clone()
                .ok_or_else(|| ExprError::NotFound(name.to_string()));
        }
        if let Some(value) = self.core.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.lookup_self(name) {
            return Ok(value);
        }
        if let Some(value) = self.local.lock().get(name) {
            return Ok(value.clone());
        }
        Err(ExprError::NotFound(name.to_string()))
    }

    fn lookup_self(&self, name: &str) -> Option<Value> {
        match self.current.as_ref()? {
            Value::Entity(entity) => entity.get(name),
            Value::Map(map) => map.get(name).cloned(),
            _ => None,
        }
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        RuntimeContext::new(FxHashMap::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_identifier_names_the_key() {
        let ctx = RuntimeContext::default();
        let err = ctx.get("missing").unwrap_err();
        assert!(err.to_string().contains("\"missing\""));
    }

    #[test]
    fn core_shadows_local() {
        let mut core = FxHashMap::default();
        core.insert("x".to_string(), Value::Int(1));
        let ctx = RuntimeContext::new(core);
        ctx.bind("x", Value::Int(2));
        assert_eq!(ctx.get("x").unwrap(), Value::Int(1));
    }

    #[test]
    fn copy_gets_fresh_local_scope() {
        let ctx = RuntimeContext::default();
        ctx.bind("x", Value::Int(1));
        let copy = ctx.copy();
        assert!(copy.get("x").is_err());
        assert!(ctx.get("x").is_ok());
    }

    #[test]
    fn with_self_seeds_extra_bindings() {
        let ctx = RuntimeContext::default();
        let derived = ctx.with_self(
            Value::Str("page".into()),
            [("body".to_string(), Value::Int(7))],
        );
        assert_eq!(derived.get("body").unwrap(), Value::Int(7));
        assert_eq!(derived.get("this").unwrap(), Value::Str("page".into()));
    }
}
