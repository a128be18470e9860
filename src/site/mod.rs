//! The site object model: a typed registry/namespace hierarchy built
//! once during config loading and read-only during compilation.

mod asset;
mod page;
mod template;

pub use asset::Asset;
pub use page::Page;
pub use template::Template;

use crate::expr::{ExprError, Value, ValueMap};
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

/// Lookup failures in the namespace hierarchy. Fatal to the operation
/// that triggered them.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no template found at `{0}`")]
    Template(String),

    #[error("no group `{segment}` while resolving template path `{path}`")]
    Group { segment: String, path: String },
}

/// An order-preserving string-keyed registry.
///
/// Page enumeration and `groupBy` grouping must follow config encounter
/// order, so registries keep insertion order rather than hashing.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<(String, T)>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Registry { entries: Vec::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Registry::new()
    }
}

/// A namespace node: templates, pages and sub-groups.
#[derive(Debug, Default)]
pub struct Group {
    pub name: String,
    pub templates: Registry<Arc<Template>>,
    pub pages: Registry<Arc<Page>>,
    pub groups: Registry<Arc<Group>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Group {
            name: name.into(),
            ..Group::default()
        }
    }

    /// Resolve a slash-delimited template path, recursing through nested
    /// groups arbitrarily deep.
    pub fn get_template(&self, path: &str) -> Result<Arc<Template>, LookupError> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        self.get_template_at(&parts, path)
    }

    fn get_template_at(&self, parts: &[&str], path: &str) -> Result<Arc<Template>, LookupError> {
        match parts {
            [] => Err(LookupError::Template(path.to_string())),
            [name] => self
                .templates
                .get(name)
                .cloned()
                .ok_or_else(|| LookupError::Template(path.to_string())),
            [group, rest @ ..] => self
                .groups
                .get(group)
                .ok_or_else(|| LookupError::Group {
                    segment: group.to_string(),
                    path: path.to_string(),
                })?
                .get_template_at(rest, path),
        }
    }

    /// This group's own pages followed by the immediate sub-groups'
    /// pages. Deeper nesting is intentionally not flattened.
    pub fn enumerate_pages(&self) -> Vec<Arc<Page>> {
        self.pages
            .values()
            .cloned()
            .chain(
                self.groups
                    .values()
                    .flat_map(|group| group.pages.values().cloned()),
            )
            .collect()
    }
}

/// The root group plus site-wide registries.
#[derive(Debug)]
pub struct Site {
    pub root: Group,
    pub styles: Registry<Arc<Asset>>,
    pub assets: Registry<Arc<Asset>>,
    pub constants: Arc<ValueMap>,
    /// Externally visible root path used to compute absolute links.
    pub location: String,
}

impl Deref for Site {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.root
    }
}

/// A reference into the site object model, usable as an expression
/// value. Field access goes through an exhaustive per-type lookup table
/// rather than any reflection-style indexer.
#[derive(Clone)]
pub enum Entity {
    Style(Arc<Asset>),
    Asset(Arc<Asset>),
    Template(Arc<Template>),
    Page(Arc<Page>),
    Group(Arc<Group>),
    Site(Arc<Site>),
}

impl Entity {
    pub fn name(&self) -> &str {
        match self {
            Entity::Style(a) | Entity::Asset(a) => &a.name,
            Entity::Template(t) => &t.name,
            Entity::Page(p) => &p.name,
            Entity::Group(g) => &g.name,
            Entity::Site(_) => "site",
        }
    }

    /// Identity comparison (same underlying object).
    pub fn same_as(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Style(a), Entity::Style(b)) | (Entity::Asset(a), Entity::Asset(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Entity::Template(a), Entity::Template(b)) => Arc::ptr_eq(a, b),
            (Entity::Page(a), Entity::Page(b)) => Arc::ptr_eq(a, b),
            (Entity::Group(a), Entity::Group(b)) => Arc::ptr_eq(a, b),
            (Entity::Site(a), Entity::Site(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Keyed field lookup exposed to the expression language.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Entity::Style(asset) | Entity::Asset(asset) => match key {
                "name" => Some(Value::Str(asset.name.clone())),
                "path" => Some(Value::Str(asset.href.clone())),
                "file" => Some(Value::Str(asset.file.display().to_string())),
                _ => None,
            },
            Entity::Template(template) => match key {
                "name" => Some(Value::Str(template.name.clone())),
                "compile" => Some(compile_method(template)),
                _ => None,
            },
            Entity::Page(page) => match key {
                "name" => Some(Value::Str(page.name.clone())),
                "path" => Some(Value::Str(page.path.clone())),
                "template" => Some(Value::Entity(Entity::Template(page.template.clone()))),
                "body" => Some(match &page.body {
                    Some(body) => Value::Entity(Entity::Template(body.clone())),
                    None => Value::Null,
                }),
                _ => page.properties.get(key).cloned(),
            },
            Entity::Group(group) => group_lookup(group, key),
            Entity::Site(site) => match key {
                "location" => Some(Value::Str(site.location.clone())),
                "styles" => Some(asset_map(&site.styles, Entity::Style)),
                "assets" => Some(asset_map(&site.assets, Entity::Asset)),
                "constants" => Some(Value::Map(site.constants.clone())),
                _ => group_lookup(&site.root, key),
            },
        }
    }
}

/// Group lookup order: sub-group by name, the `templates`/`pages`
/// tables, then a page by name.
fn group_lookup(group: &Group, key: &str) -> Option<Value> {
    if let Some(sub) = group.groups.get(key) {
        return Some(Value::Entity(Entity::Group(sub.clone())));
    }
    match key {
        "templates" => Some(template_map(&group.templates)),
        "pages" => Some(page_map(&group.pages)),
        "groups" => Some(group_map(&group.groups)),
        _ => group
            .pages
            .get(key)
            .map(|page| Value::Entity(Entity::Page(page.clone()))),
    }
}

fn asset_map(
    registry: &Registry<Arc<Asset>>,
    wrap: fn(Arc<Asset>) -> Entity,
) -> Value {
    Value::map(
        registry
            .iter()
            .map(|(key, asset)| (key.to_string(), Value::Entity(wrap(asset.clone()))))
            .collect(),
    )
}

fn template_map(registry: &Registry<Arc<Template>>) -> Value {
    Value::map(
        registry
            .iter()
            .map(|(key, t)| (key.to_string(), Value::Entity(Entity::Template(t.clone()))))
            .collect(),
    )
}

fn page_map(registry: &Registry<Arc<Page>>) -> Value {
    Value::map(
        registry
            .iter()
            .map(|(key, p)| (key.to_string(), Value::Entity(Entity::Page(p.clone()))))
            .collect(),
    )
}

fn group_map(registry: &Registry<Arc<Group>>) -> Value {
    Value::map(
        registry
            .iter()
            .map(|(key, g)| (key.to_string(), Value::Entity(Entity::Group(g.clone()))))
            .collect(),
    )
}

/// The template's `compile` field: a zero-argument method compiling it
/// against the caller's context.
fn compile_method(template: &Arc<Template>) -> Value {
    let template = template.clone();
    Value::Method(Arc::new(move |ctx, args| {
        let template = template.clone();
        Box::pin(async move {
            if !args.is_empty() {
                return Err(ExprError::Arity {
                    name: "compile",
                    expected: 0,
                    got: args.len(),
                });
            }
            let compiled = template.compile(&ctx).await.map_err(ExprError::Other)?;
            compiled.into_value().map_err(ExprError::Other)
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatRegistry;
    use std::path::PathBuf;

    fn template(name: &str) -> Arc<Template> {
        let registry = FormatRegistry::new().unwrap();
        Arc::new(Template {
            file: PathBuf::from(format!("{name}.xml")),
            name: name.to_string(),
            format: registry.get("raw").unwrap(),
        })
    }

    fn page(name: &str, template: &Arc<Template>) -> Arc<Page> {
        Arc::new(Page {
            destination: PathBuf::from(name).join("index.html"),
            path: format!("{name}/index.html"),
            name: name.to_string(),
            properties: ValueMap::new(),
            template: template.clone(),
            body: None,
        })
    }

    #[test]
    fn template_path_lookup_recurses_deeply() {
        let base = template("base");
        let mut inner = Group::new("inner");
        inner.templates.insert("base", base.clone());
        let mut mid = Group::new("mid");
        mid.groups.insert("inner", Arc::new(inner));
        let mut root = Group::new("root");
        root.groups.insert("mid", Arc::new(mid));

        let found = root.get_template("mid/inner/base").unwrap();
        assert!(Arc::ptr_eq(&found, &base));

        assert!(matches!(
            root.get_template("mid/missing/base"),
            Err(LookupError::Group { segment, .. }) if segment == "missing"
        ));
        assert!(matches!(
            root.get_template("mid/inner/nope"),
            Err(LookupError::Template(_))
        ));
    }

    #[test]
    fn page_enumeration_flattens_one_level_only() {
        let base = template("base");

        let mut deep = Group::new("deep");
        deep.pages.insert("buried", page("buried", &base));
        let mut child_a = Group::new("a");
        child_a.pages.insert("a1", page("a1", &base));
        child_a.groups.insert("deep", Arc::new(deep));
        let mut child_b = Group::new("b");
        child_b.pages.insert("b1", page("b1", &base));

        let mut root = Group::new("root");
        root.pages.insert("top", page("top", &base));
        root.groups.insert("a", Arc::new(child_a));
        root.groups.insert("b", Arc::new(child_b));

        let names: Vec<String> = root
            .enumerate_pages()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, ["top", "a1", "b1"]);
    }

    #[test]
    fn page_lookup_falls_back_to_properties() {
        let base = template("base");
        let mut props = ValueMap::new();
        props.insert("title", Value::Str("About".into()));
        let page = Arc::new(Page {
            destination: PathBuf::from("about/index.html"),
            path: "about/index.html".to_string(),
            name: "about".to_string(),
            properties: props,
            template: base.clone(),
            body: None,
        });

        let entity = Entity::Page(page);
        assert_eq!(entity.get("title"), Some(Value::Str("About".into())));
        assert_eq!(entity.get("path"), Some(Value::Str("about/index.html".into())));
        assert_eq!(entity.get("missing"), None);
    }
}
