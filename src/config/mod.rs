//! Config loading: parses `config.xml` and builds the immutable site
//! object model.
//!
//! Elements are processed in document order. An element missing a
//! required attribute is skipped with a warning; a reference to a key
//! that has not been registered yet is a hard error, so ordering in the
//! config file matters (formats before templates, templates before
//! pages).

mod error;

pub use error::ConfigError;

use crate::expr::{RuntimeContext, Value, ValueMap, builtins};
use crate::format::{DocumentType, Format, FormatRegistry, TransformFormatter, XmlValidator};
use crate::resolve;
use crate::site::{Asset, Entity, Group, Page, Registry, Site, Template};
use crate::xml::Element;
use crate::{log, warn};
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_FILE: &str = "config.xml";
pub const CONFIG_NAMESPACE: &str = "https://weft-site.dev/config/v1";
/// Default output folder, overridable from the CLI.
pub const OUTPUT_DIR: &str = ".site";

/// Load `config.xml` from `root` and build the site, copying style and
/// asset files into `output` as they are encountered.
pub async fn load_site(root: &Path, output: &Path) -> Result<Arc<Site>, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !config_path.is_file() {
        return Err(ConfigError::Missing(config_path));
    }
    let bytes = fs::read(&config_path).map_err(|e| ConfigError::Io(config_path.clone(), e))?;
    let doc = Element::parse(&bytes)?;

    let namespace = doc.attr("xmlns").unwrap_or_default();
    if namespace != CONFIG_NAMESPACE {
        return Err(ConfigError::Root(format!(
            "expected namespace `{CONFIG_NAMESPACE}`, found `{namespace}`"
        )));
    }
    let location = doc
        .attr("Location")
        .ok_or_else(|| ConfigError::Root("missing required `Location` attribute".to_string()))?
        .to_string();

    let mut scope = builtins::core_bindings();
    scope.insert("getLink".to_string(), builtins::link_method(location.clone()));
    let mut loader = Loader {
        root: root.to_path_buf(),
        output: output.to_path_buf(),
        formats: FormatRegistry::new()?,
        scope,
        styles: Registry::new(),
        assets: Registry::new(),
        constants: ValueMap::new(),
    };
    let root_group = loader.load_group(&doc, "root".to_string()).await?;

    Ok(Arc::new(Site {
        root: root_group,
        styles: loader.styles,
        assets: loader.assets,
        constants: Arc::new(loader.constants),
        location,
    }))
}

/// Where a copied file lands in the output tree.
enum AssetKind {
    Style,
    Generic,
}

impl AssetKind {
    fn subdir(&self) -> &'static str {
        match self {
            AssetKind::Style => "assets/css",
            AssetKind::Generic => "assets",
        }
    }

    fn module(&self) -> &'static str {
        match self {
            AssetKind::Style => "style",
            AssetKind::Generic => "asset",
        }
    }
}

/// Mutable state accumulated while walking the config document. Turned
/// into an immutable `Site` once the walk completes.
struct Loader {
    root: PathBuf,
    output: PathBuf,
    formats: FormatRegistry,
    /// Core bindings plus every constant, style and asset registered so
    /// far, so later constants and page properties can reference
    /// anything the config declared before them.
    scope: FxHashMap<String, Value>,
    styles: Registry<Arc<Asset>>,
    assets: Registry<Arc<Asset>>,
    constants: ValueMap,
}

impl Loader {
    fn load_group<'a>(
        &'a mut self,
        elem: &'a Element,
        name: String,
    ) -> BoxFuture<'a, Result<Group, ConfigError>> {
        Box::pin(async move {
            let mut group = Group::new(name);
            for child in elem.elements() {
                match child.name.as_str() {
                    "Style" => self.load_asset(child, AssetKind::Style)?,
                    "Asset" => self.load_asset(child, AssetKind::Generic)?,
                    "Constant" => self.load_constant(child).await?,
                    "Format" => self.load_format(child)?,
                    "Template" => self.load_template(child, &mut group)?,
                    "Group" => {
                        let Some(name) = child.attr("Name") else {
                            warn!("config"; "skipping Group element without a Name attribute");
                            continue;
                        };
                        let name = name.to_string();
                        let sub = self.load_group(child, name.clone()).await?;
                        group.groups.insert(name, Arc::new(sub));
                    }
                    "Page" => self.load_page(child, &mut group).await?,
                    other => warn!("config"; "skipping unknown element `{other}`"),
                }
            }
            Ok(group)
        })
    }

    /// Copy a style/asset file into the output tree under a stable
    /// `{key}.{ext}` name and register it.
    fn load_asset(&mut self, elem: &Element, kind: AssetKind) -> Result<(), ConfigError> {
        let path = elem.text().trim().to_string();
        if path.is_empty() {
            warn!(kind.module(); "skipping {} element without a file path", elem.name);
            return Ok(());
        }
        let source = self.root.join(&path);
        let key = elem
            .attr("Key")
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&path));

        let file_name = match source.extension() {
            Some(ext) => format!("{key}.{}", ext.to_string_lossy()),
            None => key.clone(),
        };
        let href = format!("{}/{file_name}", kind.subdir());
        let target = self.output.join(kind.subdir()).join(&file_name);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        fs::copy(&source, &target).map_err(|e| ConfigError::Io(source.clone(), e))?;
        log!(kind.module(); "{} -> {href}", path);

        let asset = Arc::new(Asset::new(target, key.clone(), href));
        match kind {
            AssetKind::Style => self.styles.insert(key, asset),
            AssetKind::Generic => self.assets.insert(key, asset),
        }
        self.refresh_registry_bindings();
        Ok(())
    }

    /// Expose the style/asset registries to load-time expressions under
    /// the same `styles`/`assets` names the compile-time scope uses.
    fn refresh_registry_bindings(&mut self) {
        let styles: ValueMap = self
            .styles
            .iter()
            .map(|(key, a)| (key.to_string(), Value::Entity(Entity::Style(a.clone()))))
            .collect();
        let assets: ValueMap = self
            .assets
            .iter()
            .map(|(key, a)| (key.to_string(), Value::Entity(Entity::Asset(a.clone()))))
            .collect();
        self.scope.insert("styles".to_string(), Value::map(styles));
        self.scope.insert("assets".to_string(), Value::map(assets));
    }

    async fn load_constant(&mut self, elem: &Element) -> Result<(), ConfigError> {
        let Some(name) = elem.attr("Name") else {
            warn!("config"; "skipping Constant element without a Name attribute");
            return Ok(());
        };
        let name = name.to_string();
        let value = self.resolve_object(elem).await?;
        self.scope.insert(name.clone(), value.clone());
        self.constants.insert(name, value);
        Ok(())
    }

    fn load_format(&mut self, elem: &Element) -> Result<(), ConfigError> {
        let (Some(key), Some(schema), Some(transform)) = (
            elem.attr("Key"),
            elem.attr("Schema"),
            elem.attr("Transform"),
        ) else {
            warn!("format"; "skipping Format element missing Key, Schema or Transform");
            return Ok(());
        };
        let kind = elem.attr("Type").unwrap_or("xml");
        if kind != "xml" {
            warn!("format"; "skipping Format `{key}` with unsupported type `{kind}`");
            return Ok(());
        }

        let validator = XmlValidator::from_schema(&self.root.join(schema))?;
        let formatter = TransformFormatter::from_file(
            self.root.join(transform),
            DocumentType::new("text/html"),
        );
        self.formats.register(
            key,
            Format {
                validator: Arc::new(validator),
                formatter: Arc::new(formatter),
            },
        )?;
        log!("format"; "registered format `{key}`");
        Ok(())
    }

    fn load_template(&mut self, elem: &Element, group: &mut Group) -> Result<(), ConfigError> {
        let path = elem.text().trim().to_string();
        if path.is_empty() {
            warn!("config"; "skipping Template element without a file path");
            return Ok(());
        }
        let Some(format_key) = elem.attr("Format") else {
            warn!("config"; "skipping Template `{path}` without a Format attribute");
            return Ok(());
        };
        // A Format key that was never registered is a hard error.
        let format = self.formats.get(format_key)?;

        let key = elem
            .attr("Key")
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&path));
        let template = Template {
            file: self.root.join(&path),
            name: key.clone(),
            format,
        };
        group.templates.insert(key, Arc::new(template));
        Ok(())
    }

    async fn load_page(&mut self, elem: &Element, group: &mut Group) -> Result<(), ConfigError> {
        let Some(destination) = elem.attr("Destination") else {
            warn!("page"; "skipping Page element without a Destination attribute");
            return Ok(());
        };
        let Some(template_key) = elem.attr("Template") else {
            warn!("page"; "skipping Page `{destination}` without a Template attribute");
            return Ok(());
        };
        let destination = destination.trim_matches('/').to_string();
        let template_key = template_key.to_string();
        let body_key = elem.attr("Body").map(str::to_string);
        let name = elem
            .attr("Name")
            .map(str::to_string)
            .unwrap_or_else(|| destination.clone());

        // Template references resolve against already-registered keys
        // only; a dangling reference aborts the load.
        let template = group.get_template(&template_key)?;
        let body = match &body_key {
            Some(key) => Some(group.get_template(key)?),
            None => None,
        };

        let mut properties = ValueMap::new();
        for (attr, raw) in &elem.attrs {
            if matches!(attr.as_str(), "Destination" | "Template" | "Body" | "Name") {
                continue;
            }
            properties.insert(attr.clone(), self.resolve_text(raw).await?);
        }
        for child in elem.elements() {
            properties.insert(child.name.clone(), self.resolve_object(child).await?);
        }

        let page = Page {
            destination: self.output.join(&destination).join("index.html"),
            path: format!("{destination}/index.html"),
            name: name.clone(),
            properties,
            template,
            body,
        };
        group.pages.insert(name, Arc::new(page));
        Ok(())
    }

    /// Config object resolution: an element with child elements becomes a
    /// nested map, a leaf's text runs through the expression resolver.
    fn resolve_object<'a>(&'a self, elem: &'a Element) -> BoxFuture<'a, Result<Value, ConfigError>> {
        Box::pin(async move {
            if elem.has_elements() {
                let mut map = ValueMap::new();
                for child in elem.elements() {
                    map.insert(child.name.clone(), self.resolve_object(child).await?);
                }
                return Ok(Value::map(map));
            }
            self.resolve_text(&elem.text()).await
        })
    }

    /// Resolve leaf text and collapse the result sequence: empty to
    /// null, a single item to the scalar itself, anything longer stays a
    /// list.
    async fn resolve_text(&self, text: &str) -> Result<Value, ConfigError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Value::Null);
        }
        let ctx = RuntimeContext::new(self.scope.clone());
        let mut segments = resolve::resolve_str(text, &ctx).await?;
        Ok(match segments.len() {
            0 => Value::Null,
            1 => segments.remove(0),
            _ => Value::list(segments),
        })
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
