//! Build orchestration: output tree preparation, config loading and the
//! sequential page compilation loop.

use crate::config;
use crate::expr::{RuntimeContext, Value, builtins};
use crate::log;
use crate::site::{Entity, Site};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Clear and recreate the output tree, load the config, then compile
/// every enumerated page in order.
pub async fn build(root: &Path, output: &Path) -> Result<()> {
    prepare_output(output)?;
    let site = config::load_site(root, output).await?;
    compile_pages(&site).await?;
    log!("build"; "site written to `{}`", output.display());
    Ok(())
}

/// Load and report the config without compiling any page. Styles and
/// assets are still copied into the output tree, since registration and
/// copying are one step.
pub async fn check(root: &Path, output: &Path) -> Result<()> {
    let site = config::load_site(root, output).await?;
    log!(
        "check";
        "{} page(s), {} template(s), {} style(s), {} asset(s), {} constant(s)",
        site.root.enumerate_pages().len(),
        site.root.templates.len(),
        site.styles.len(),
        site.assets.len(),
        site.constants.len()
    );
    Ok(())
}

/// Remove any previous output and lay down the fixed folder skeleton.
fn prepare_output(output: &Path) -> Result<()> {
    if output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("cannot clear output `{}`", output.display()))?;
    }
    fs::create_dir_all(output.join("assets/css"))
        .with_context(|| format!("cannot create output `{}`", output.display()))?;
    Ok(())
}

/// Compile pages one at a time; any compilation error aborts the build.
async fn compile_pages(site: &Arc<Site>) -> Result<()> {
    let ctx = RuntimeContext::new(builtins::site_bindings(site));
    for page in site.root.enumerate_pages() {
        let mut extra = Vec::new();
        if let Some(body) = &page.body {
            extra.push((
                "body".to_string(),
                Value::Entity(Entity::Template(body.clone())),
            ));
        }
        let page_ctx = ctx.with_self(Value::Entity(Entity::Page(page.clone())), extra);

        let compiled = page
            .template
            .compile(&page_ctx)
            .await
            .with_context(|| format!("compiling page `{}`", page.name))?;

        if let Some(parent) = page.destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create `{}`", parent.display()))?;
        }
        fs::write(&page.destination, &compiled.bytes)
            .with_context(|| format!("cannot write `{}`", page.destination.display()))?;
        log!("page"; "{}", page.path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_FILE, CONFIG_NAMESPACE};

    #[test]
    fn prepare_output_clears_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(".site");
        fs::create_dir_all(out.join("old")).unwrap();
        fs::write(out.join("old/stale.html"), "gone").unwrap();

        prepare_output(&out).unwrap();
        assert!(!out.join("old").exists());
        assert!(out.join("assets/css").is_dir());
    }

    #[tokio::test]
    async fn builds_a_miniature_site_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let out = root.join(".site");

        fs::write(root.join("main.css"), "body { margin: 0 }").unwrap();
        fs::write(
            root.join("body.xml"),
            "<article><h2>${title}</h2></article>",
        )
        .unwrap();
        fs::write(
            root.join("base.xml"),
            "<html><head><title>${title}</title></head>\
             <body>${compile(body)}</body></html>",
        )
        .unwrap();
        fs::write(
            root.join(CONFIG_FILE),
            format!(
                "<Site xmlns=\"{CONFIG_NAMESPACE}\" Location=\"https://example.org\">\
                   <Style Key=\"main\">main.css</Style>\
                   <Template Key=\"body\" Format=\"xml\">body.xml</Template>\
                   <Template Key=\"base\" Format=\"xml\">base.xml</Template>\
                   <Page Destination=\"about\" Name=\"about\" Template=\"base\" \
                         Body=\"body\" title=\"About us\"/>\
                 </Site>"
            ),
        )
        .unwrap();

        // Stale output from a previous run must disappear.
        fs::create_dir_all(out.join("gone")).unwrap();
        fs::write(out.join("gone/stale.html"), "old").unwrap();

        build(root, &out).await.unwrap();

        assert!(!out.join("gone").exists());
        assert_eq!(
            fs::read_to_string(out.join("assets/css/main.css")).unwrap(),
            "body { margin: 0 }"
        );
        let html = fs::read_to_string(out.join("about/index.html")).unwrap();
        assert!(html.contains("<title>About us</title>"), "got: {html}");
        assert!(
            html.contains("<body><article><h2>About us</h2></article></body>"),
            "got: {html}"
        );
    }
}
