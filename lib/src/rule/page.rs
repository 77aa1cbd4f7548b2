use std::sync::Arc;

use serde_json::json;

use crate::build::Phase;
use crate::error::{Chainable, Result};
use crate::layout;
use crate::resource::Resource;
use crate::rule::{write_output, Capabilities, Claim, Rule};
use crate::site::Site;
use crate::templating::{Functions, Json, Params, TemplateRef};
use crate::util::{is_template, url_path};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Renders non-parametric pages: markdown or HTML content, optionally
/// templated, wrapped in a layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct PageRule;

impl Rule for PageRule {
    fn name(&self) -> &str {
        "page"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            produces: vec!["*.html".into()],
            ..Capabilities::in_phase(Phase::Generate)
        }
    }

    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> Result<Option<Claim>> {
        if !resource.needs_index() || resource.is_parametric() {
            return Ok(None);
        }

        let dest = layout::output_path(site.config(), resource);
        Ok(Some(Claim::to(vec![site.registry().get_or_create(dest)])))
    }

    fn run(&self, site: &Site, inputs: &[Arc<Resource>], targets: &[Arc<Resource>], functions: &Functions) -> Result<()> {
        let Some(source) = inputs.first() else {
            return Ok(());
        };

        for target in targets {
            let html = render_page(site, source, Some(target), functions);
            write_rendered(target, html)?;
        }

        Ok(())
    }
}

fn is_markdown(resource: &Resource) -> bool {
    resource.extension()
        .map_or(false, |e| MARKDOWN_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(e)))
}

/// The parameters a page is rendered with, before its content exists.
///
/// `target` is the output being rendered; it is `None` during a parametric
/// discovery render.
pub fn template_params(site: &Site, source: &Resource, target: Option<&Resource>) -> Params {
    let config = site.config();
    let matter = source.front_matter();
    let rel = layout::relative(config, source.path()).map(url_path).unwrap_or_default();
    let url = target.map(|t| layout::url_of(config, t.path())).unwrap_or_default();
    let param = target.and_then(|t| t.param_name());

    let params = json!({
        "page": {
            "path": rel,
            "url": url,
            "title": matter.title,
            "summary": matter.summary,
            "date": matter.date.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            "lastmod": matter.lastmod.map(|d| d.format("%Y-%m-%d").to_string()),
            "tags": matter.tags,
            "draft": matter.draft,
            "is_index": source.is_index(),
            "section": layout::section_of(config, source.path()),
            "param": param,
            "params": source.param_values().unwrap_or_default(),
        },
        "front_matter": &*matter,
        "param": param,
        "site": {
            "base_url": config.base_url,
            "globals": config.globals,
        },
        "template_params": matter.template_params,
    });

    match params {
        Json::Object(map) => map,
        _ => Params::new(),
    }
}

/// The layout wrapping a page: the front matter's `template` or `layout`,
/// else `index.html` for index pages or `page.html` for markdown pages when
/// those templates exist.
fn layout_for(site: &Site, source: &Resource) -> Option<TemplateRef> {
    let matter = source.front_matter();
    if let Some(template) = &matter.template {
        return Some(TemplateRef::parse(template));
    }

    if let Some(layout) = &matter.layout {
        return Some(TemplateRef::new(layout.as_str()));
    }

    if !is_markdown(source) {
        return None;
    }

    let engine = site.engine();
    ["index.html", "page.html"].into_iter()
        .filter(|name| source.is_index() || *name != "index.html")
        .find(|name| engine.has_template(name))
        .map(TemplateRef::new)
}

/// Renders `source` for `target`: the body as a template if it contains
/// template syntax, then as markdown if it is markdown, then wrapped in its
/// layout.
pub fn render_page(
    site: &Site,
    source: &Resource,
    target: Option<&Resource>,
    functions: &Functions,
) -> Result<String> {
    let name = layout::relative(site.config(), source.path())
        .map(url_path)
        .unwrap_or_else(|| source.file_name().to_string());

    let mut params = template_params(site, source, target);
    let body = source.body()?;
    let body = match is_template(&body) {
        true => site.engine()
            .render_str(&name, &body, &params, functions)
            .chain_with(|| error!("failed to render page body", "path" => &name))?,
        false => body,
    };

    let (content, toc) = match is_markdown(source) {
        true => {
            let markdown = site.markdown();
            let document = markdown.parse(&body)
                .chain_with(|| error!("failed to parse markdown", "path" => &name))?;

            let html = markdown.render(&document)
                .chain_with(|| error!("failed to render markdown", "path" => &name))?;

            let toc = markdown.toc(&document);
            source.set_document(Some(document));
            (html, toc)
        }
        false => (body, vec![]),
    };

    let Some(template) = layout_for(site, source) else {
        return Ok(content);
    };

    params.insert("toc".into(), serde_json::to_value(&toc)?);
    params.insert("content".into(), Json::String(content));
    site.engine()
        .render(&template, &params, functions)
        .chain_with(|| error! {
            "failed to render page layout",
            "path" => &name,
            "template" => &template,
        })
}

/// Writes a rendered page, or a visible placeholder naming the error if
/// rendering failed.
pub(crate) fn write_rendered(target: &Resource, html: Result<String>) -> Result<()> {
    match html {
        Ok(html) => write_output(target.path(), html.as_bytes()),
        Err(e) => {
            let placeholder = format!("template error: {e}");
            if let Err(write_error) = write_output(target.path(), placeholder.as_bytes()) {
                tracing::warn!(path = %target.path().display(), "{}", write_error.message());
            }

            Err(e)
        }
    }
}
