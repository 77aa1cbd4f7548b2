//! Parametric fan-out: one source, one output per parameter value.
//!
//! A resource named like `tags/[tag].md` is expanded in two steps. First its
//! parameter values are discovered, which for templates that call
//! `add_param` means rendering it once and discarding the output. Then one
//! target is made per value, at `tags/<slug>/index.html`, and each is rendered
//! with `param` set to its value.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::build::Phase;
use crate::error::{Chainable, Result};
use crate::layout;
use crate::resource::{Resource, State};
use crate::rule::page::{render_page, write_rendered};
use crate::rule::{Capabilities, Claim, Rule};
use crate::site::Site;
use crate::templating::{Functions, Json};
use crate::util::slugify;

/// Where a parametric resource's values come from.
pub trait ParamSource: Send + Sync {
    fn discover(&self, site: &Site, resource: &Arc<Resource>) -> Result<Vec<String>>;
}

/// The front matter's `params` list.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticParams;

/// Every value of a front matter key across the site's pages, `tags` for
/// instance. The key is the resource's `taxonomy` front matter unless one is
/// given here.
#[derive(Debug, Default, Clone)]
pub struct TaxonomyParams {
    pub key: Option<String>,
}

/// Renders the resource once with an `add_param` function bound and
/// collects the values it is called with.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderDiscovery;

impl ParamSource for StaticParams {
    fn discover(&self, _: &Site, resource: &Arc<Resource>) -> Result<Vec<String>> {
        Ok(resource.front_matter().params.clone().unwrap_or_default())
    }
}

impl ParamSource for TaxonomyParams {
    fn discover(&self, site: &Site, resource: &Arc<Resource>) -> Result<Vec<String>> {
        let matter = resource.front_matter();
        let Some(key) = self.key.as_deref().or(matter.taxonomy.as_deref()) else {
            return err!("no taxonomy key for parametric page", "path" => resource.path().display());
        };

        let config = site.config();
        let values = site.registry().resources()
            .into_iter()
            .filter(|r| r.needs_index() && !r.is_parametric() && r.state() == State::Loaded)
            .filter(|r| layout::relative(config, r.path()).is_some())
            .filter(|r| !(config.hide_drafts && r.front_matter().draft))
            .flat_map(|r| r.front_matter().values_of(key))
            .collect();

        Ok(values)
    }
}

impl ParamSource for RenderDiscovery {
    fn discover(&self, site: &Site, resource: &Arc<Resource>) -> Result<Vec<String>> {
        let found = Arc::new(Mutex::new(vec![]));
        let sink = found.clone();
        let mut functions = site.functions_for(resource);
        functions.insert("add_param", move |args: &[Json]| {
            let mut values = sink.lock();
            for arg in args {
                match arg {
                    Json::String(s) => values.push(s.clone()),
                    Json::Array(items) => values.extend(items.iter().filter_map(|i| i.as_str()).map(String::from)),
                    Json::Null => {}
                    other => values.push(other.to_string()),
                }
            }

            Ok(Json::from(""))
        });

        render_page(site, resource, None, &functions)
            .chain_with(|| error!("parameter discovery render failed", "path" => resource.path().display()))?;

        let values = std::mem::take(&mut *found.lock());
        Ok(values)
    }
}

/// Drops empty values and values slugging to an already-seen slug, keeping
/// first-seen order.
pub fn dedup_values<I: IntoIterator<Item = String>>(values: I) -> Vec<String> {
    let mut seen = FxHashSet::default();
    values.into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(slugify(v)))
        .collect()
}

/// Expands parametric resources. Values come from the configured
/// [`ParamSource`], or per resource: [`StaticParams`] if the front matter has
/// `params`, [`TaxonomyParams`] if it has `taxonomy`, [`RenderDiscovery`]
/// otherwise.
#[derive(Default)]
pub struct ParametricRule {
    source: Option<Box<dyn ParamSource>>,
}

impl ParametricRule {
    pub fn new() -> Self {
        ParametricRule::default()
    }

    pub fn with_source<S: ParamSource + 'static>(source: S) -> Self {
        ParametricRule { source: Some(Box::new(source)) }
    }

    fn discover(&self, site: &Site, resource: &Arc<Resource>) -> Result<Vec<String>> {
        if let Some(source) = &self.source {
            return source.discover(site, resource);
        }

        let matter = resource.front_matter();
        if matter.params.is_some() {
            StaticParams.discover(site, resource)
        } else if matter.taxonomy.is_some() {
            TaxonomyParams::default().discover(site, resource)
        } else {
            RenderDiscovery.discover(site, resource)
        }
    }
}

impl Rule for ParametricRule {
    fn name(&self) -> &str {
        "parametric"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            parametric: true,
            produces: vec!["*.html".into()],
            ..Capabilities::in_phase(Phase::Generate)
        }
    }

    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> Result<Option<Claim>> {
        if !resource.is_parametric() {
            return Ok(None);
        }

        let values = dedup_values(self.discover(site, resource)?);
        resource.set_param_values(Some(values.clone()));
        tracing::debug!(path = %resource.path().display(), ?values, "discovered parameters");

        let targets = values.into_iter()
            .map(|value| {
                let dest = layout::param_output_path(site.config(), resource, &slugify(&value));
                let target = site.registry().get_or_create(dest);
                target.reset();
                target.set_source(resource);
                target.set_param_name(Some(value));
                target
            })
            .collect();

        Ok(Some(Claim::to(targets)))
    }

    fn run(&self, site: &Site, inputs: &[Arc<Resource>], targets: &[Arc<Resource>], functions: &Functions) -> Result<()> {
        let Some(source) = inputs.first() else {
            return Ok(());
        };

        let mut first_error = None;
        for target in targets {
            let html = render_page(site, source, Some(target), functions);
            if let Err(e) = write_rendered(target, html) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
