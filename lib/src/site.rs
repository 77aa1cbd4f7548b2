use std::hash::BuildHasherDefault;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use derive_more::Debug;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::assets;
use crate::build::{BuildContext, Hooks, Phase};
use crate::config::Config;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::layout;
use crate::markdown::{Markdown, Pulldown};
use crate::resource::{Registry, Resource, State};
use crate::rule::{PageRule, ParametricRule, Rule, Sitemap};
use crate::templating::{Engine, Functions, Json, MiniJinjaEngine};
use crate::util::{slugify, GlobSet};

/// A site: its configuration, every resource it knows, and the rules and
/// collaborators that build it.
///
/// Sites are independent of each other; nothing is process-global.
#[derive(Debug)]
pub struct Site {
    pub(crate) config: Arc<Config>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) graph: Mutex<DependencyGraph>,
    #[debug(ignore)]
    pub(crate) rules: Vec<Arc<dyn Rule>>,
    #[debug(ignore)]
    pub(crate) default_rule: Option<Arc<dyn Rule>>,
    pub(crate) hooks: Hooks,
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) markdown: Arc<dyn Markdown>,
    pub(crate) stage: Arc<Stage>,
    pub(crate) asset_globs: GlobSet,
    pub(crate) ignore_globs: GlobSet,
}

/// A build-scoped key/value store shared by rules, hooks, and templates.
/// Cleared at the start of every build.
#[derive(Debug, Default)]
pub struct Stage {
    map: DashMap<String, Json, BuildHasherDefault<FxHasher>>,
}

/// A listing of a site's pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Query {
    /// Only pages whose directory, relative to the content root, is this.
    pub section: Option<String>,
    /// Only pages with this tag. Compared by slug.
    pub tag: Option<String>,
    /// List drafts even when the site hides them.
    #[serde(alias = "drafts")]
    pub include_drafts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    /// Relative to the content root, `/`-separated.
    pub path: String,
    pub url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub date: Option<String>,
    pub lastmod: Option<String>,
    pub tags: Vec<String>,
    pub draft: bool,
    pub section: String,
    #[serde(skip)]
    sort_key: Option<chrono::NaiveDateTime>,
}

impl Site {
    /// A site with the built-in rules: stylesheets, parametric pages, pages,
    /// and the sitemap.
    pub fn new(config: Config) -> Result<Site> {
        let mut site = Site::empty(config)?;
        #[cfg(feature = "sass")]
        site.add_rule(crate::rule::SassRule::default());
        site.add_rule(ParametricRule::new());
        site.add_rule(PageRule);
        Sitemap::install(&mut site);
        Ok(site)
    }

    /// A site with no rules: every resource falls through to the default.
    pub fn empty(config: Config) -> Result<Site> {
        let asset_globs = config.asset_globs()?;
        let ignore_globs = config.ignore_globs()?;
        Ok(Site {
            engine: Arc::new(MiniJinjaEngine::new(&config.template_dir)),
            markdown: Arc::new(Pulldown::default()),
            config: Arc::new(config),
            registry: Arc::new(Registry::new()),
            graph: Mutex::new(DependencyGraph::new()),
            rules: vec![],
            default_rule: None,
            hooks: Hooks::default(),
            stage: Arc::new(Stage::default()),
            asset_globs,
            ignore_globs,
        })
    }

    pub fn with_engine<E: Engine + 'static>(mut self, engine: E) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn with_markdown<M: Markdown + 'static>(mut self, markdown: M) -> Self {
        self.markdown = Arc::new(markdown);
        self
    }

    /// Appends a rule. Declaration order breaks ties in rule ordering.
    pub fn add_rule<R: Rule + 'static>(&mut self, rule: R) -> &mut Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Replaces the byte copy applied to resources no rule claims.
    pub fn set_default_rule<R: Rule + 'static>(&mut self, rule: R) -> &mut Self {
        self.default_rule = Some(Arc::new(rule));
        self
    }

    pub fn on_phase_start<F>(&mut self, phase: Phase, hook: F) -> &mut Self
        where F: Fn(&Site, &mut BuildContext) + Send + Sync + 'static
    {
        self.hooks.on_phase_start(phase, Box::new(hook));
        self
    }

    pub fn on_phase_end<F>(&mut self, phase: Phase, hook: F) -> &mut Self
        where F: Fn(&Site, &mut BuildContext) + Send + Sync + 'static
    {
        self.hooks.on_phase_end(phase, Box::new(hook));
        self
    }

    pub fn on_resource_processed<F>(&mut self, hook: F) -> &mut Self
        where F: Fn(&Site, &Arc<Resource>, &[Arc<Resource>]) + Send + Sync + 'static
    {
        self.hooks.on_resource_processed(Box::new(hook));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn graph(&self) -> MutexGuard<'_, DependencyGraph> {
        self.graph.lock()
    }

    pub fn engine(&self) -> &dyn Engine {
        &*self.engine
    }

    pub fn markdown(&self) -> &dyn Markdown {
        &*self.markdown
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Lists loaded pages matching `query`, newest first, then by path.
    /// Index and parametric pages are not listed.
    pub fn pages(&self, query: &Query) -> Vec<PageInfo> {
        pages(&self.registry, &self.config, query)
    }

    /// The functions templates rendering `resource` can call: `asset_url`,
    /// `stage_set`, `stage_get`, and `pages`. Parametric resources also get
    /// `add_param`, which does nothing outside of discovery.
    pub fn functions_for(&self, resource: &Arc<Resource>) -> Functions {
        let mut functions = Functions::new();
        if resource.is_parametric() {
            functions.insert("add_param", |_: &[Json]| Ok(Json::from("")));
        }

        let (config, owner) = (self.config.clone(), resource.clone());
        functions.insert("asset_url", move |args: &[Json]| {
            let Some(name) = args.first().and_then(|a| a.as_str()) else {
                return err!("`asset_url` expects an asset file name");
            };

            let asset = owner.assets()
                .into_iter()
                .find(|a| a.file_name() == name)
                .ok_or_else(|| error! {
                    "no such asset",
                    "name" => name,
                    "page" => owner.path().display(),
                })?;

            Ok(Json::String(assets::url_for(&config, &owner, &asset)?))
        });

        let stage = self.stage.clone();
        functions.insert("stage_set", move |args: &[Json]| {
            let Some(key) = args.first().and_then(|a| a.as_str()) else {
                return err!("`stage_set` expects a key and a value");
            };

            stage.set(key, args.get(1).cloned().unwrap_or(Json::Null));
            Ok(Json::from(""))
        });

        let stage = self.stage.clone();
        functions.insert("stage_get", move |args: &[Json]| {
            let Some(key) = args.first().and_then(|a| a.as_str()) else {
                return err!("`stage_get` expects a key");
            };

            Ok(stage.get(key).unwrap_or(Json::Null))
        });

        let (registry, config) = (self.registry.clone(), self.config.clone());
        functions.insert("pages", move |args: &[Json]| {
            let query = match args.first() {
                Some(arg @ Json::Object(_)) => serde_json::from_value(arg.clone())?,
                Some(Json::String(section)) => Query { section: Some(section.clone()), ..Query::default() },
                _ => Query::default(),
            };

            Ok(serde_json::to_value(pages(&registry, &config, &query))?)
        });

        functions
    }

    /// Whether any component of `path` below the content root is ignored.
    pub(crate) fn is_ignored(&self, path: &Path) -> bool {
        layout::relative(&self.config, path)
            .map_or(false, |rel| rel.iter()
                .filter_map(|c| c.to_str())
                .any(|name| self.ignore_globs.is_match(name)))
    }
}

fn pages(registry: &Registry, config: &Config, query: &Query) -> Vec<PageInfo> {
    let section = query.section.as_deref().map(|s| s.trim_matches('/'));
    let tag = query.tag.as_deref().map(slugify);
    let hide_drafts = config.hide_drafts && !query.include_drafts;

    let mut pages: Vec<PageInfo> = registry.resources()
        .into_iter()
        .filter(|r| r.needs_index() && !r.is_index() && !r.is_parametric())
        .filter(|r| r.state() == State::Loaded && layout::relative(config, r.path()).is_some())
        .filter_map(|r| {
            let matter = r.front_matter();
            if hide_drafts && matter.draft {
                return None;
            }

            let page_section = layout::section_of(config, r.path());
            if section.map_or(false, |s| s != page_section) {
                return None;
            }

            if let Some(tag) = &tag {
                if !matter.tags.iter().any(|t| &slugify(t) == tag) {
                    return None;
                }
            }

            let rel: PathBuf = layout::relative(config, r.path())?.to_path_buf();
            Some(PageInfo {
                path: crate::util::url_path(&rel),
                url: layout::url_of(config, &layout::output_path(config, &r)),
                title: matter.title.clone(),
                summary: matter.summary.clone(),
                date: matter.date.map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
                lastmod: matter.lastmod.map(|d| d.format("%Y-%m-%d").to_string()),
                tags: matter.tags.clone(),
                draft: matter.draft,
                section: page_section,
                sort_key: matter.date,
            })
        })
        .collect();

    pages.sort_by(|a, b| b.sort_key.cmp(&a.sort_key).then_with(|| a.path.cmp(&b.path)));
    pages
}

impl Stage {
    pub fn set<K: Into<String>>(&self, key: K, value: Json) {
        self.map.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Json> {
        self.map.get(key).map(|v| v.clone())
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
