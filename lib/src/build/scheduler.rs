use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashSet;

use crate::assets;
use crate::build::{BuildContext, BuildReport, Phase};
use crate::error::{Chainable, Error, ErrorKind, Result};
use crate::resource::{Resource, State};
use crate::rule::{self, Capabilities, Claim, CopyRule, Rule};
use crate::site::Site;
use crate::util::normalize;

/// Dispatch order within the resource list: non-page files, then index
/// pages, then leaf pages, then parametric pages, so that pages listing the
/// site see everything else first.
fn priority(resource: &Resource) -> u8 {
    match (resource.needs_index(), resource.is_parametric(), resource.is_index()) {
        (false, _, _) => 0,
        (true, true, _) => 3,
        (true, false, true) => 1,
        (true, false, false) => 2,
    }
}

/// The rules of one phase in dispatch order, with their capabilities.
struct PhaseRules {
    ordered: Vec<(Arc<dyn Rule>, Capabilities)>,
    parametric_first: Vec<usize>,
}

impl Site {
    /// Builds the site.
    ///
    /// `None` builds everything. `Some(paths)` rebuilds the changed paths,
    /// the pages owning changed assets, and every index and parametric page.
    /// Changed paths that no longer exist are removed along with their
    /// outputs.
    ///
    /// Errors in individual resources are collected into the returned
    /// report. Only a failure to walk the content directory fails the build.
    pub fn rebuild(&self, changed: Option<&[PathBuf]>) -> Result<BuildReport> {
        let start = Instant::now();
        let mut ctx = BuildContext::new(self.config.is_strict());
        self.stage.clear();
        self.engine.reload();

        tracing::info!(incremental = changed.is_some(), "build started");
        for phase in Phase::ALL {
            ctx.phase = phase;
            tracing::debug!(%phase, "phase started");
            self.hooks.phase_start(self, &mut ctx);

            if phase == Phase::Discover {
                ctx.resources = self.discover(changed, &mut ctx)?;
            }

            self.dispatch(&mut ctx);
            if phase == Phase::Finalize {
                self.fall_through(&mut ctx);
            }

            self.hooks.phase_end(self, &mut ctx);
            tracing::debug!(%phase, "phase finished");
        }

        let report = ctx.into_report(start.elapsed());
        tracing::info!(
            processed = report.processed,
            generated = report.generated.len(),
            errors = report.errors.len(),
            elapsed = ?report.elapsed,
            "build finished"
        );

        Ok(report)
    }

    fn discover(&self, changed: Option<&[PathBuf]>, ctx: &mut BuildContext) -> Result<Vec<Arc<Resource>>> {
        let paths = match changed {
            Some(changed) => self.expand_changes(changed, ctx),
            None => {
                let found = self.walk()?;
                let known: FxHashSet<&Path> = found.iter().map(|p| p.as_path()).collect();
                for resource in self.registry.resources() {
                    let vanished = resource.path().starts_with(&self.config.content_dir)
                        && resource.state() != State::Deleted
                        && !known.contains(resource.path());

                    if vanished {
                        self.remove_source(&resource, ctx);
                    }
                }

                found
            }
        };

        let mut resources = Vec::with_capacity(paths.len());
        for path in paths {
            let resource = self.registry.get_or_create(&path);
            self.registry.reset(&resource);
            match self.registry.load(&resource) {
                Ok(()) => resources.push(resource),
                Err(e) => ctx.record(Some(&path), e),
            }
        }

        resources.sort_by_key(|r| (priority(r), r.path().to_path_buf()));
        for owner in resources.iter().filter(|r| r.needs_index()) {
            match assets::colocate(&self.registry, owner, &self.asset_globs, &self.ignore_globs) {
                Ok(found) if !found.is_empty() => {
                    tracing::debug!(path = %owner.path().display(), assets = found.len(), "co-located assets");
                }
                Ok(_) => {}
                Err(e) => ctx.record(Some(owner.path()), e),
            }
        }

        resources.retain(|r| r.asset_of().is_none());
        tracing::debug!(resources = resources.len(), "discovered");
        Ok(resources)
    }

    /// Lists every file below the content directory that isn't ignored.
    fn walk(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.content_dir;
        if !root.is_dir() {
            return err!("content directory does not exist", "path" => root.display())
                .kind(ErrorKind::Walk);
        }

        let ignore = self.ignore_globs.clone();
        let walker = jwalk::WalkDir::new(root)
            .sort(true)
            .skip_hidden(false)
            .follow_links(true)
            .process_read_dir(move |_, _, _, children| {
                children.retain(|entry| match entry {
                    Ok(entry) => !entry.file_name().to_str().map_or(false, |n| ignore.is_match(n)),
                    Err(_) => true,
                });
            });

        let mut files = vec![];
        for entry in walker {
            let entry = entry
                .chain_with(|| error!("failed to walk content directory", "root" => root.display()))
                .kind(ErrorKind::Walk)?;

            if entry.file_type().is_file() {
                files.push(normalize(&entry.path()));
            }
        }

        Ok(files)
    }

    /// Turns a batch of changed paths into the paths to rediscover.
    fn expand_changes(&self, changed: &[PathBuf], ctx: &mut BuildContext) -> Vec<PathBuf> {
        let mut seen = FxHashSet::default();
        let mut paths = vec![];
        let mut push = |path: &Path| {
            if seen.insert(path.to_path_buf()) {
                paths.push(path.to_path_buf());
            }
        };

        let mut templates_changed = false;
        for path in changed.iter().map(|p| normalize(p)) {
            if path.starts_with(&self.config.template_dir) {
                templates_changed = true;
                continue;
            }

            if !path.starts_with(&self.config.content_dir) || self.is_ignored(&path) {
                continue;
            }

            let known = self.registry.get(&path);
            let owner = known.as_ref().and_then(|r| r.asset_of());
            let is_new = known.as_ref().map_or(true, |r| r.state() == State::Deleted);
            if path.is_file() {
                push(&path);
                // A new file may be an asset of a page that didn't change.
                if is_new {
                    for page in self.pages_beside(&path) {
                        push(page.path());
                    }
                }
            } else if let Some(resource) = known {
                self.remove_source(&resource, ctx);
            }

            if let Some(owner) = owner.filter(|o| o.state() != State::Deleted) {
                push(owner.path());
            }
        }

        for resource in self.registry.resources() {
            let listing = resource.is_index() || resource.is_parametric();
            let rerender = listing || (templates_changed && resource.needs_index());
            if rerender
                && resource.path().starts_with(&self.config.content_dir)
                && resource.state() != State::Deleted
                && resource.path().is_file()
            {
                push(resource.path());
            }
        }

        paths
    }

    /// Live pages in the same directory as `path`.
    fn pages_beside(&self, path: &Path) -> Vec<Arc<Resource>> {
        self.registry.resources()
            .into_iter()
            .filter(|r| r.needs_index() && r.path() != path && r.path().parent() == path.parent())
            .filter(|r| r.state() != State::Deleted && r.path().is_file())
            .collect()
    }

    /// Marks a source as deleted and removes everything it produced. Its
    /// assets are released.
    fn remove_source(&self, resource: &Arc<Resource>, ctx: &mut BuildContext) {
        tracing::debug!(path = %resource.path().display(), "source removed");
        let targets = self.graph.lock().remove_edges_from(resource.path());
        self.prune(targets, ctx);
        self.registry.mark_deleted(resource.path());
    }

    /// Deletes the outputs in `stale` that no source produces anymore. A
    /// shared asset copy survives while another asset still maps to it.
    fn prune(&self, stale: Vec<PathBuf>, ctx: &mut BuildContext) {
        for path in stale {
            let orphaned = self.graph.lock().sources_of(&path).is_empty();
            if orphaned {
                self.delete_output(&path, ctx);
            }
        }
    }

    /// Deletes a generated file. Paths outside the output directory are
    /// never touched.
    fn delete_output(&self, path: &Path, ctx: &mut BuildContext) {
        let output = &self.config.output_dir;
        if !path.starts_with(output) {
            return;
        }

        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "pruned stale output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let error = Error::from(e).chain(error!("failed to remove stale output", "path" => path.display()));
                ctx.record(Some(path), error);
            }
        }

        // Drop the directory a folded page lived in if it's now empty.
        if let Some(parent) = path.parent().filter(|p| p != &output.as_path()) {
            let _ = std::fs::remove_dir(parent);
        }

        if let Some(target) = self.registry.get(path) {
            target.set_state(State::Deleted);
        }
    }

    fn phase_rules(&self, phase: Phase) -> PhaseRules {
        let rules: Vec<(Arc<dyn Rule>, Capabilities)> = self.rules.iter()
            .map(|rule| (rule.clone(), rule.capabilities()))
            .filter(|(_, caps)| caps.phase == phase)
            .collect();

        let named: Vec<(&str, &Capabilities)> = rules.iter()
            .map(|(rule, caps)| (rule.name(), caps))
            .collect();

        let order = rule::order(&named);
        let ordered: Vec<_> = order.into_iter().map(|i| rules[i].clone()).collect();

        let mut parametric_first: Vec<usize> = (0..ordered.len()).collect();
        parametric_first.sort_by_key(|&i| Reverse(ordered[i].1.parametric));

        PhaseRules { ordered, parametric_first }
    }

    fn dispatch(&self, ctx: &mut BuildContext) {
        let rules = self.phase_rules(ctx.phase);
        if rules.ordered.is_empty() {
            return;
        }

        let names: Vec<&str> = rules.ordered.iter().map(|(r, _)| r.name()).collect();
        tracing::debug!(phase = %ctx.phase, rules = ?names, "dispatching");

        for resource in ctx.resources.clone() {
            if let Some(rule) = ctx.claims.claimed_by(resource.path()) {
                tracing::trace!(path = %resource.path().display(), rule, "already claimed");
                continue;
            }

            if resource.state() != State::Loaded {
                continue;
            }

            let order: Box<dyn Iterator<Item = usize>> = match resource.is_parametric() {
                true => Box::new(rules.parametric_first.iter().copied()),
                false => Box::new(0..rules.ordered.len()),
            };

            for i in order {
                let (rule, caps) = &rules.ordered[i];
                match rule.targets_for(self, &resource) {
                    Ok(None) => continue,
                    Ok(Some(claim)) => self.process(&**rule, caps, &resource, claim, ctx),
                    Err(e) => {
                        ctx.claims.claim(resource.path(), rule.name());
                        resource.fail(&e);
                        ctx.record(Some(resource.path()), e);
                    }
                }

                break;
            }
        }
    }

    /// Hands every resource no rule claimed to the default rule, or copies it.
    fn fall_through(&self, ctx: &mut BuildContext) {
        let default: &dyn Rule = self.default_rule.as_deref().unwrap_or(&CopyRule);
        let caps = default.capabilities();
        for resource in ctx.resources.clone() {
            if ctx.claims.is_claimed(resource.path()) || resource.state() != State::Loaded {
                continue;
            }

            match default.targets_for(self, &resource) {
                Ok(Some(claim)) => self.process(default, &caps, &resource, claim, ctx),
                Ok(None) => tracing::trace!(path = %resource.path().display(), "left unhandled"),
                Err(e) => {
                    ctx.claims.claim(resource.path(), default.name());
                    resource.fail(&e);
                    ctx.record(Some(resource.path()), e);
                }
            }
        }
    }

    fn process(
        &self,
        rule: &dyn Rule,
        caps: &Capabilities,
        resource: &Arc<Resource>,
        claim: Claim,
        ctx: &mut BuildContext,
    ) {
        let phase = ctx.phase;
        ctx.claims.claim(resource.path(), rule.name());
        for sibling in &claim.siblings {
            ctx.claims.claim(sibling.path(), rule.name());
        }

        tracing::debug!(
            rule = rule.name(),
            path = %resource.path().display(),
            targets = claim.targets.len(),
            "claimed"
        );

        self.retarget(rule, resource, &claim.targets, ctx);

        let inputs: Vec<Arc<Resource>> = std::iter::once(resource.clone())
            .chain(claim.siblings.iter().cloned())
            .collect();

        let functions = self.functions_for(resource);
        match rule.run(self, &inputs, &claim.targets, &functions) {
            Ok(()) => claim.targets.iter().for_each(|t| t.set_state(State::Loaded)),
            Err(e) => {
                let e = match e.kind() {
                    ErrorKind::Other => e.with_kind(ErrorKind::Rule),
                    _ => e,
                };

                claim.targets.iter().for_each(|t| t.fail(&e));
                ctx.record(Some(resource.path()), e);
            }
        }

        if !caps.handles_assets {
            self.place_assets(resource, &claim.targets, ctx);
        }

        ctx.generated.extend(claim.targets.iter().cloned());
        tracing::trace!(phase = %phase, path = %resource.path().display(), "processed");
        self.hooks.resource_processed(self, resource, &claim.targets);
    }

    /// Replaces the edges out of `resource` with edges to `targets`, and
    /// deletes what it produced before but no longer does.
    fn retarget(&self, rule: &dyn Rule, resource: &Arc<Resource>, targets: &[Arc<Resource>], ctx: &mut BuildContext) {
        let rule_name: Arc<str> = rule.name().into();
        let stale = {
            let mut graph = self.graph.lock();
            let old = graph.remove_edges_from(resource.path());
            for target in targets {
                target.set_source(resource);
                target.set_produced_by(rule_name.clone(), ctx.phase);
                if !graph.add_edge(resource.path(), target.path()) {
                    ctx.record(Some(target.path()), error! {
                        "dependency edge would close a cycle",
                        "from" => resource.path().display(),
                        "to" => target.path().display(),
                    }.with_kind(ErrorKind::Cycle));
                }
            }

            old.into_iter()
                .filter(|old| !targets.iter().any(|t| t.path() == old))
                .collect::<Vec<_>>()
        };

        self.prune(stale, ctx);
    }

    fn place_assets(&self, owner: &Arc<Resource>, targets: &[Arc<Resource>], ctx: &mut BuildContext) {
        let Some(page) = targets.first() else {
            return;
        };

        for asset in owner.assets() {
            if let Err(e) = self.registry.load(&asset) {
                ctx.record(Some(asset.path()), e);
                continue;
            }

            let placed = assets::placement(&self.config, owner, page.path(), &asset)
                .and_then(|placement| {
                    assets::place(&mut ctx.placed, &placement, &asset)?;
                    Ok(placement)
                });

            match placed {
                Ok(placement) => self.move_asset(&asset, &placement.dest, ctx),
                Err(e) => ctx.record(Some(asset.path()), e),
            }
        }
    }

    /// Points `asset` at `dest` and prunes where it was placed before.
    fn move_asset(&self, asset: &Resource, dest: &Path, ctx: &mut BuildContext) {
        let stale = {
            let mut graph = self.graph.lock();
            let old = graph.remove_edges_from(asset.path());
            graph.add_edge(asset.path(), dest);
            old.into_iter().filter(|old| old != dest).collect::<Vec<_>>()
        };

        self.prune(stale, ctx);
    }
}
