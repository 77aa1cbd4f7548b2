//! Rules: the pluggable units deciding what each resource becomes.
//!
//! A rule answers two questions. [`Rule::targets_for`] decides, without
//! producing anything, whether the rule applies to a resource and which
//! outputs it would produce. [`Rule::run`] produces them. The scheduler calls
//! `run` at most once per resource per build, for the first rule that claims
//! it.

mod claims;
mod order;
mod copy;
mod page;
mod parametric;
mod sitemap;
#[cfg(feature = "sass")]
mod sass;

pub use claims::Claims;
pub use order::{order, overlaps};
pub use copy::CopyRule;
pub use page::{PageRule, render_page, template_params};
pub use parametric::{ParamSource, ParametricRule, RenderDiscovery, StaticParams, TaxonomyParams, dedup_values};
pub use sitemap::Sitemap;
#[cfg(feature = "sass")]
pub use sass::SassRule;

use std::sync::Arc;

use crate::build::Phase;
use crate::error::Result;
use crate::resource::Resource;
use crate::site::Site;
use crate::templating::Functions;

/// What a rule declares about itself. The scheduler consults only this.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// The phase the rule is dispatched in.
    pub phase: Phase,
    /// Path patterns of resources this rule reads.
    pub depends_on: Vec<String>,
    /// Path patterns of resources this rule writes.
    pub produces: Vec<String>,
    /// The rule places the claimed resource's assets itself.
    pub handles_assets: bool,
    /// The rule fans parametric resources out. Such rules are offered
    /// parametric resources before any other rule.
    pub parametric: bool,
}

impl Capabilities {
    pub fn in_phase(phase: Phase) -> Self {
        Capabilities { phase, ..Capabilities::default() }
    }
}

/// A rule's answer for a resource it applies to.
#[derive(Debug, Clone, Default)]
pub struct Claim {
    /// Other resources read alongside the claimed one. They are claimed too.
    pub siblings: Vec<Arc<Resource>>,
    /// The resources `run` must produce. May be empty.
    pub targets: Vec<Arc<Resource>>,
}

impl Claim {
    pub fn to(targets: Vec<Arc<Resource>>) -> Self {
        Claim { siblings: vec![], targets }
    }

    /// A claim producing nothing: the resource is consumed.
    pub fn empty() -> Self {
        Claim::default()
    }
}

pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// `Ok(None)` if the rule doesn't apply to `resource`.
    ///
    /// May be called speculatively: besides annotating `resource` and the
    /// targets it returns, it must not have side effects.
    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> Result<Option<Claim>>;

    /// Produces every resource in `targets` from `inputs`, the claimed
    /// resource followed by its siblings.
    fn run(
        &self,
        site: &Site,
        inputs: &[Arc<Resource>],
        targets: &[Arc<Resource>],
        functions: &Functions,
    ) -> Result<()>;
}

/// Writes `contents` to `path`, creating parent directories.
pub(crate) fn write_output(path: &std::path::Path, contents: &[u8]) -> Result<()> {
    use crate::error::Chainable;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .chain_with(|| error!("failed to create output directory", "path" => parent.display()))?;
    }

    std::fs::write(path, contents)
        .chain_with(|| error!("failed to write output", "path" => path.display()))
}
