use std::path::PathBuf;
use std::sync::Arc;

use crate::build::Phase;
use crate::error::Result;
use crate::layout;
use crate::resource::Resource;
use crate::rule::{write_output, Capabilities, Claim, Rule};
use crate::site::Site;
use crate::templating::Functions;

/// Compiles `.scss` and `.sass` stylesheets to `.css`. Partials, whose names
/// start with `_`, are consumed without output; they are pulled in by the
/// stylesheets importing them.
#[derive(Debug, Clone)]
pub struct SassRule {
    style: grass::OutputStyle,
    load_paths: Vec<PathBuf>,
}

impl Default for SassRule {
    fn default() -> Self {
        SassRule::new(grass::OutputStyle::Expanded)
    }
}

impl SassRule {
    pub fn new(style: grass::OutputStyle) -> Self {
        SassRule { style, load_paths: vec![] }
    }

    /// Adds a directory `@use` and `@import` resolve against, after the
    /// stylesheet's own directory.
    pub fn load_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.load_paths.push(path.into());
        self
    }

    fn options(&self) -> grass::Options<'_> {
        grass::Options::default()
            .style(self.style)
            .load_paths(&self.load_paths)
    }
}

impl Rule for SassRule {
    fn name(&self) -> &str {
        "sass"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            depends_on: vec!["*.scss".into(), "*.sass".into()],
            produces: vec!["*.css".into()],
            ..Capabilities::in_phase(Phase::Transform)
        }
    }

    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> Result<Option<Claim>> {
        if !matches!(resource.extension(), Some("scss" | "sass")) {
            return Ok(None);
        }

        if resource.file_name().starts_with('_') {
            return Ok(Some(Claim::empty()));
        }

        let dest = layout::output_path(site.config(), resource).with_extension("css");
        Ok(Some(Claim::to(vec![site.registry().get_or_create(dest)])))
    }

    fn run(&self, _: &Site, inputs: &[Arc<Resource>], targets: &[Arc<Resource>], _: &Functions) -> Result<()> {
        let Some(source) = inputs.first() else {
            return Ok(());
        };

        let css = grass::from_path(source.path(), &self.options())
            .map_err(|e| error!("failed to render sass as css", "path" => source.path().display(), e))?;

        for target in targets {
            write_output(target.path(), css.as_bytes())?;
        }

        Ok(())
    }
}
