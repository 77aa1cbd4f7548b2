use std::sync::Arc;

use crate::build::Phase;
use crate::error::{Chainable, Result};
use crate::layout;
use crate::resource::Resource;
use crate::rule::{Capabilities, Claim, Rule};
use crate::site::Site;
use crate::templating::Functions;

/// Copies a file byte-for-byte to its mirrored output path. This is what
/// happens to resources no other rule claims.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyRule;

impl Rule for CopyRule {
    fn name(&self) -> &str {
        "copy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::in_phase(Phase::Transform)
    }

    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> Result<Option<Claim>> {
        let dest = layout::output_path(site.config(), resource);
        Ok(Some(Claim::to(vec![site.registry().get_or_create(dest)])))
    }

    fn run(&self, _: &Site, inputs: &[Arc<Resource>], targets: &[Arc<Resource>], _: &Functions) -> Result<()> {
        let Some(source) = inputs.first() else {
            return Ok(());
        };

        for target in targets {
            if let Some(parent) = target.path().parent() {
                std::fs::create_dir_all(parent)
                    .chain_with(|| error!("failed to create output directory", "path" => parent.display()))?;
            }

            std::fs::copy(source.path(), target.path())
                .chain_with(|| error! {
                    "failed to copy file",
                    "from" => source.path().display(),
                    "to" => target.path().display(),
                })?;
        }

        Ok(())
    }
}
