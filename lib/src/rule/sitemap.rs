use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::build::Phase;
use crate::error::Result;
use crate::layout::{self, INDEX_FILE};
use crate::resource::Resource;
use crate::rule::{write_output, Capabilities, Claim, Rule};
use crate::site::Site;
use crate::templating::Functions;

/// Writes `sitemap.xml` listing every generated page.
///
/// The sitemap claims nothing. It watches processed resources for page
/// targets and writes the file once all pages exist, at the end of
/// [`Phase::Finalize`]. Pages survive across incremental rebuilds until their
/// output disappears.
#[derive(Debug, Clone, Default)]
pub struct Sitemap {
    urls: Arc<Mutex<BTreeMap<PathBuf, String>>>,
}

impl Sitemap {
    pub const FILE: &'static str = "sitemap.xml";

    /// Registers the sitemap's rule and hooks on `site`.
    pub fn install(site: &mut Site) {
        let sitemap = Sitemap::default();

        let urls = sitemap.urls.clone();
        site.on_resource_processed(move |site, _, targets| {
            let mut urls = urls.lock();
            for target in targets.iter().filter(|t| t.file_name() == INDEX_FILE) {
                let url = layout::url_of(site.config(), target.path());
                urls.insert(target.path().to_path_buf(), url);
            }
        });

        let urls = sitemap.urls.clone();
        site.on_phase_end(Phase::Finalize, move |site, ctx| {
            let mut urls = urls.lock();
            urls.retain(|path, _| path.exists());

            let path = site.config().output_dir.join(Self::FILE);
            let xml = render(urls.values());
            match write_output(&path, xml.as_bytes()) {
                Ok(()) => tracing::info!(path = %path.display(), pages = urls.len(), "wrote sitemap"),
                Err(e) => ctx.record(Some(path.as_path()), e),
            }
        });

        site.add_rule(sitemap);
    }
}

fn render<'a, I: Iterator<Item = &'a String>>(urls: I) -> String {
    let mut xml = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    ));

    for url in urls {
        xml.push_str("  <url><loc>");
        escape_into(&mut xml, url);
        xml.push_str("</loc></url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

fn escape_into(out: &mut String, string: &str) {
    for c in string.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

impl Rule for Sitemap {
    fn name(&self) -> &str {
        "sitemap"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            depends_on: vec!["*.html".into()],
            produces: vec![Self::FILE.into()],
            ..Capabilities::in_phase(Phase::Finalize)
        }
    }

    fn targets_for(&self, _: &Site, _: &Arc<Resource>) -> Result<Option<Claim>> {
        Ok(None)
    }

    fn run(&self, _: &Site, _: &[Arc<Resource>], _: &[Arc<Resource>], _: &Functions) -> Result<()> {
        Ok(())
    }
}
