//! Asset co-location and deduplication.
//!
//! Files next to a page that match the asset patterns become that page's
//! assets. A non-parametric page gets its assets copied beside its output and
//! links them as `./name`. A parametric page renders many outputs, so its
//! assets are copied once into a shared directory keyed by a short content
//! hash, which every instance links to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::config::Config;
use crate::error::{Chainable, Result};
use crate::resource::{Registry, Resource, State};
use crate::util::GlobSet;

/// Number of hex characters of the SHA-256 content hash naming a shared
/// asset directory. Distinct files colliding on this prefix overwrite each
/// other.
pub const SHORT_HASH_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Where the asset is copied to.
    pub dest: PathBuf,
    /// How pages link to it.
    pub url: String,
    pub shared: bool,
}

/// Finds the assets of `owner`: files in its directory matching its
/// front matter `assets` globs, or `defaults` when it has none. Pages and
/// files already owned by another resource are skipped. Newly found assets
/// have their owner set.
pub fn colocate(
    registry: &Registry,
    owner: &Arc<Resource>,
    defaults: &GlobSet,
    ignore: &GlobSet,
) -> Result<Vec<Arc<Resource>>> {
    let overrides = match &owner.front_matter().assets {
        Some(patterns) => Some(GlobSet::new(patterns)
            .chain_with(|| error!("invalid `assets` globs", "path" => owner.path().display()))?),
        None => None,
    };

    let patterns = overrides.as_ref().unwrap_or(defaults);
    let Some(dir) = owner.path().parent() else {
        return Ok(vec![]);
    };

    let entries = std::fs::read_dir(dir)
        .chain_with(|| error!("failed to list asset directory", "path" => dir.display()))?;

    let mut names = vec![];
    for entry in entries {
        let entry = entry.chain_with(|| error!("failed to list asset directory", "path" => dir.display()))?;
        if !entry.file_type().map_or(false, |t| t.is_file()) {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            if patterns.is_match(name) && !ignore.is_match(name) {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    let mut assets = vec![];
    for name in names {
        let asset = registry.get_or_create(dir.join(&name));
        if asset.needs_index() || Arc::ptr_eq(&asset, owner) {
            continue;
        }

        match asset.asset_of() {
            Some(other) if !Arc::ptr_eq(&other, owner) && other.state() != State::Deleted => {
                tracing::debug!(asset = %asset.path().display(), owner = %other.path().display(),
                    "asset already owned");
                continue;
            }
            _ => asset.set_asset_of(Some(owner)),
        }

        assets.push(asset);
    }

    owner.set_assets(assets.clone());
    Ok(assets)
}

/// The first [`SHORT_HASH_LEN`] hex characters of the asset's SHA-256.
pub fn short_hash(asset: &Resource) -> Result<String> {
    let mut hash = asset.content_hash()?;
    hash.truncate(SHORT_HASH_LEN);
    Ok(hash)
}

/// `<shared dir>/<hash>/<hash>.<ext>`, relative to the output directory. The
/// file name carries no trace of the source name, so identical bytes always
/// land on one path.
fn shared_path(config: &Config, asset: &Resource) -> Result<String> {
    let hash = short_hash(asset)?;
    Ok(match asset.extension() {
        Some(ext) => format!("{}/{hash}/{hash}.{ext}", config.shared_asset_dir),
        None => format!("{}/{hash}/{hash}", config.shared_asset_dir),
    })
}

/// Decides where `asset` of `owner` goes. `page_output` is the output path of
/// a non-parametric owner's page; it is ignored for parametric owners.
pub fn placement(
    config: &Config,
    owner: &Resource,
    page_output: &Path,
    asset: &Resource,
) -> Result<Placement> {
    let name = asset.file_name();
    if owner.is_parametric() {
        let rel = shared_path(config, asset)?;
        return Ok(Placement {
            dest: config.output_dir.join(&rel),
            url: config.url_for(&rel),
            shared: true,
        });
    }

    let dir = page_output.parent().unwrap_or(&config.output_dir);
    Ok(Placement {
        dest: dir.join(name),
        url: format!("./{name}"),
        shared: false,
    })
}

/// The URL pages rendered from `owner` link `asset` with.
pub fn url_for(config: &Config, owner: &Resource, asset: &Resource) -> Result<String> {
    match owner.is_parametric() {
        true => Ok(config.url_for(&shared_path(config, asset)?)),
        false => Ok(format!("./{}", asset.file_name())),
    }
}

/// Copies `asset` to `placement.dest` unless `placed` shows it was already
/// copied there during this build. Returns whether a copy happened.
pub fn place(placed: &mut FxHashSet<PathBuf>, placement: &Placement, asset: &Resource) -> Result<bool> {
    if placed.contains(&placement.dest) {
        return Ok(false);
    }

    if let Some(parent) = placement.dest.parent() {
        std::fs::create_dir_all(parent)
            .chain_with(|| error!("failed to create asset directory", "path" => parent.display()))?;
    }

    std::fs::copy(asset.path(), &placement.dest)
        .chain_with(|| error! {
            "failed to copy asset",
            "from" => asset.path().display(),
            "to" => placement.dest.display(),
        })?;

    tracing::debug!(asset = %asset.path().display(), dest = %placement.dest.display(),
        shared = placement.shared, "placed asset");

    placed.insert(placement.dest.clone());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        registry: Registry,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted(dir.path());
        for (path, contents) in files {
            let path = config.content_dir.join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        Fixture { _dir: dir, config, registry: Registry::new() }
    }

    fn load(f: &Fixture, path: &str) -> Arc<Resource> {
        let resource = f.registry.get_or_create(f.config.content_dir.join(path));
        f.registry.load(&resource).unwrap();
        resource
    }

    #[test]
    fn siblings_matching_patterns_are_owned() {
        let f = fixture(&[
            ("blog/post.md", "# Post"),
            ("blog/other.md", "# Other"),
            ("blog/diagram.png", "png"),
            ("blog/notes.txt", "txt"),
            ("blog/.hidden.png", "png"),
        ]);

        let post = load(&f, "blog/post.md");
        let defaults = f.config.asset_globs().unwrap();
        let ignore = f.config.ignore_globs().unwrap();
        let assets = colocate(&f.registry, &post, &defaults, &ignore).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].file_name(), "diagram.png");
        assert!(Arc::ptr_eq(&assets[0].asset_of().unwrap(), &post));

        // The first owner keeps it.
        let other = load(&f, "blog/other.md");
        assert!(colocate(&f.registry, &other, &defaults, &ignore).unwrap().is_empty());
    }

    #[test]
    fn front_matter_overrides_patterns() {
        let f = fixture(&[
            ("post.md", "+++\nassets = [\"*.txt\"]\n+++\n"),
            ("a.png", "png"),
            ("b.txt", "txt"),
        ]);

        let post = load(&f, "post.md");
        let defaults = f.config.asset_globs().unwrap();
        let assets = colocate(&f.registry, &post, &defaults, &GlobSet::default()).unwrap();
        let names: Vec<_> = assets.iter().map(|a| a.file_name().to_string()).collect();
        assert_eq!(names, ["b.txt"]);
    }

    #[test]
    fn non_parametric_assets_sit_beside_the_page() {
        let f = fixture(&[("blog/post.md", ""), ("blog/diagram.png", "png")]);
        let post = load(&f, "blog/post.md");
        let image = load(&f, "blog/diagram.png");

        let page = f.config.output_dir.join("blog/post/index.html");
        let placement = placement(&f.config, &post, &page, &image).unwrap();
        assert_eq!(placement.dest, f.config.output_dir.join("blog/post/diagram.png"));
        assert_eq!(placement.url, "./diagram.png");
        assert!(!placement.shared);
    }

    #[test]
    fn shared_placement_is_content_addressed() {
        let f = fixture(&[
            ("tags/[tag].md", ""),
            ("tags/a.png", "same bytes"),
            ("tags/b.png", "same bytes"),
            ("tags/c.png", "other bytes"),
        ]);

        let owner = load(&f, "tags/[tag].md");
        let page = f.config.output_dir.join("tags/x/index.html");
        let a = placement(&f.config, &owner, &page, &load(&f, "tags/a.png")).unwrap();
        let b = placement(&f.config, &owner, &page, &load(&f, "tags/b.png")).unwrap();
        let c = placement(&f.config, &owner, &page, &load(&f, "tags/c.png")).unwrap();

        assert!(a.shared);
        assert_eq!(a.dest, b.dest);
        assert_eq!(a.url, b.url);
        assert_ne!(a.dest, c.dest);

        let hash = a.dest.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert_eq!(hash.len(), SHORT_HASH_LEN);
        assert_eq!(a.dest.file_name().unwrap().to_str().unwrap(), format!("{hash}.png"));
        assert!(a.url.starts_with("/_assets/"));
        assert_eq!(url_for(&f.config, &owner, &load(&f, "tags/b.png")).unwrap(), a.url);
    }

    #[test]
    fn placing_twice_copies_once() {
        let f = fixture(&[("tags/[tag].md", ""), ("tags/a.png", "bytes")]);
        let owner = load(&f, "tags/[tag].md");
        let image = load(&f, "tags/a.png");
        let page = f.config.output_dir.join("tags/x/index.html");
        let placement = placement(&f.config, &owner, &page, &image).unwrap();

        let mut placed = FxHashSet::default();
        assert!(place(&mut placed, &placement, &image).unwrap());
        assert!(!place(&mut placed, &placement, &image).unwrap());
        assert_eq!(std::fs::read(&placement.dest).unwrap(), b"bytes");
    }
}
