//! Where outputs land and the URLs they are served at.
//!
//! `a/b.md` becomes `a/b/index.html`, `a/index.md` becomes `a/index.html`,
//! a fan-out of `tags/[tag].md` becomes `tags/<slug>/index.html`, and every
//! other file is mirrored as-is.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::resource::Resource;
use crate::util::url_path;

pub const INDEX_FILE: &str = "index.html";

/// `path` relative to the content directory, or `None` if it lies outside.
pub fn relative<'a>(config: &Config, path: &'a Path) -> Option<&'a Path> {
    path.strip_prefix(&config.content_dir).ok()
}

/// The output path of a non-parametric source.
pub fn output_path(config: &Config, source: &Resource) -> PathBuf {
    let rel = relative(config, source.path()).unwrap_or_else(|| Path::new(source.file_name()));
    if !source.needs_index() {
        return config.output_dir.join(rel);
    }

    let dir = config.output_dir.join(rel.parent().unwrap_or(Path::new("")));
    match source.is_index() {
        true => dir.join(INDEX_FILE),
        false => {
            let stem = rel.file_stem().unwrap_or_default();
            dir.join(stem).join(INDEX_FILE)
        }
    }
}

/// The output path of the fan-out instance of a parametric `source` for a
/// parameter value slugged to `slug`.
pub fn param_output_path(config: &Config, source: &Resource, slug: &str) -> PathBuf {
    let rel = relative(config, source.path()).unwrap_or_else(|| Path::new(source.file_name()));
    let dir = config.output_dir.join(rel.parent().unwrap_or(Path::new("")));
    match (source.needs_index(), source.extension()) {
        (true, _) => dir.join(slug).join(INDEX_FILE),
        (false, Some(ext)) => dir.join(format!("{slug}.{ext}")),
        (false, None) => dir.join(slug),
    }
}

/// The URL an output path is served at. A trailing `index.html` is dropped.
pub fn url_of(config: &Config, output: &Path) -> String {
    let rel = output.strip_prefix(&config.output_dir).unwrap_or(output);
    let mut url = url_path(rel);
    let dir_len = match url.strip_suffix(INDEX_FILE) {
        Some(dir) if dir.is_empty() || dir.ends_with('/') => Some(dir.len()),
        _ => None,
    };

    if let Some(len) = dir_len {
        url.truncate(len);
    }

    config.url_for(&url)
}

/// The directory of a content path relative to the content root, joined
/// with `/`. Pages directly under the root are in section `""`.
pub fn section_of(config: &Config, path: &Path) -> String {
    relative(config, path)
        .and_then(|rel| rel.parent())
        .map(url_path)
        .unwrap_or_default()
}
