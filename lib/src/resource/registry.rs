use std::hash::BuildHasherDefault;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHasher;

use crate::error::{Chainable, ErrorKind, Result};
use crate::frontmatter::FrontMatter;
use crate::resource::{Resource, State};
use crate::util::normalize;

type Hasher = BuildHasherDefault<FxHasher>;

/// The canonical store of every resource a site knows about, keyed by
/// absolute path.
#[derive(Debug, Default)]
pub struct Registry {
    map: DashMap<PathBuf, Arc<Resource>, Hasher>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Returns the resource for `path`, creating it in [`State::Pending`] if
    /// it isn't known yet. Every call with the same path returns the same
    /// instance.
    pub fn get_or_create<P: AsRef<Path>>(&self, path: P) -> Arc<Resource> {
        let path = normalize(path.as_ref());
        if let Some(resource) = self.map.get(&path) {
            return resource.clone();
        }

        self.map.entry(path.clone())
            .or_insert_with(|| Arc::new(Resource::new(path)))
            .clone()
    }

    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<Arc<Resource>> {
        let path = normalize(path.as_ref());
        self.map.get(&path).map(|r| r.clone())
    }

    /// Reads the resource's metadata: the front matter of a page, the
    /// existence of anything else.
    ///
    /// On failure the resource moves to [`State::Failed`], or
    /// [`State::NotFound`] if the file doesn't exist, and keeps the error.
    pub fn load(&self, resource: &Resource) -> Result<()> {
        let result = Self::read(resource);
        match &result {
            Ok(()) => resource.set_state(State::Loaded),
            Err(e) => {
                resource.fail(e);
                if !resource.path().exists() {
                    resource.set_state(State::NotFound);
                }
            }
        }

        result
    }

    fn read(resource: &Resource) -> Result<()> {
        let path = resource.path();
        let metadata = std::fs::metadata(path)
            .chain_with(|| error!("failed to stat resource", "path" => path.display()))?;

        if !metadata.is_file() {
            let e = io::Error::new(io::ErrorKind::InvalidInput, "not a regular file");
            return Err(e).chain_with(|| error!("cannot load resource", "path" => path.display()));
        }

        if resource.needs_index() {
            let string = std::fs::read_to_string(path)
                .chain_with(|| error!("failed to read resource", "path" => path.display()))?;

            let (front_matter, len) = FrontMatter::parse(&string)
                .chain_with(|| error!("failed to parse front matter", "path" => path.display()))
                .kind(ErrorKind::Parse)?;

            resource.set_front_matter(Arc::new(front_matter), len);
        }

        Ok(())
    }

    /// Restores the resource to [`State::Pending`] so it is reloaded and
    /// reprocessed.
    pub fn reset(&self, resource: &Resource) {
        resource.reset();
    }

    /// Marks the resource at `path`, if known, as deleted.
    pub fn mark_deleted<P: AsRef<Path>>(&self, path: P) -> Option<Arc<Resource>> {
        let resource = self.get(path)?;
        resource.reset();
        resource.set_state(State::Deleted);
        Some(resource)
    }

    /// Every known resource, sorted by path.
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        let mut resources: Vec<_> = self.map.iter()
            .map(|entry| entry.value().clone())
            .collect();

        resources.sort_by(|a, b| a.path().cmp(b.path()));
        resources
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
