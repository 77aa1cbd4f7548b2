//! Resources: files tracked by a build, inputs and outputs alike.

mod registry;

pub use registry::Registry;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use derive_more::Debug;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::build::Phase;
use crate::error::{Chainable, Error, Result};
use crate::frontmatter::FrontMatter;
use crate::markdown::Document;

/// File extensions of content that renders into a directory-style page.
pub const PAGE_EXTENSIONS: &[&str] = &["md", "markdown", "html", "htm"];

/// File stems naming the index page of a directory.
pub const INDEX_STEMS: &[&str] = &["index", "_index"];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Pending,
    Loaded,
    Deleted,
    NotFound,
    Failed,
}

/// A file-system unit identified by its absolute path.
///
/// Resources are shared: the [`Registry`] hands out the same `Arc<Resource>`
/// for a path every time, and the mutable parts live behind a lock so every
/// holder sees updates to param values, assets, and state.
#[derive(Debug)]
pub struct Resource {
    path: Arc<Path>,
    is_index: bool,
    needs_index: bool,
    is_parametric: bool,
    #[debug(ignore)]
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    state: State,
    error: Option<Error>,
    front_matter: Arc<FrontMatter>,
    matter_len: usize,
    document: Option<Document>,
    source: Weak<Resource>,
    assets: Vec<Arc<Resource>>,
    asset_of: Weak<Resource>,
    produced: Option<(Arc<str>, Phase)>,
    param_values: Option<Vec<String>>,
    param_name: Option<String>,
    content_hash: Option<String>,
}

impl Resource {
    pub(crate) fn new(path: PathBuf) -> Resource {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let needs_index = path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| PAGE_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(e)));

        Resource {
            is_index: INDEX_STEMS.contains(&stem),
            needs_index,
            is_parametric: stem.len() > 2 && stem.starts_with('[') && stem.ends_with(']'),
            path: path.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }

    /// Whether this is the index page of its directory.
    pub fn is_index(&self) -> bool {
        self.is_index
    }

    /// Whether this is a page: output is folded into a directory holding an
    /// `index.html`.
    pub fn needs_index(&self) -> bool {
        self.needs_index
    }

    /// Whether the file stem is bracket-delimited, as in `[tag].md`.
    pub fn is_parametric(&self) -> bool {
        self.is_parametric
    }

    /// The name between the brackets of a parametric resource.
    pub fn param_key(&self) -> Option<&str> {
        if !self.is_parametric {
            return None;
        }

        let stem = self.path.file_stem()?.to_str()?;
        stem.strip_prefix('[')?.strip_suffix(']')
    }

    pub fn state(&self) -> State {
        self.inner.read().state
    }

    pub(crate) fn set_state(&self, state: State) {
        self.inner.write().state = state;
    }

    /// The error that moved this resource into [`State::Failed`].
    pub fn error(&self) -> Option<Error> {
        self.inner.read().error.clone()
    }

    pub(crate) fn fail(&self, error: &Error) {
        let mut inner = self.inner.write();
        inner.state = State::Failed;
        inner.error = Some(error.clone());
    }

    pub fn front_matter(&self) -> Arc<FrontMatter> {
        self.inner.read().front_matter.clone()
    }

    /// Length in bytes of the front matter block, fences included.
    pub fn matter_len(&self) -> usize {
        self.inner.read().matter_len
    }

    pub(crate) fn set_front_matter(&self, front_matter: Arc<FrontMatter>, len: usize) {
        let mut inner = self.inner.write();
        inner.front_matter = front_matter;
        inner.matter_len = len;
    }

    /// Reads the file and returns everything after the front matter.
    pub fn body(&self) -> Result<String> {
        let mut string = std::fs::read_to_string(&self.path)
            .chain_with(|| error! {
                "failed to read resource",
                "path" => self.path.display(),
            })?;

        let len = self.matter_len();
        if len > 0 && len <= string.len() && string.is_char_boundary(len) {
            string.drain(..len);
        }

        Ok(string)
    }

    /// The parsed document, if a markdown collaborator has parsed this
    /// resource during the current build.
    pub fn document(&self) -> Option<Document> {
        self.inner.read().document.clone()
    }

    pub(crate) fn set_document(&self, document: Option<Document>) {
        self.inner.write().document = document;
    }

    /// The input resource this output was produced from.
    pub fn source(&self) -> Option<Arc<Resource>> {
        self.inner.read().source.upgrade()
    }

    pub(crate) fn set_source(&self, source: &Arc<Resource>) {
        let mut inner = self.inner.write();
        inner.source = Arc::downgrade(source);
        inner.front_matter = source.front_matter();
    }

    /// Sibling files owned by this resource.
    pub fn assets(&self) -> Vec<Arc<Resource>> {
        self.inner.read().assets.clone()
    }

    pub(crate) fn set_assets(&self, assets: Vec<Arc<Resource>>) {
        self.inner.write().assets = assets;
    }

    /// The content resource owning this asset.
    pub fn asset_of(&self) -> Option<Arc<Resource>> {
        self.inner.read().asset_of.upgrade()
    }

    pub(crate) fn set_asset_of(&self, owner: Option<&Arc<Resource>>) {
        self.inner.write().asset_of = owner.map_or_else(Weak::new, Arc::downgrade);
    }

    /// The rule and phase that generated this resource.
    pub fn produced_by(&self) -> Option<(Arc<str>, Phase)> {
        self.inner.read().produced.clone()
    }

    pub(crate) fn set_produced_by(&self, rule: Arc<str>, phase: Phase) {
        self.inner.write().produced = Some((rule, phase));
    }

    /// Parameter values discovered for a parametric resource. `None` until
    /// discovery has run.
    pub fn param_values(&self) -> Option<Vec<String>> {
        self.inner.read().param_values.clone()
    }

    pub(crate) fn set_param_values(&self, values: Option<Vec<String>>) {
        self.inner.write().param_values = values;
    }

    /// The single parameter value a fan-out target renders.
    pub fn param_name(&self) -> Option<String> {
        self.inner.read().param_name.clone()
    }

    pub(crate) fn set_param_name(&self, value: Option<String>) {
        self.inner.write().param_name = value;
    }

    /// Hex-encoded SHA-256 of the file's bytes, computed once per build.
    pub fn content_hash(&self) -> Result<String> {
        if let Some(hash) = self.inner.read().content_hash.clone() {
            return Ok(hash);
        }

        let bytes = std::fs::read(&self.path)
            .chain_with(|| error! {
                "failed to read file for hashing",
                "path" => self.path.display(),
            })?;

        let hash = hex::encode(Sha256::digest(&bytes));
        self.inner.write().content_hash = Some(hash.clone());
        Ok(hash)
    }

    /// Restores [`State::Pending`] and clears everything derived from the
    /// file's contents or from a previous build.
    pub(crate) fn reset(&self) {
        let old_assets = {
            let mut inner = self.inner.write();
            let assets = std::mem::take(&mut inner.assets);
            let asset_of = inner.asset_of.clone();
            *inner = Inner { asset_of, ..Inner::default() };
            assets
        };

        for asset in old_assets {
            let owned_by_self = asset.asset_of()
                .map_or(false, |owner| std::ptr::eq(&*owner, self));

            if owned_by_self {
                asset.set_asset_of(None);
            }
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Resource { }
