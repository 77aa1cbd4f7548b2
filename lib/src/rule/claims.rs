use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Which rule claimed which resource during one build.
#[derive(Debug, Default, Clone)]
pub struct Claims {
    map: FxHashMap<PathBuf, Arc<str>>,
}

impl Claims {
    /// Records that `rule` claimed `path`. Returns `false`, recording
    /// nothing, if `path` was already claimed by any rule.
    pub fn claim(&mut self, path: &Path, rule: &str) -> bool {
        if self.map.contains_key(path) {
            return false;
        }

        self.map.insert(path.to_path_buf(), rule.into());
        true
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.map.contains_key(path)
    }

    /// The rule that claimed `path`, if any.
    pub fn claimed_by(&self, path: &Path) -> Option<&str> {
        self.map.get(path).map(|rule| &**rule)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
