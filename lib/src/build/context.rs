use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;

use crate::build::Phase;
use crate::error::{Error, ErrorKind};
use crate::resource::Resource;
use crate::rule::Claims;

/// A non-fatal error recorded during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub kind: ErrorKind,
    pub path: Option<PathBuf>,
    pub message: String,
}

/// State that lives for exactly one build.
#[derive(Debug)]
pub struct BuildContext {
    pub phase: Phase,
    /// The resources this build dispatches, in priority order.
    pub resources: Vec<Arc<Resource>>,
    pub errors: Vec<BuildError>,
    /// Targets generated so far, in generation order.
    pub generated: Vec<Arc<Resource>>,
    pub(crate) claims: Claims,
    pub(crate) placed: FxHashSet<PathBuf>,
    strict: bool,
}

/// What a finished build reports back.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub errors: Vec<BuildError>,
    pub generated: Vec<PathBuf>,
    /// Number of resources a rule ran on.
    pub processed: usize,
    pub elapsed: Duration,
}

impl BuildContext {
    pub fn new(strict: bool) -> Self {
        BuildContext {
            phase: Phase::Discover,
            resources: vec![],
            errors: vec![],
            generated: vec![],
            claims: Claims::default(),
            placed: FxHashSet::default(),
            strict,
        }
    }

    /// Records `error` against `path`.
    ///
    /// # Panics
    ///
    /// In strict mode, with the error's text.
    pub fn record(&mut self, path: Option<&Path>, error: Error) {
        let kind = error.kind();
        match path {
            Some(path) => tracing::warn!(path = %path.display(), %kind, "{}", error.message()),
            None => tracing::warn!(%kind, "{}", error.message()),
        }

        if self.strict {
            panic!("{kind} (strict mode):\n{error}");
        }

        self.errors.push(BuildError {
            kind,
            path: path.map(Path::to_path_buf),
            message: error.to_string(),
        });
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub(crate) fn into_report(self, elapsed: Duration) -> BuildReport {
        BuildReport {
            processed: self.claims.len(),
            errors: self.errors,
            generated: self.generated.iter().map(|r| r.path().to_path_buf()).collect(),
            elapsed,
        }
    }
}

impl BuildReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
