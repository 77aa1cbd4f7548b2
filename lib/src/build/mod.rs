//! The phased scheduler.
//!
//! A build runs four phases in a fixed order, each exactly once, even when
//! nothing happens in it:
//!
//! 1. [`Phase::Discover`]: walk the content root, load resources, and attach
//!    co-located assets.
//! 2. [`Phase::Transform`]: rules that preprocess content without producing
//!    pages, like stylesheet compilation.
//! 3. [`Phase::Generate`]: page-producing rules, parametric fan-out included.
//! 4. [`Phase::Finalize`]: whole-site artifacts. Unclaimed resources fall
//!    through to the default rule at the end of this phase.

mod context;
mod hooks;
mod scheduler;

pub use context::{BuildContext, BuildError, BuildReport};
pub use hooks::{Hooks, PhaseHook, ProcessedHook};

use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Phase {
    Discover,
    Transform,
    #[default]
    Generate,
    Finalize,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Discover, Phase::Transform, Phase::Generate, Phase::Finalize];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Discover => "discover",
            Phase::Transform => "transform",
            Phase::Generate => "generate",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
