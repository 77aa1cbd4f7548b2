#![doc = svgbobdoc::transform!(
//! A rule-driven, phased build engine for static sites.
//!
//! # Overview
//!
//! Weft turns a directory of content into a directory of output. It knows
//! nothing about what content _is_: every file becomes a [`Resource`], and
//! pluggable [`Rule`]s decide which outputs each resource produces. The
//! engine schedules rules, tracks which files produced which, places
//! co-located assets, and fans parametric files like `tags/[tag].md` out into
//! one page per discovered value.
//!
//! ```svgbob
//!   +-----------+    +------------+    +-------------+    +-------------+
//!   | Discover  |--->| Transform  |--->|  Generate   |--->|  Finalize   |
//!   +-----+-----+    +------+-----+    +------+------+    +------+------+
//!         |                 |                 |                  |
//!    walk, load,       stylesheets,      pages, fan-out     sitemap, then
//!    attach assets     other inputs      of "[param]"       unclaimed files
//!         |                 |                 |                  |
//!         v                 v                 v                  v
//!   +-----------------------------------------------------------------+
//!   |                    Registry  +  DependencyGraph                 |
//!   +-----------------------------------------------------------------+
//! ```
//!
//! ## Building
//!
//! A [`Site`] owns everything one build needs: the [`Config`], a resource
//! [`Registry`], the dependency graph, the rules, and the template and
//! markdown collaborators. Calling [`Site::rebuild()`] runs the four phases
//! in order:
//!
//! 1. **Discover** walks the content directory, loads each file's front
//!    matter, and attaches assets matching the configured patterns to the
//!    page beside them.
//! 2. **Transform**, **Generate**, and **Finalize** each offer every resource
//!    to the phase's rules in dependency order. The first rule whose
//!    [`Rule::targets_for()`] claims a resource runs it. Nothing else does.
//! 3. Resources nobody claimed are copied verbatim.
//!
//! Errors in single resources are recorded in the returned [`BuildReport`]
//! and the build carries on. Setting `WEFT_STRICT` turns them into panics.
//!
//! ```rust,no_run
//! use weft::{Config, Site};
//!
//! let site = Site::new(Config::load(".")?)?;
//! let report = site.rebuild(None)?;
//! for error in &report.errors {
//!     eprintln!("{}: {}", error.kind, error.message);
//! }
//! # Ok::<(), weft::error::Error>(())
//! ```
)]

#[macro_use]
pub mod error;
pub mod util;
pub mod config;
pub mod frontmatter;
pub mod resource;
pub mod graph;
pub mod layout;
pub mod assets;
pub mod markdown;
pub mod templating;
pub mod rule;
pub mod build;
pub mod site;
pub mod watch;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use frontmatter::FrontMatter;
pub use resource::{Registry, Resource, State};
pub use graph::DependencyGraph;
pub use rule::{Capabilities, Claim, Rule};
pub use build::{BuildContext, BuildError, BuildReport, Phase};
pub use site::{PageInfo, Query, Site, Stage};
pub use watch::Watcher;
