use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Chainable, Result};
use crate::util::GlobSet;

/// The name of the configuration file looked up in a site's root.
pub const CONFIG_FILE: &str = "weft.toml";

/// The environment variable which, when set to anything but `0` or `false`,
/// turns every recorded build error into a panic.
pub const STRICT_ENV: &str = "WEFT_STRICT";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The site root. Relative directories below are resolved against it.
    pub root: PathBuf,
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    pub template_dir: PathBuf,
    /// Prefix for every generated URL.
    pub base_url: String,
    /// Globs naming sibling files that become assets of a content file.
    pub asset_patterns: Vec<String>,
    /// Globs over file and directory names skipped during discovery.
    pub ignore: Vec<String>,
    /// Exclude drafts from site listings. Drafts are still built.
    pub hide_drafts: bool,
    pub strict: bool,
    /// Output subdirectory holding assets shared by parametric pages.
    pub shared_asset_dir: String,
    /// Free-form values exposed to templates as `site.globals`.
    pub globals: serde_json::Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from("."),
            content_dir: "content".into(),
            output_dir: "public".into(),
            template_dir: "templates".into(),
            base_url: "/".into(),
            asset_patterns: ["*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.webp", "*.csv", "*.json"]
                .map(String::from)
                .to_vec(),
            ignore: [".*", "*~", "*.swp", "*.tmp"]
                .map(String::from)
                .to_vec(),
            hide_drafts: true,
            strict: false,
            shared_asset_dir: "_assets".into(),
            globals: Default::default(),
        }
    }
}

impl Config {
    /// Reads `weft.toml` from `root` if it exists, otherwise uses defaults.
    /// Directories are made absolute relative to `root`.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Config> {
        let root = root.as_ref();
        let file = root.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&file) {
            Ok(string) => toml::from_str::<Config>(&string)
                .chain_with(|| error! {
                    "invalid configuration file",
                    "path" => file.display(),
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e).chain_with(|| error! {
                "failed to read configuration file",
                "path" => file.display(),
            }),
        };

        config.root = root.to_path_buf();
        Ok(config.resolved())
    }

    /// A default configuration rooted at `root`.
    pub fn rooted<P: AsRef<Path>>(root: P) -> Config {
        Config { root: root.as_ref().to_path_buf(), ..Config::default() }.resolved()
    }

    fn resolved(mut self) -> Self {
        self.content_dir = self.root.join(&self.content_dir);
        self.output_dir = self.root.join(&self.output_dir);
        self.template_dir = self.root.join(&self.template_dir);
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }

        self
    }

    /// Whether errors must abort: either `strict` is set or the strict
    /// environment variable is.
    pub fn is_strict(&self) -> bool {
        self.strict || std::env::var(STRICT_ENV)
            .map_or(false, |v| !matches!(v.trim(), "" | "0" | "false"))
    }

    pub fn asset_globs(&self) -> Result<GlobSet> {
        GlobSet::new(&self.asset_patterns)
    }

    pub fn ignore_globs(&self) -> Result<GlobSet> {
        GlobSet::new(&self.ignore)
    }

    /// The URL for a path relative to the output directory.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative.trim_start_matches('/'))
    }
}
