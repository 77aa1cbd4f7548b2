use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use weft::error::{Chainable, Result};
use weft::{BuildReport, Config, Site};

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Builds static sites with weft.
        cmd loom {
            /// The site root, holding `weft.toml`. Defaults to the working
            /// directory.
            optional -r, --root root: PathBuf
            /// Abort on the first build error.
            optional --strict
            /// More logging. Repeat for even more.
            repeated -v, --verbose

            /// Builds the site once.
            cmd build {}

            /// Builds the site, then rebuilds it whenever sources change.
            cmd watch {
                /// Quiet period before a rebuild, in milliseconds.
                optional --debounce ms: u64
            }
        }
    }
}

fn init_tracing(verbose: u32) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => "weft=info,loom=info",
        1 => "weft=debug,loom=debug",
        _ => "weft=trace,loom=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    fmt().with_env_filter(env_filter).with_target(false).init();
}

fn site(root: &Path, strict: bool) -> Result<Site> {
    let root = root.canonicalize()
        .chain_with(|| weft::error!("site root is not accessible", "path" => root.display()))?;

    let mut config = Config::load(&root)?;
    config.strict |= strict;
    tracing::debug!(?config, "configuration loaded");
    Site::new(config)
}

fn summarize(report: &BuildReport) {
    for error in &report.errors {
        match &error.path {
            Some(path) => tracing::error!(kind = %error.kind, path = %path.display(), "{}", error.message),
            None => tracing::error!(kind = %error.kind, "{}", error.message),
        }
    }

    tracing::info!(
        "built {} files from {} sources in {}ms with {} errors",
        report.generated.len(),
        report.processed,
        report.elapsed.as_millis(),
        report.errors.len(),
    );
}

fn run(flags: flags::Loom) -> Result<bool> {
    let root = flags.root.unwrap_or_else(|| PathBuf::from("."));
    let site = site(&root, flags.strict)?;
    match flags.subcommand {
        flags::LoomCmd::Build(_) => {
            let report = site.rebuild(None)?;
            summarize(&report);
            Ok(report.is_ok())
        }
        flags::LoomCmd::Watch(watch) => {
            let delay = watch.debounce
                .map_or(weft::watch::DEFAULT_DEBOUNCE, Duration::from_millis);

            site.watch(delay, summarize)?;
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let flags = flags::Loom::from_env_or_exit();
    init_tracing(flags.verbose);

    match run(flags) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
