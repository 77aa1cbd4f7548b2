use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft::rule::CopyRule;
use weft::templating::Functions;
use weft::{Capabilities, Claim, Config, ErrorKind, Phase, Query, Resource, Rule, Site, State};

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Fixture {
        let fixture = Fixture { dir: tempfile::tempdir().unwrap() };
        for (path, contents) in files {
            fixture.write(path, contents);
        }

        fixture
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> Config {
        Config::rooted(self.root())
    }

    fn site(&self) -> Site {
        Site::new(self.config()).unwrap()
    }

    fn content(&self, path: &str) -> PathBuf {
        self.root().join("content").join(path)
    }

    fn public(&self, path: &str) -> PathBuf {
        self.root().join("public").join(path)
    }

    fn write(&self, path: &str, contents: &str) {
        let path = self.root().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.public(path))
            .unwrap_or_else(|e| panic!("missing output {path}: {e}"))
    }
}

#[test]
fn render_discovery_fans_out_one_page_per_value() {
    let fixture = Fixture::new(&[
        ("content/tags/[tag].md", "{{ add_param(\"go\") }}{{ add_param(\"rust\") }}Tag: {{ param }}\n"),
    ]);

    let site = fixture.site();
    let report = site.rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    assert!(fixture.read("tags/go/index.html").contains("Tag: go"));
    assert!(fixture.read("tags/rust/index.html").contains("Tag: rust"));
    assert!(!fixture.public("tags/[tag]").exists());

    let source = site.registry().get(fixture.content("tags/[tag].md")).unwrap();
    assert_eq!(source.param_values().unwrap(), ["go", "rust"]);

    let target = site.registry().get(fixture.public("tags/go/index.html")).unwrap();
    assert_eq!(target.state(), State::Loaded);
    assert_eq!(target.param_name().as_deref(), Some("go"));
    assert!(Arc::ptr_eq(&target.source().unwrap(), &source));

    let sitemap = fixture.read("sitemap.xml");
    assert!(sitemap.contains("<loc>/tags/go/</loc>"));
}

#[test]
fn no_discovered_values_means_no_pages() {
    let fixture = Fixture::new(&[("content/tags/[tag].md", "Nothing here yet.\n")]);
    let site = fixture.site();
    let report = site.rebuild(None).unwrap();

    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(!fixture.public("tags").exists());
    let source = site.registry().get(fixture.content("tags/[tag].md")).unwrap();
    assert_eq!(source.param_values().unwrap(), Vec::<String>::new());
}

#[test]
fn taxonomy_and_static_params() {
    let fixture = Fixture::new(&[
        ("content/a.md", "+++\ntags = [\"Go\", \"web\"]\n+++\nA"),
        ("content/b.md", "+++\ntags = [\"go\", \"cli\"]\n+++\nB"),
        ("content/tags/[tag].md", "+++\ntaxonomy = \"tags\"\n+++\n{{ pages({\"tag\": param}) | length }} pages"),
        ("content/langs/[lang].md", "---\nparams: [en, fr]\n---\n{{ param }}"),
    ]);

    let report = fixture.site().rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    assert!(fixture.read("tags/go/index.html").contains("2 pages"));
    assert!(fixture.read("tags/web/index.html").contains("1 pages"));
    assert!(fixture.read("tags/cli/index.html").contains("1 pages"));
    assert!(fixture.public("langs/en/index.html").exists());
    assert!(fixture.public("langs/fr/index.html").exists());
}

#[test]
fn drafts_are_built_but_not_listed() {
    let fixture = Fixture::new(&[
        ("content/index.md", "{% for p in pages() %}{{ p.title }};{% endfor %}"),
        ("content/blog/post.md", "+++\ntitle = \"Draft\"\ndraft = true\n+++\nHello"),
        ("content/blog/other.md", "+++\ntitle = \"Other\"\n+++\nWorld"),
    ]);

    let site = fixture.site();
    let report = site.rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    let index = fixture.read("index.html");
    assert!(index.contains("Other;"));
    assert!(!index.contains("Draft"));
    assert!(fixture.read("blog/post/index.html").contains("Hello"));

    let titles = |query: &Query| site.pages(query).into_iter()
        .filter_map(|p| p.title)
        .collect::<Vec<_>>();

    assert_eq!(titles(&Query::default()), ["Other"]);
    let all = Query { include_drafts: true, ..Query::default() };
    assert_eq!(titles(&all), ["Other", "Draft"]);
}

#[test]
fn assets_sit_beside_their_page() {
    let fixture = Fixture::new(&[
        ("content/blog/post.md", "![diagram]({{ asset_url(\"diagram.png\") }})"),
        ("content/blog/diagram.png", "not really a png"),
    ]);

    let report = fixture.site().rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    assert!(fixture.read("blog/post/index.html").contains("src=\"./diagram.png\""));
    assert_eq!(fixture.read("blog/post/diagram.png"), "not really a png");
    assert!(!fixture.public("blog/diagram.png").exists());
}

#[test]
fn parametric_assets_are_shared_by_hash() {
    let fixture = Fixture::new(&[
        ("content/tags/[tag].md", "+++\nparams = [\"a\", \"b\"]\n+++\n{{ asset_url(\"logo.png\") }}"),
        ("content/tags/logo.png", "logo"),
    ]);

    let site = fixture.site();
    let report = site.rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    let logo = site.registry().get(fixture.content("tags/logo.png")).unwrap();
    let hash = weft::assets::short_hash(&logo).unwrap();
    assert_eq!(hash.len(), 8);

    let shared = format!("_assets/{hash}/{hash}.png");
    assert_eq!(fixture.read(&shared), "logo");
    assert!(fixture.read("tags/a/index.html").contains(&format!("/{shared}")));
    assert!(fixture.read("tags/b/index.html").contains(&format!("/{shared}")));
    assert!(!fixture.public("tags/logo.png").exists());
}

/// Every file below `dir`, relative to it.
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = vec![];
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        for entry in std::fs::read_dir(&next).unwrap() {
            let path = entry.unwrap().path();
            match path.is_dir() {
                true => pending.push(path),
                false => files.push(path.strip_prefix(dir).unwrap().to_path_buf()),
            }
        }
    }

    files.sort();
    files
}

#[test]
fn identical_assets_are_copied_once() {
    let fixture = Fixture::new(&[
        ("content/tags/[tag].md", "+++\nparams = [\"a\", \"b\"]\n+++\n{{ asset_url(\"a.png\") }};{{ asset_url(\"b.png\") }}"),
        ("content/tags/a.png", "same bytes"),
        ("content/tags/b.png", "same bytes"),
    ]);

    let site = fixture.site();
    let report = site.rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    let copies = files_under(&fixture.public("_assets"));
    assert_eq!(copies.len(), 1, "{copies:?}");
    let url = format!("/_assets/{}", copies[0].display());
    assert!(fixture.read("tags/a/index.html").contains(&format!("{url};{url}")));

    let a = site.registry().get(fixture.content("tags/a.png")).unwrap();
    let b = site.registry().get(fixture.content("tags/b.png")).unwrap();
    let graph = site.graph();
    assert_eq!(graph.targets_of(a.path()), graph.targets_of(b.path()));
}

#[test]
fn edited_assets_replace_their_shared_copy() {
    let fixture = Fixture::new(&[
        ("content/tags/[tag].md", "+++\nparams = [\"a\", \"b\"]\n+++\n{{ asset_url(\"logo.png\") }}"),
        ("content/tags/logo.png", "v1"),
    ]);

    let site = fixture.site();
    site.rebuild(None).unwrap();
    let logo = fixture.content("tags/logo.png");
    assert_eq!(files_under(&fixture.public("_assets")).len(), 1);

    fixture.write("content/tags/logo.png", "v2");
    let report = site.rebuild(Some(&[logo.clone()][..])).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    let copies = files_under(&fixture.public("_assets"));
    assert_eq!(copies.len(), 1, "{copies:?}");
    assert_eq!(fixture.read(&format!("_assets/{}", copies[0].display())), "v2");
    assert!(fixture.read("tags/b/index.html").contains(&format!("/_assets/{}", copies[0].display())));
    assert_eq!(site.graph().targets_of(&logo).len(), 1);
}

#[test]
fn shared_copies_survive_while_still_used() {
    let fixture = Fixture::new(&[
        ("content/tags/[tag].md", "+++\nparams = [\"a\"]\n+++\n{{ param }}"),
        ("content/tags/a.png", "same bytes"),
        ("content/tags/b.png", "same bytes"),
    ]);

    let site = fixture.site();
    site.rebuild(None).unwrap();
    let shared = files_under(&fixture.public("_assets"));
    assert_eq!(shared.len(), 1);

    fixture.write("content/tags/a.png", "new bytes");
    site.rebuild(Some(&[fixture.content("tags/a.png")][..])).unwrap();

    let copies = files_under(&fixture.public("_assets"));
    assert_eq!(copies.len(), 2, "{copies:?}");
    assert!(copies.contains(&shared[0]));
}

#[test]
fn assets_added_later_sit_beside_their_page() {
    let fixture = Fixture::new(&[("content/blog/post.md", "Post")]);
    let site = fixture.site();
    site.rebuild(None).unwrap();

    fixture.write("content/blog/diagram.png", "png");
    let diagram = fixture.content("blog/diagram.png");
    let report = site.rebuild(Some(&[diagram.clone()][..])).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    assert_eq!(fixture.read("blog/post/diagram.png"), "png");
    assert!(!fixture.public("blog/diagram.png").exists());

    let post = site.registry().get(fixture.content("blog/post.md")).unwrap();
    let owner = site.registry().get(&diagram).unwrap().asset_of().unwrap();
    assert!(Arc::ptr_eq(&owner, &post));
}

#[test]
fn unclaimed_files_are_copied() {
    let fixture = Fixture::new(&[
        ("content/robots.txt", "User-agent: *"),
        ("content/data/list.csv", "a,b"),
    ]);

    let report = fixture.site().rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);
    assert_eq!(fixture.read("robots.txt"), "User-agent: *");
    assert_eq!(fixture.read("data/list.csv"), "a,b");
}

#[test]
#[cfg(feature = "sass")]
fn stylesheets_compile_and_partials_are_consumed() {
    let fixture = Fixture::new(&[
        ("content/css/site.scss", "$c: red;\nbody { color: $c; }"),
        ("content/css/_vars.scss", "$unused: 1;"),
    ]);

    let report = fixture.site().rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(fixture.read("css/site.css").contains("color: red"));
    assert!(!fixture.public("css/_vars.scss").exists());
    assert!(!fixture.public("css/site.scss").exists());
}

#[test]
fn failed_renders_leave_a_placeholder() {
    let fixture = Fixture::new(&[
        ("content/broken.md", "{{ oops( }}"),
        ("content/fine.md", "Fine"),
    ]);

    let report = fixture.site().rebuild(None).unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Parse);
    assert_eq!(report.errors[0].path.as_deref(), Some(fixture.content("broken.md").as_path()));

    assert!(fixture.read("broken/index.html").starts_with("template error: "));
    assert!(fixture.read("fine/index.html").contains("Fine"));
}

#[test]
fn bad_front_matter_fails_only_that_page() {
    let fixture = Fixture::new(&[
        ("content/bad.md", "+++\ndraft = \"maybe\"\n+++\nBody"),
        ("content/good.md", "Good"),
    ]);

    let site = fixture.site();
    let report = site.rebuild(None).unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Parse);

    let bad = site.registry().get(fixture.content("bad.md")).unwrap();
    assert_eq!(bad.state(), State::Failed);
    assert!(bad.error().is_some());
    assert!(!fixture.public("bad/index.html").exists());
    assert!(fixture.public("good/index.html").exists());
}

#[test]
#[should_panic(expected = "strict mode")]
fn strict_builds_panic_on_errors() {
    let fixture = Fixture::new(&[("content/broken.md", "{% if %}")]);
    let config = Config { strict: true, ..fixture.config() };
    let _ = Site::new(config).unwrap().rebuild(None);
}

#[test]
fn missing_content_directory_aborts() {
    let fixture = Fixture::new(&[]);
    let error = fixture.site().rebuild(None).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Walk);
}

#[test]
fn lookup_survives_rebuilds() {
    let fixture = Fixture::new(&[("content/page.md", "Page")]);
    let site = fixture.site();
    site.rebuild(None).unwrap();

    let before = site.registry().get_or_create(fixture.content("page.md"));
    site.rebuild(None).unwrap();
    let after = site.registry().get_or_create(fixture.content("./page.md"));
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn incremental_rebuilds_prune_removed_sources() {
    let fixture = Fixture::new(&[
        ("content/index.md", "{% for p in pages() %}{{ p.path }};{% endfor %}"),
        ("content/blog/post.md", "Post"),
        ("content/blog/keep.md", "Keep"),
    ]);

    let site = fixture.site();
    site.rebuild(None).unwrap();
    assert!(fixture.read("index.html").contains("blog/post.md;"));

    let post = fixture.content("blog/post.md");
    std::fs::remove_file(&post).unwrap();
    let report = site.rebuild(Some(&[post.clone()][..])).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);

    assert!(!fixture.public("blog/post/index.html").exists());
    assert_eq!(site.registry().get(&post).unwrap().state(), State::Deleted);
    assert!(!fixture.read("index.html").contains("blog/post.md;"));

    fixture.write("content/blog/keep.md", "Kept, edited");
    site.rebuild(Some(&[fixture.content("blog/keep.md")][..])).unwrap();
    assert!(fixture.read("blog/keep/index.html").contains("Kept, edited"));
}

#[test]
fn dropped_parameter_values_are_pruned() {
    let fixture = Fixture::new(&[("content/tags/[tag].md", "+++\nparams = [\"a\", \"b\"]\n+++\n{{ param }}")]);
    let site = fixture.site();
    site.rebuild(None).unwrap();
    assert!(fixture.public("tags/b/index.html").exists());

    fixture.write("content/tags/[tag].md", "+++\nparams = [\"a\"]\n+++\n{{ param }}");
    site.rebuild(None).unwrap();
    assert!(fixture.public("tags/a/index.html").exists());
    assert!(!fixture.public("tags/b/index.html").exists());
    assert!(!fixture.public("tags/b").exists());
}

/// Upper-cases `.txt` files, counting how often it runs.
struct Shout {
    runs: Arc<AtomicUsize>,
}

impl Rule for Shout {
    fn name(&self) -> &str {
        "shout"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            produces: vec!["*.txt".into()],
            ..Capabilities::in_phase(Phase::Transform)
        }
    }

    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> weft::Result<Option<Claim>> {
        if resource.extension() != Some("txt") {
            return Ok(None);
        }

        let dest = weft::layout::output_path(site.config(), resource);
        Ok(Some(Claim::to(vec![site.registry().get_or_create(dest)])))
    }

    fn run(&self, _: &Site, inputs: &[Arc<Resource>], targets: &[Arc<Resource>], _: &Functions) -> weft::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read_to_string(inputs[0].path())?;
        for target in targets {
            std::fs::create_dir_all(target.path().parent().unwrap())?;
            std::fs::write(target.path(), text.to_uppercase())?;
        }

        Ok(())
    }
}

#[test]
fn each_resource_runs_through_one_rule() {
    let fixture = Fixture::new(&[
        ("content/a.txt", "quiet"),
        ("content/b.txt", "calm"),
        ("content/c.dat", "data"),
    ]);

    let runs = Arc::new(AtomicUsize::new(0));
    let phases = Arc::new(Mutex::new(vec![]));
    let processed = Arc::new(Mutex::new(vec![]));

    let mut site = Site::empty(fixture.config()).unwrap();
    site.add_rule(Shout { runs: runs.clone() });
    for phase in Phase::ALL {
        let (starts, ends) = (phases.clone(), phases.clone());
        site.on_phase_start(phase, move |_, ctx| starts.lock().unwrap().push(format!("+{}", ctx.phase)));
        site.on_phase_end(phase, move |_, ctx| ends.lock().unwrap().push(format!("-{}", ctx.phase)));
    }

    let seen = processed.clone();
    site.on_resource_processed(move |_, resource, _| {
        seen.lock().unwrap().push(resource.file_name().to_string());
    });

    let report = site.rebuild(None).unwrap();
    assert!(report.is_ok(), "{:?}", report.errors);
    assert_eq!(report.processed, 3);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert_eq!(fixture.read("a.txt"), "QUIET");
    assert_eq!(fixture.read("c.dat"), "data");
    assert_eq!(*processed.lock().unwrap(), ["a.txt", "b.txt", "c.dat"]);
    assert_eq!(*phases.lock().unwrap(), [
        "+discover", "-discover",
        "+transform", "-transform",
        "+generate", "-generate",
        "+finalize", "-finalize",
    ]);
}

#[test]
fn default_rule_replaces_copying() {
    let fixture = Fixture::new(&[("content/a.txt", "quiet")]);
    let runs = Arc::new(AtomicUsize::new(0));
    let mut site = Site::empty(fixture.config()).unwrap();
    site.set_default_rule(Shout { runs: runs.clone() });

    site.rebuild(None).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.read("a.txt"), "QUIET");

    let mut site = Site::empty(fixture.config()).unwrap();
    site.set_default_rule(CopyRule);
    site.rebuild(None).unwrap();
    assert_eq!(fixture.read("a.txt"), "quiet");
}

/// Claims `a.pair` and `b.pair`, each producing the other.
struct Swap;

impl Rule for Swap {
    fn name(&self) -> &str {
        "swap"
    }

    fn targets_for(&self, site: &Site, resource: &Arc<Resource>) -> weft::Result<Option<Claim>> {
        let other = match resource.file_name() {
            "a.pair" => "b.pair",
            "b.pair" => "a.pair",
            _ => return Ok(None),
        };

        let target = site.registry().get_or_create(resource.path().with_file_name(other));
        Ok(Some(Claim::to(vec![target])))
    }

    fn run(&self, _: &Site, _: &[Arc<Resource>], _: &[Arc<Resource>], _: &Functions) -> weft::Result<()> {
        Ok(())
    }
}

#[test]
fn cyclic_edges_are_rejected_and_reported() {
    let fixture = Fixture::new(&[("content/a.pair", ""), ("content/b.pair", "")]);
    let mut site = Site::empty(fixture.config()).unwrap();
    site.add_rule(Swap);

    let report = site.rebuild(None).unwrap();
    let kinds: Vec<_> = report.errors.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [ErrorKind::Cycle]);

    let graph = site.graph();
    let (a, b) = (fixture.content("a.pair"), fixture.content("b.pair"));
    assert!(graph.path_exists(&a, &b));
    assert!(!graph.path_exists(&b, &a));
}
