//! Page builds: parse → enrich → export, one page or a whole content tree.
//!
//! ## Build phases
//!
//! 1. Scan the content root for sources.
//! 2. Ask the frozen plugin [`Registry`] for this build's page transforms and
//!    head fragments. Any plugin failure here aborts the build before a
//!    single page is touched.
//! 3. Build every page in parallel with [rayon](https://docs.rs/rayon). Each
//!    page is independent: a failing page is reported against its location
//!    and its siblings still build.
//!
//! ## Output Structure
//!
//! ```text
//! dist/
//! ├── index.html               # from index.org
//! └── notes/
//!     └── rust.html            # from notes/rust.org
//! ```

use crate::config::{ConfigError, SiteConfig};
use crate::enrich::{EnrichError, Pipeline};
use crate::export::Exporter;
use crate::naming::{location_for, output_path};
use crate::parse;
use crate::plugin::{BuildContext, PluginError, Registry};
use crate::scan::{self, ScanError, SourceFile};
use crate::types::Location;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Failure of one page. Never affects other pages of the build.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("{location}: {source}")]
    Io {
        location: Location,
        #[source]
        source: std::io::Error,
    },
    #[error("{location}: {source}")]
    Transform {
        location: Location,
        #[source]
        source: EnrichError,
    },
}

impl PageError {
    pub fn location(&self) -> &Location {
        match self {
            Self::Io { location, .. } | Self::Transform { location, .. } => location,
        }
    }
}

/// A page that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub location: Location,
    pub source: PathBuf,
    pub output: PathBuf,
    pub bytes: usize,
}

/// Outcome of a directory build: one result per source, in location order.
#[derive(Debug)]
pub struct BuildSummary {
    pub output_dir: PathBuf,
    pub pages: Vec<Result<PageReport, PageError>>,
    pub plugins: Vec<String>,
}

impl BuildSummary {
    pub fn built(&self) -> impl Iterator<Item = &PageReport> {
        self.pages.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|r| r.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// The output directory for a content root: `[build] output_dir`, relative
/// to `root` unless absolute.
pub fn resolve_output_dir(root: &Path, config: &SiteConfig) -> PathBuf {
    let dir = Path::new(&config.build.output_dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}

/// Scan the sources and build the read-only context handed to plugins.
pub fn build_context(
    source_dir: &Path,
    output_dir: &Path,
    config: &SiteConfig,
) -> Result<(BuildContext, Vec<SourceFile>), ScanError> {
    let sources = scan::scan(source_dir, &config.build, output_dir)?;
    let ctx = BuildContext::new(config, source_dir.to_path_buf(), output_dir.to_path_buf())
        .with_pages(sources.iter().map(|s| s.location.clone()).collect());
    Ok((ctx, sources))
}

/// Parse, enrich and export one page held in memory.
pub fn render_page(
    location: Location,
    source: &str,
    pipeline: &Pipeline<'_>,
    exporter: &Exporter<'_>,
) -> Result<String, EnrichError> {
    let mut page = parse::parse(location, source);
    pipeline.run(&mut page)?;
    Ok(exporter.export(page))
}

/// Build one source file into `output_dir`.
#[instrument(level = "debug", skip_all, fields(location = %source.location))]
pub fn build_page(
    source: &SourceFile,
    output_dir: &Path,
    pipeline: &Pipeline<'_>,
    exporter: &Exporter<'_>,
) -> Result<PageReport, PageError> {
    let location = &source.location;
    let io = |e: std::io::Error| PageError::Io {
        location: location.clone(),
        source: e,
    };

    let text = fs::read_to_string(&source.path).map_err(io)?;
    let html = render_page(location.clone(), &text, pipeline, exporter).map_err(|e| {
        PageError::Transform {
            location: location.clone(),
            source: e,
        }
    })?;

    let output = output_path(location, output_dir);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(&output, &html).map_err(io)?;
    debug!(output = %output.display(), bytes = html.len(), "page written");
    Ok(PageReport {
        location: location.clone(),
        source: source.path.clone(),
        output,
        bytes: html.len(),
    })
}

/// Build every page under `source_dir` into `output_dir`.
///
/// Returns `Err` only for build-wide failures (scan, plugins, output
/// directory). Per-page failures are collected in the summary.
#[instrument(skip(config, registry), fields(source = %source_dir.display()))]
pub fn build_site(
    source_dir: &Path,
    output_dir: &Path,
    config: &SiteConfig,
    registry: &Registry,
) -> Result<BuildSummary, GenerateError> {
    let (ctx, sources) = build_context(source_dir, output_dir, config)?;
    fs::create_dir_all(output_dir)?;

    let transforms = registry.content_transforms(&ctx)?;
    let inserts = registry.head_inserts(&ctx)?;
    let pipeline = Pipeline::with_plugins(config, transforms);
    let exporter = Exporter::new(config, &inserts);
    info!(
        pages = sources.len(),
        transforms = pipeline.len(),
        head_fragments = inserts.len(),
        "building site"
    );

    let pages: Vec<_> = sources
        .par_iter()
        .map(|source| build_page(source, output_dir, &pipeline, &exporter))
        .collect();

    let summary = BuildSummary {
        output_dir: output_dir.to_path_buf(),
        pages,
        plugins: registry.providers().iter().map(|p| p.name().to_string()).collect(),
    };
    for err in summary.failed() {
        warn!(location = %err.location(), error = %err, "page failed");
    }
    info!(
        built = summary.built().count(),
        failed = summary.failed().count(),
        "build finished"
    );
    Ok(summary)
}

/// Render a single source file to a string, without writing anything.
///
/// The location is taken relative to `source_dir`; plugins see `output_dir`
/// as the build's output directory.
pub fn render_file(
    path: &Path,
    source_dir: &Path,
    output_dir: &Path,
    config: &SiteConfig,
    registry: &Registry,
) -> Result<String, GenerateError> {
    let location = location_for(path, source_dir);
    let ctx = BuildContext::new(config, source_dir.to_path_buf(), output_dir.to_path_buf())
        .with_pages(vec![location.clone()]);
    let transforms = registry.content_transforms(&ctx)?;
    let inserts = registry.head_inserts(&ctx)?;
    let pipeline = Pipeline::with_plugins(config, transforms);
    let exporter = Exporter::new(config, &inserts);

    let text = fs::read_to_string(path).map_err(|source| PageError::Io {
        location: location.clone(),
        source,
    })?;
    let html = render_page(location.clone(), &text, &pipeline, &exporter)
        .map_err(|source| PageError::Transform { location, source })?;
    Ok(html)
}

/// Run one tool plugin against the whole build.
pub fn run_tool(
    name: &str,
    dry_run: bool,
    source_dir: &Path,
    output_dir: &Path,
    config: &SiteConfig,
    registry: &Registry,
) -> Result<(), GenerateError> {
    let (ctx, _) = build_context(source_dir, output_dir, config)?;
    if !dry_run {
        fs::create_dir_all(output_dir)?;
    }
    registry.run_tool(name, &ctx, dry_run)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::RegistryBuilder;
    use crate::test_helpers::plugins::{
        Greeter, OutputMeta, Picky, Shouter, SiteMeta, content_module, head_module, tool_module,
    };
    use crate::test_helpers::{setup_site, write_file};
    use serde_json::Map;

    fn registry_with(modules: Vec<(&str, Box<dyn crate::plugin::PluginModule>)>) -> Registry {
        let mut builder = RegistryBuilder::new();
        for (name, module) in modules {
            builder.load(module, name, &Map::new()).unwrap();
        }
        builder.finish()
    }

    #[test]
    fn render_page_runs_every_stage() {
        let config = SiteConfig::default();
        let pipeline = Pipeline::builtin(&config);
        let exporter = Exporter::new(&config, &[]);
        let html = render_page(
            Location::new("intro"),
            "* Intro\n\n** First\n\nSome *bold* text.\n",
            &pipeline,
            &exporter,
        )
        .unwrap();
        assert!(html.contains("<title>Intro | Notes</title>"));
        assert!(html.contains("<h2 id=\"first\">First</h2>"));
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn build_site_writes_every_page() {
        let tmp = setup_site();
        let root = tmp.path();
        let config = SiteConfig::default();
        let output = resolve_output_dir(root, &config);
        let summary = build_site(root, &output, &config, &Registry::empty()).unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.built().count(), 2);
        assert!(output.join("index.html").exists());
        let rust = fs::read_to_string(output.join("notes/rust.html")).unwrap();
        // `#+toc: on` in the source.
        assert!(rust.contains("Table of Contents"));
        assert!(rust.contains("<a href=\"#ownership\">Ownership</a>"));
        // Footnote collected and referenced.
        assert!(rust.contains("id=\"fn-1\""));
        // Source block trimmed and tagged.
        assert!(rust.contains("language-plaintext"));
        assert!(rust.contains(">let x = 1;</code>"));
        assert!(rust.contains("<div class=\"writing\">"));
    }

    #[test]
    fn failing_page_does_not_stop_siblings() {
        let tmp = setup_site();
        let root = tmp.path();
        write_file(root, "boom.org", "* boom\n\nexplodes\n");
        let config = SiteConfig::default();
        let output = root.join("dist");
        let registry = registry_with(vec![("picky", content_module::<Picky>("picky"))]);

        let summary = build_site(root, &output, &config, &registry).unwrap();
        let failed: Vec<_> = summary.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].location().as_str(), "boom");
        assert!(matches!(failed[0], PageError::Transform { .. }));
        assert_eq!(summary.built().count(), 2);
        assert!(!output.join("boom.html").exists());
        assert!(output.join("index.html").exists());
    }

    #[test]
    fn plugins_shape_the_output() {
        let tmp = setup_site();
        let root = tmp.path();
        let mut config = SiteConfig::default();
        config.website.title = "Garden".into();
        let output = root.join("dist");
        let registry = registry_with(vec![
            ("shouter", content_module::<Shouter>("shouter")),
            ("meta", head_module::<SiteMeta>("meta")),
        ]);

        let summary = build_site(root, &output, &config, &registry).unwrap();
        assert_eq!(summary.plugins, vec!["shouter", "meta"]);
        let index = fs::read_to_string(output.join("index.html")).unwrap();
        assert!(index.contains("WELCOME TO THE"));
        assert!(index.contains(r#"<meta name="site" content="Garden">"#));
    }

    #[test]
    fn render_file_uses_relative_location() {
        let tmp = setup_site();
        let root = tmp.path();
        let html = render_file(
            &root.join("notes/rust.org"),
            root,
            &root.join("dist"),
            &SiteConfig::default(),
            &Registry::empty(),
        )
        .unwrap();
        assert!(html.contains("<title>Rust | Notes</title>"));
    }

    #[test]
    fn render_file_missing_is_page_error() {
        let tmp = setup_site();
        let err = render_file(
            &tmp.path().join("missing.org"),
            tmp.path(),
            &tmp.path().join("dist"),
            &SiteConfig::default(),
            &Registry::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, GenerateError::Page(PageError::Io { .. })));
    }

    #[test]
    fn render_file_hands_plugins_the_given_output_dir() {
        let tmp = setup_site();
        let root = tmp.path();
        let registry = registry_with(vec![("output", head_module::<OutputMeta>("output"))]);
        let elsewhere = root.join("elsewhere");

        let html = render_file(
            &root.join("index.org"),
            root,
            &elsewhere,
            &SiteConfig::default(),
            &registry,
        )
        .unwrap();

        let expected = format!(r#"<meta name="output" content="{}">"#, elsewhere.display());
        assert!(html.contains(&expected));
        assert!(!html.contains(&root.join("dist").display().to_string()));
    }

    #[test]
    fn run_tool_passes_dry_run() {
        let tmp = setup_site();
        let root = tmp.path();
        let output = root.join("dist");
        let config = SiteConfig::default();
        let registry = registry_with(vec![("greeter", tool_module::<Greeter>("greeter"))]);

        run_tool("greeter", true, root, &output, &config, &registry).unwrap();
        assert!(!output.join("greeting.txt").exists());
        run_tool("greeter", false, root, &output, &config, &registry).unwrap();
        assert!(output.join("greeting.txt").exists());

        let err = run_tool("nope", false, root, &output, &config, &registry).unwrap_err();
        assert!(matches!(err, GenerateError::Plugin(PluginError::UnknownTool(_))));
    }

    #[test]
    fn output_dir_relative_or_absolute() {
        let mut config = SiteConfig::default();
        assert_eq!(
            resolve_output_dir(Path::new("/site"), &config),
            PathBuf::from("/site/dist")
        );
        config.build.output_dir = "/var/www".into();
        assert_eq!(
            resolve_output_dir(Path::new("/site"), &config),
            PathBuf::from("/var/www")
        );
    }
}
