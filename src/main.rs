use clap::{Parser, Subcommand};
use nocturne::plugin::Registry;
use nocturne::{config, generate, output, scan};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup.
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "nocturne")]
#[command(about = "Static site generator for Org-flavoured notes")]
#[command(long_about = "\
Static site generator for Org-flavoured notes

Every source file under the content directory becomes one HTML page at the
same relative path. Native plugins listed in nocturne.toml can transform
pages, add markup to <head>, or run as one-shot tools.

Content structure:

  content/
  ├── nocturne.toml            # Site config (optional)
  ├── index.org                # → dist/index.html
  ├── notes/
  │   └── rust.org             # → dist/notes/rust.html
  ├── plugins/
  │   └── libtoc.so            # Native plugin, referenced from [[plugins]]
  └── .drafts/                 # Hidden directories are skipped

Logging goes to stderr and is controlled by NOCTURNE_LOG
(e.g. NOCTURNE_LOG=debug, NOCTURNE_LOG=nocturne::plugin=trace).

Run 'nocturne gen-config' to generate a documented nocturne.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Output directory (overrides [build] output_dir)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build every page of the content directory
    Build,
    /// Render a single source file to stdout
    File {
        /// Source file to render
        path: PathBuf,
    },
    /// Run a tool plugin over the whole build
    Tool {
        /// Plugin name from [[plugins]]
        name: String,
        /// Ask the tool not to write anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate config, sources and plugins without building
    Check,
    /// Print a stock nocturne.toml with all options documented
    GenConfig,
}

/// Everything a build needs, loaded once before any page is touched.
struct Site {
    source: PathBuf,
    config: config::SiteConfig,
    output_dir: PathBuf,
    registry: Registry,
}

impl Site {
    fn load(source: &Path, output: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = config::load_config(source)?;
        let output_dir = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| generate::resolve_output_dir(source, &config));
        let registry = Registry::load_from_config(&config, source)?;
        Ok(Self {
            source: source.to_path_buf(),
            config,
            output_dir,
            registry,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();
    let load = || Site::load(&cli.source, cli.output.as_deref());

    match &cli.command {
        Command::Build => {
            let site = load()?;
            init_thread_pool(&site.config.build);
            println!("==> Building {}", site.source.display());
            let summary =
                generate::build_site(&site.source, &site.output_dir, &site.config, &site.registry)?;
            output::print_build_output(&summary, &site.source);
            if !summary.is_success() {
                return Err(format!("{} page(s) failed to build", summary.failed().count()).into());
            }
        }
        Command::File { path } => {
            let site = load()?;
            let html = generate::render_file(
                path,
                &site.source,
                &site.output_dir,
                &site.config,
                &site.registry,
            )?;
            println!("{html}");
        }
        Command::Tool { name, dry_run } => {
            let site = load()?;
            generate::run_tool(
                name,
                *dry_run,
                &site.source,
                &site.output_dir,
                &site.config,
                &site.registry,
            )?;
            println!(
                "==> Tool {name} finished{}",
                if *dry_run { " (dry run)" } else { "" }
            );
        }
        Command::Check => {
            let site = load()?;
            println!("==> Checking {}", site.source.display());
            let sources = scan::scan(&site.source, &site.config.build, &site.output_dir)?;
            output::print_check_output(
                config_file(&site.source).as_deref(),
                &sources,
                &site.config.build.source_extension,
                &site.registry,
            );
            println!("==> Content is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Structured logs to stderr; stdout stays for user-facing output.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("NOCTURNE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on build config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(build: &config::BuildConfig) {
    let threads = config::effective_threads(build);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn config_file(source: &Path) -> Option<PathBuf> {
    let path = source.join(config::CONFIG_FILE);
    path.is_file().then_some(path)
}
