//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docs2md_core::{ConsolidationEngine, FileSink, ProgressReporter};
use docs2md_crawler::CrawlFrontier;
use docs2md_discovery::{DirectorySource, DiscoverySource, RepositorySource};
use docs2md_shared::{
    AppConfig, ConsolidateConfig, CrawlConfig, RunManifest, RunState, SourceId, WalkConfig,
    init_config, load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

/// Crates whose events the verbosity flags control.
const LOG_TARGETS: &[&str] = &[
    "docs2md",
    "docs2md_core",
    "docs2md_shared",
    "docs2md_discovery",
    "docs2md_crawler",
    "docs2md_markdown",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docs2md: merge a documentation tree into one Markdown file.
#[derive(Parser)]
#[command(
    name = "docs2md",
    version,
    about = "Consolidate a documentation directory, repository, or site into a single Markdown file.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.docs2md/docs2md.toml.
    #[arg(long, global = true, env = "DOCS2MD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Consolidate a local documentation directory.
    Dir {
        /// Directory to walk.
        path: PathBuf,

        /// Document extensions, comma-separated (defaults to md,mdx).
        #[arg(long, value_delimiter = ',')]
        extensions: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Consolidate the docs of a repository (local checkout or git remote).
    Repo {
        /// Local checkout path or clonable remote URL.
        repo: String,

        /// Only walk this subdirectory of the repository.
        #[arg(long)]
        subdir: Option<String>,

        /// Branch or tag to clone.
        #[arg(long)]
        branch: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Crawl a documentation site.
    Url {
        /// Start URL.
        url: String,

        /// Maximum link depth from the start page.
        #[arg(long)]
        depth: Option<u32>,

        /// Stop after this many pages.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Only crawl URLs matching these glob patterns.
        #[arg(long)]
        include: Vec<String>,

        /// Skip URLs matching these glob patterns.
        #[arg(long)]
        exclude: Vec<String>,

        /// Only follow links under these path prefixes.
        #[arg(long)]
        follow: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Output options shared by every consolidation command. Unset flags fall
/// back to the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct OutputArgs {
    /// Output Markdown file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker pool size.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Heading level of top-level document titles (1-6).
    #[arg(long)]
    pub base_level: Option<u8>,

    /// Assets directory, relative to the output file.
    #[arg(long)]
    pub assets_dir: Option<String>,

    /// ToC heading text.
    #[arg(long)]
    pub toc_title: Option<String>,

    /// List inner headings in the ToC.
    #[arg(long)]
    pub toc_sections: bool,

    /// Add a "Source:" line under each document title.
    #[arg(long)]
    pub attribution: bool,

    /// Treat unresolved references and missing assets as failures.
    #[arg(long)]
    pub validate: bool,

    /// Do not write the run manifest.
    #[arg(long)]
    pub no_manifest: bool,
}

impl OutputArgs {
    fn apply(&self, mut config: ConsolidateConfig) -> ConsolidateConfig {
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(level) = self.base_level {
            config.base_heading_level = level;
        }
        if let Some(dir) = &self.assets_dir {
            config.assets_dir = dir.clone();
        }
        if let Some(title) = &self.toc_title {
            let title = title.trim();
            config.toc_title = (!title.is_empty()).then(|| title.to_string());
        }
        config.toc_include_sections |= self.toc_sections;
        config.source_attribution |= self.attribution;
        config.validate_references |= self.validate;
        if self.no_manifest {
            config.write_manifest = false;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let app_config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Dir {
            path,
            extensions,
            output,
        } => cmd_dir(&app_config, &path, &extensions, &output).await,
        Command::Repo {
            repo,
            subdir,
            branch,
            output,
        } => {
            cmd_repo(&app_config, &repo, subdir.as_deref(), branch.as_deref(), &output).await
        }
        Command::Url {
            url,
            depth,
            max_pages,
            include,
            exclude,
            follow,
            output,
        } => {
            let mut crawl = CrawlConfig::from(&app_config);
            if let Some(depth) = depth {
                crawl.depth = depth;
            }
            if let Some(max) = max_pages {
                crawl.max_pages = max;
            }
            crawl.include_patterns.extend(include);
            crawl.exclude_patterns.extend(exclude);
            crawl.follow_paths.extend(follow);
            cmd_url(&app_config, &url, crawl, &output).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&app_config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_dir(
    app_config: &AppConfig,
    path: &Path,
    extensions: &[String],
    args: &OutputArgs,
) -> Result<()> {
    if !path.is_dir() {
        return Err(eyre!("'{}' is not a directory", path.display()));
    }
    let mut walk = WalkConfig::from(app_config);
    if !extensions.is_empty() {
        walk.extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
    }

    info!(path = %path.display(), "consolidating directory");
    let source = DirectorySource::new(path, walk);
    consolidate(app_config, source, args).await
}

async fn cmd_repo(
    app_config: &AppConfig,
    repo: &str,
    subdir: Option<&str>,
    branch: Option<&str>,
    args: &OutputArgs,
) -> Result<()> {
    let walk = WalkConfig::from(app_config);
    let local = Path::new(repo);

    let source = if local.is_dir() {
        if branch.is_some() {
            warn!("--branch is ignored for a local checkout");
        }
        RepositorySource::local(local, subdir, walk)?
    } else {
        let spinner = spinner(format!("Cloning {repo}"));
        let cloned = RepositorySource::clone_remote(repo, branch, subdir, walk).await;
        spinner.finish_and_clear();
        cloned?
    };

    info!(repo, subdir, "consolidating repository");
    consolidate(app_config, source, args).await
}

async fn cmd_url(
    app_config: &AppConfig,
    url: &str,
    crawl: CrawlConfig,
    args: &OutputArgs,
) -> Result<()> {
    let start = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    info!(url = %start, depth = crawl.depth, "crawling site");
    let source = CrawlFrontier::new(start, crawl)?;
    consolidate(app_config, source, args).await
}

/// Run the engine over `source`, with Ctrl-C cancelling the run.
async fn consolidate<S: DiscoverySource>(
    app_config: &AppConfig,
    source: S,
    args: &OutputArgs,
) -> Result<()> {
    let config = args.apply(ConsolidateConfig::from(app_config));
    let output = config.output.clone();
    let manifest_path = config.write_manifest.then(|| config.manifest_path());
    let engine = ConsolidationEngine::new(config)?;

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            token.cancel();
        }
    });

    let start = Instant::now();
    let reporter = CliProgress::new();
    let mut sink = FileSink::new(&output);
    let result = engine.run(source, &mut sink, &reporter).await;
    reporter.spinner.finish_and_clear();
    let manifest = result?;

    print_summary(&manifest, manifest_path.as_deref(), start.elapsed());

    if manifest.state == RunState::Failed {
        return Err(eyre!(
            "no document could be consolidated ({} discovered, {} failed)",
            manifest.discovered,
            manifest.failed
        ));
    }
    Ok(())
}

fn print_summary(manifest: &RunManifest, manifest_path: Option<&Path>, elapsed: Duration) {
    println!();
    match manifest.state {
        RunState::Done => println!("  Consolidation complete."),
        RunState::PartiallyFailed => println!("  Consolidation finished with failures."),
        _ => println!("  Consolidation failed."),
    }
    println!("  Discovered: {}", manifest.discovered);
    println!("  Merged:     {}", manifest.succeeded);
    println!("  Failed:     {}", manifest.failed);
    println!("  Warnings:   {}", manifest.warnings.len());
    println!("  Unresolved: {}", manifest.unresolved.len());
    println!(
        "  Assets:     {} ({} not copied)",
        manifest.assets.len(),
        manifest.assets.iter().filter(|a| !a.copied).count()
    );
    if let Some(output) = &manifest.output {
        println!("  Output:     {}", output.display());
    }
    if let Some(path) = manifest_path {
        println!("  Manifest:   {}", path.display());
    }
    println!("  Time:       {:.1}s", elapsed.as_secs_f64());

    for failure in manifest.failures.iter().take(10) {
        println!("    ✗ {}: {}", failure.source, failure.reason);
    }
    if manifest.failures.len() > 10 {
        println!("    … and {} more (see manifest)", manifest.failures.len() - 10);
    }
    println!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting".to_string()),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: RunState) {
        let label = match state {
            RunState::Discovering => "Discovering documents",
            RunState::Normalizing => "Normalizing documents",
            RunState::Resolving => "Copying assets",
            RunState::Ordering => "Building table of contents",
            RunState::Rendering => "Writing output",
            _ => return,
        };
        self.spinner.set_message(label);
    }

    fn document_discovered(&self, source: &SourceId, discovered: usize) {
        self.spinner
            .set_message(format!("Discovering [{discovered}] {source}"));
    }

    fn document_normalized(&self, source: &SourceId, done: usize, discovered: usize) {
        self.spinner
            .set_message(format!("Normalizing [{done}/{discovered}] {source}"));
    }

    fn document_failed(&self, source: &str, reason: &str) {
        self.spinner
            .suspend(|| eprintln!("  ✗ {source}: {reason}"));
    }

    fn done(&self, _manifest: &RunManifest) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_dir_command() {
        let cli = Cli::try_parse_from([
            "docs2md", "dir", "./docs", "-o", "out.md", "-j", "8", "--toc-sections",
        ])
        .unwrap();
        match cli.command {
            Command::Dir { path, output, .. } => {
                assert_eq!(path, PathBuf::from("./docs"));
                assert_eq!(output.output, Some(PathBuf::from("out.md")));
                assert_eq!(output.concurrency, Some(8));
                assert!(output.toc_sections);
            }
            _ => panic!("expected dir command"),
        }
    }

    #[test]
    fn cli_parses_url_command() {
        let cli = Cli::try_parse_from([
            "docs2md", "url", "https://docs.example.com", "--depth", "2", "--follow", "/guide",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Url { depth: Some(2), .. }));
    }

    #[test]
    fn flags_override_config() {
        let args = OutputArgs {
            output: Some("site.md".into()),
            base_level: Some(2),
            toc_title: Some("  ".into()),
            attribution: true,
            no_manifest: true,
            ..OutputArgs::default()
        };
        let config = args.apply(ConsolidateConfig::from(&AppConfig::default()));
        assert_eq!(config.output, PathBuf::from("site.md"));
        assert_eq!(config.base_heading_level, 2);
        assert_eq!(config.toc_title, None);
        assert!(config.source_attribution);
        assert!(!config.write_manifest);
    }

    #[test]
    fn unset_flags_keep_config_values() {
        let base = ConsolidateConfig::from(&AppConfig::default());
        let config = OutputArgs::default().apply(base.clone());
        assert_eq!(config.output, base.output);
        assert_eq!(config.concurrency, base.concurrency);
        assert_eq!(config.toc_title, base.toc_title);
    }
}
