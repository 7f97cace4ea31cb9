//! Application configuration for docs2md.
//!
//! User config lives at `~/.docs2md/docs2md.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Docs2MdError, Result};
use crate::types::MAX_HEADING_LEVEL;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docs2md.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docs2md";

// ---------------------------------------------------------------------------
// Config structs (matching docs2md.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Output rendering options.
    #[serde(default)]
    pub render: RenderConfig,

    /// Crawl policies for URL mode.
    #[serde(default)]
    pub crawl: CrawlPoliciesConfig,

    /// Directory walking options for dir/repo mode.
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Output Markdown file.
    #[serde(default = "default_output")]
    pub output: String,

    /// Worker pool size for normalization and fetching.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Heading level of depth-0 document titles.
    #[serde(default = "default_base_heading_level")]
    pub base_heading_level: u8,

    /// Directory (relative to the output file) that copied assets land in.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            concurrency: default_concurrency(),
            base_heading_level: default_base_heading_level(),
            assets_dir: default_assets_dir(),
        }
    }
}

fn default_output() -> String {
    "docs2md-output/docs.md".into()
}
fn default_concurrency() -> u32 {
    4
}
fn default_base_heading_level() -> u8 {
    1
}
fn default_assets_dir() -> String {
    "assets".into()
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Heading of the table of contents. Empty disables the heading.
    #[serde(default = "default_toc_title")]
    pub toc_title: String,

    /// Include inner section headings in the table of contents.
    #[serde(default)]
    pub toc_include_sections: bool,

    /// Deepest heading level listed when sections are included.
    #[serde(default = "default_toc_max_level")]
    pub toc_max_level: u8,

    /// Emit a `Source: <id>` line under each document title.
    #[serde(default)]
    pub source_attribution: bool,

    /// Write `<output>.manifest.json` next to the output.
    #[serde(default = "default_true")]
    pub write_manifest: bool,

    /// Treat unresolved references as failures.
    #[serde(default)]
    pub validate_references: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            toc_title: default_toc_title(),
            toc_include_sections: false,
            toc_max_level: default_toc_max_level(),
            source_attribution: false,
            write_manifest: true,
            validate_references: false,
        }
    }
}

fn default_toc_title() -> String {
    "Table of Contents".into()
}
fn default_toc_max_level() -> u8 {
    3
}
fn default_true() -> bool {
    true
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlPoliciesConfig {
    /// Maximum link distance from the start URL.
    #[serde(default = "default_crawl_depth")]
    pub depth: u32,

    /// URL include glob patterns.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL exclude glob patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Only follow links whose path starts with one of these prefixes.
    #[serde(default)]
    pub follow_paths: Vec<String>,

    /// Link targets with these extensions are never fetched.
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// Minimum ms between requests.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Upper bound on fetched pages.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for CrawlPoliciesConfig {
    fn default() -> Self {
        Self {
            depth: default_crawl_depth(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            follow_paths: Vec::new(),
            excluded_extensions: default_excluded_extensions(),
            rate_limit_ms: default_rate_limit(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_crawl_depth() -> u32 {
    5
}
fn default_excluded_extensions() -> Vec<String> {
    [".pdf", ".zip", ".exe", ".dmg"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_rate_limit() -> u64 {
    200
}
fn default_max_pages() -> usize {
    500
}

/// `[directory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// File extensions (without dot) treated as documents.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names skipped during the walk.
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// Walk into hidden (dot-prefixed) entries.
    #[serde(default)]
    pub include_hidden: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_dirs: default_ignore_dirs(),
            include_hidden: false,
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["md".into(), "mdx".into()]
}
fn default_ignore_dirs() -> Vec<String> {
    vec!["node_modules".into(), ".git".into()]
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime consolidation configuration.
#[derive(Debug, Clone)]
pub struct ConsolidateConfig {
    /// Output Markdown file.
    pub output: PathBuf,
    /// Assets directory, relative to the output file's directory.
    pub assets_dir: String,
    /// Worker pool size. Always at least 1.
    pub concurrency: usize,
    /// Heading level of depth-0 titles, within `1..=6`.
    pub base_heading_level: u8,
    /// ToC heading; `None` renders the list without a heading.
    pub toc_title: Option<String>,
    pub toc_include_sections: bool,
    pub toc_max_level: u8,
    pub source_attribution: bool,
    pub write_manifest: bool,
    pub validate_references: bool,
}

impl ConsolidateConfig {
    /// Reject option combinations the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Docs2MdError::validation("concurrency must be at least 1"));
        }
        if !(1..=MAX_HEADING_LEVEL).contains(&self.base_heading_level) {
            return Err(Docs2MdError::validation(format!(
                "base heading level must be between 1 and {MAX_HEADING_LEVEL}, got {}",
                self.base_heading_level
            )));
        }
        if self.assets_dir.trim().is_empty() {
            return Err(Docs2MdError::validation("assets directory must not be empty"));
        }
        Ok(())
    }

    /// Path of the manifest written next to the output.
    pub fn manifest_path(&self) -> PathBuf {
        let mut name = self
            .output
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "docs.md".into());
        name.push(".manifest.json");
        self.output.with_file_name(name)
    }

    /// Directory holding the output file.
    pub fn output_dir(&self) -> &Path {
        self.output.parent().unwrap_or_else(|| Path::new(""))
    }
}

impl From<&AppConfig> for ConsolidateConfig {
    fn from(config: &AppConfig) -> Self {
        let toc_title = config.render.toc_title.trim();
        Self {
            output: PathBuf::from(&config.defaults.output),
            assets_dir: config.defaults.assets_dir.clone(),
            concurrency: config.defaults.concurrency.max(1) as usize,
            base_heading_level: config.defaults.base_heading_level,
            toc_title: (!toc_title.is_empty()).then(|| toc_title.to_string()),
            toc_include_sections: config.render.toc_include_sections,
            toc_max_level: config.render.toc_max_level.clamp(1, MAX_HEADING_LEVEL),
            source_attribution: config.render.source_attribution,
            write_manifest: config.render.write_manifest,
            validate_references: config.render.validate_references,
        }
    }
}

/// Runtime crawl configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum crawl depth from the root URL.
    pub depth: u32,
    /// Maximum concurrent HTTP requests.
    pub concurrency: u32,
    /// URL include glob patterns.
    pub include_patterns: Vec<String>,
    /// URL exclude glob patterns.
    pub exclude_patterns: Vec<String>,
    /// Path prefixes links must start with to be followed.
    pub follow_paths: Vec<String>,
    /// Extensions (with dot) never fetched.
    pub excluded_extensions: Vec<String>,
    /// Minimum ms between requests.
    pub rate_limit_ms: u64,
    /// Upper bound on fetched pages.
    pub max_pages: usize,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            depth: config.crawl.depth,
            concurrency: config.defaults.concurrency.max(1),
            include_patterns: config.crawl.include_patterns.clone(),
            exclude_patterns: config.crawl.exclude_patterns.clone(),
            follow_paths: config.crawl.follow_paths.clone(),
            excluded_extensions: config.crawl.excluded_extensions.clone(),
            rate_limit_ms: config.crawl.rate_limit_ms,
            max_pages: config.crawl.max_pages,
        }
    }
}

/// Runtime directory walk configuration.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Lowercased extensions (without dot) treated as documents.
    pub extensions: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub include_hidden: bool,
}

impl From<&AppConfig> for WalkConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            extensions: config
                .directory
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignore_dirs: config.directory.ignore_dirs.clone(),
            include_hidden: config.directory.include_hidden,
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docs2md/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| Docs2MdError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docs2md/docs2md.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Docs2MdError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| Docs2MdError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| Docs2MdError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| Docs2MdError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| Docs2MdError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
