//! Application configuration for Paperboy.
//!
//! User config lives at `~/.paperboy/paperboy.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PaperboyError, Result};
use crate::types::DEFAULT_GROUP;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "paperboy.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".paperboy";

// ---------------------------------------------------------------------------
// Config structs (matching paperboy.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where article links and the cover image come from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Text-extraction service settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Outbound request policies.
    #[serde(default)]
    pub fetch: FetchPolicyConfig,

    /// E-book output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Front page listing the day's articles.
    #[serde(default = "default_front_page_url")]
    pub front_page_url: String,

    /// Hosts article links may point to. Empty allows any host.
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,

    /// Selector for topic containers. Unset means a single default group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_selector: Option<String>,

    /// Selector for the topic name inside a topic container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title_selector: Option<String>,

    /// Selector for article links (the element or its first `a[href]` child).
    #[serde(default = "default_link_selector")]
    pub link_selector: String,

    /// Group name used when links are not grouped by topic.
    #[serde(default = "default_group_name")]
    pub default_group: String,

    /// Page showing the printed edition's cover. Empty disables the cover.
    #[serde(
        default = "default_cover_page",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_page_url: Option<String>,

    /// Selector for the cover image (the element or its first `[src]` child).
    #[serde(default = "default_cover_selector")]
    pub cover_selector: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            front_page_url: default_front_page_url(),
            allowed_domains: default_allowed_domains(),
            section_selector: None,
            section_title_selector: None,
            link_selector: default_link_selector(),
            default_group: default_group_name(),
            cover_page_url: default_cover_page(),
            cover_selector: default_cover_selector(),
        }
    }
}

fn default_front_page_url() -> String {
    "https://www1.folha.uol.com.br/fsp".into()
}
fn default_allowed_domains() -> Vec<String> {
    vec!["www1.folha.uol.com.br".into()]
}
fn default_link_selector() -> String {
    ".c-channel__headline".into()
}
fn default_group_name() -> String {
    DEFAULT_GROUP.into()
}
fn default_cover_page() -> Option<String> {
    Some("https://acervo.folha.uol.com.br/digital/".into())
}

/// `cover_page_url = ""` turns the cover off; TOML has no null.
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
fn default_cover_selector() -> String {
    ".edition".into()
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Endpoint that turns an article URL into readable JSON.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Static query parameters sent alongside `url`.
    #[serde(default = "default_extra_query")]
    pub extra_query: BTreeMap<String, String>,

    /// `Accept-Language` header value.
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            extra_query: default_extra_query(),
            accept_language: default_accept_language(),
        }
    }
}

fn default_endpoint() -> String {
    "https://pushtokindle.fivefilters.org/send.php".into()
}
fn default_extra_query() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("context".to_string(), "iframe".to_string()),
        ("links".to_string(), "1".to_string()),
    ])
}
fn default_accept_language() -> String {
    "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPolicyConfig {
    /// Maximum concurrent outbound requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum ms between two request starts.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Upper bound for any single fetch or download.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchPolicyConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    50
}
fn default_timeout_secs() -> u64 {
    30
}

/// Which image in an article body represents it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImagePolicy {
    /// First `img[src]` that is a direct child of a paragraph.
    #[default]
    FirstInParagraph,
    /// First `img[src]` anywhere in the body.
    FirstAnywhere,
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the `.epub` is written to.
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Scratch directory for downloaded images.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// Book title prefix; the run date is appended.
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,

    /// Book author metadata.
    #[serde(default = "default_author")]
    pub author: String,

    /// BCP 47 language tag for the book.
    #[serde(default = "default_language")]
    pub language: String,

    /// Ask image hosts for medium-resolution variants.
    #[serde(default)]
    pub downscale_images: bool,

    /// Image selection rule.
    #[serde(default)]
    pub image_policy: ImagePolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            image_dir: default_image_dir(),
            title_prefix: default_title_prefix(),
            author: default_author(),
            language: default_language(),
            downscale_images: false,
            image_policy: ImagePolicy::default(),
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}
fn default_image_dir() -> String {
    "img".into()
}
fn default_title_prefix() -> String {
    "Folha de SP".into()
}
fn default_author() -> String {
    "Folha de São Paulo".into()
}
fn default_language() -> String {
    "pt-BR".into()
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum concurrent outbound requests.
    pub concurrency: u32,
    /// Minimum spacing between request starts.
    pub rate_limit: Duration,
    /// Upper bound for any single request.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.fetch.concurrency.max(1),
            rate_limit: Duration::from_millis(config.fetch.rate_limit_ms),
            timeout: Duration::from_secs(config.fetch.timeout_secs.max(1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.paperboy/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PaperboyError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.paperboy/paperboy.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;
    load_config_or_default(&path)
}

/// Load config from `path`, or defaults when the file is absent.
pub fn load_config_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperboyError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PaperboyError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file to `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| PaperboyError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperboyError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| PaperboyError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}
