use serde::{Deserialize, Serialize};

/// Main configuration structure for sitebinder
///
/// Every section is optional in the TOML file; missing sections fall back to
/// their defaults so that `sitebinder crawl <url>` works without any config
/// file at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub crawling: CrawlingConfig,

    #[serde(default)]
    pub path_scoping: PathScopingConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub human_behavior: HumanBehaviorConfig,

    #[serde(default)]
    pub pdf: PdfConfig,

    #[serde(default)]
    pub markdown: MarkdownConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,
}

/// Crawl limits and transport behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlingConfig {
    /// Maximum link depth from the seed URL (seed is depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of pages admitted per session
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Base floor for the inter-request delay, in seconds
    #[serde(default = "default_request_delay")]
    pub request_delay: f64,

    /// Whether to honor robots.txt directives
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// User-agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Query keys stripped during URL canonicalization
    #[serde(default = "default_tracking_params")]
    pub tracking_params: Vec<String>,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            request_delay: default_request_delay(),
            respect_robots: true,
            user_agent: default_user_agent(),
            tracking_params: default_tracking_params(),
        }
    }
}

/// Which navigation links may escape the path scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationPolicy {
    None,
    Limited,
    All,
}

/// Path-scoped admission policy relative to the seed URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathScopingConfig {
    /// When false, any same-host URL is in scope
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// When false, URLs on other hosts may be admitted
    #[serde(default = "default_true")]
    pub same_host_only: bool,

    /// Admit up to N ancestors of the seed path
    #[serde(default = "default_parent_levels")]
    pub allow_parent_levels: u32,

    /// Admit the site root `/`
    #[serde(default = "default_true")]
    pub allow_homepage: bool,

    /// Admit paths sharing the seed path's immediate parent
    #[serde(default)]
    pub allow_siblings: bool,

    #[serde(default = "default_navigation_policy")]
    pub allow_navigation: NavigationPolicy,
}

impl Default for PathScopingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            same_host_only: true,
            allow_parent_levels: default_parent_levels(),
            allow_homepage: true,
            allow_siblings: false,
            allow_navigation: default_navigation_policy(),
        }
    }
}

/// Content extraction behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    /// Keep navigation/menu markup in the cleaned HTML
    #[serde(default)]
    pub include_menus: bool,

    /// Download image bodies alongside page records
    #[serde(default)]
    pub include_images: bool,

    /// Replace `<img>` elements with textual placeholders
    #[serde(default)]
    pub remove_images: bool,

    /// Pages with fewer words are flagged low-quality
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    /// Extract description/keywords/author metadata
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            include_menus: false,
            include_images: false,
            remove_images: false,
            min_content_length: default_min_content_length(),
            include_metadata: true,
        }
    }
}

/// Human-like pacing parameters
///
/// All times are in seconds. Two-element arrays are `[min, max]` ranges
/// sampled uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HumanBehaviorConfig {
    #[serde(default = "default_base_reading_time")]
    pub base_reading_time: [f64; 2],

    #[serde(default = "default_navigation_decision")]
    pub navigation_decision: [f64; 2],

    /// Random variance applied to the sampled delay, in percent
    #[serde(default = "default_variance_percent")]
    pub variance_percent: u32,

    /// Inject a long break every N pages; also the fatigue step size
    #[serde(default = "default_session_break_after")]
    pub session_break_after: usize,

    #[serde(default = "default_session_break_duration")]
    pub session_break_duration: [f64; 2],

    /// Fatigue multiplier growth per completed break interval
    #[serde(default = "default_fatigue_factor")]
    pub fatigue_factor: f64,

    /// Delay multiplier applied on weekends
    #[serde(default = "default_weekend_factor")]
    pub weekend_factor: f64,

    /// Multiplier for long or heading-heavy pages
    #[serde(default = "default_complexity_multiplier")]
    pub complexity_multiplier: f64,

    /// Lower clamp on the computed delay
    #[serde(default = "default_minimum_delay")]
    pub minimum_delay: f64,

    /// Upper clamp on the computed delay
    #[serde(default = "default_maximum_delay")]
    pub maximum_delay: f64,

    /// A 429 doubles base delays for this many subsequent pages
    #[serde(default = "default_cooldown_pages")]
    pub cooldown_pages: usize,
}

impl Default for HumanBehaviorConfig {
    fn default() -> Self {
        Self {
            base_reading_time: default_base_reading_time(),
            navigation_decision: default_navigation_decision(),
            variance_percent: default_variance_percent(),
            session_break_after: default_session_break_after(),
            session_break_duration: default_session_break_duration(),
            fatigue_factor: default_fatigue_factor(),
            weekend_factor: default_weekend_factor(),
            complexity_multiplier: default_complexity_multiplier(),
            minimum_delay: default_minimum_delay(),
            maximum_delay: default_maximum_delay(),
            cooldown_pages: default_cooldown_pages(),
        }
    }
}

/// PDF output options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdfConfig {
    #[serde(default)]
    pub output_filename: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: String,

    #[serde(default = "default_orientation")]
    pub orientation: String,

    #[serde(default = "default_true")]
    pub include_toc: bool,

    #[serde(default = "default_true")]
    pub include_page_numbers: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            output_filename: None,
            page_size: default_page_size(),
            orientation: default_orientation(),
            include_toc: true,
            include_page_numbers: true,
        }
    }
}

/// Markdown output options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkdownConfig {
    #[serde(default)]
    pub output_filename: Option<String>,

    /// Write one file per page instead of a single document
    #[serde(default)]
    pub multi_file: bool,

    #[serde(default = "default_true")]
    pub include_toc: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            output_filename: None,
            multi_file: false,
            include_toc: true,
        }
    }
}

/// Session cache options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_directory")]
    pub directory: String,

    /// Gzip page record files (metadata stays plain JSON)
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Gzip level, 1-9
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default)]
    pub auto_cleanup: bool,

    #[serde(default)]
    pub cleanup_settings: CleanupSettings,

    /// Metadata rewrite frequency (every N page commits)
    #[serde(default = "default_save_frequency")]
    pub save_frequency: usize,

    /// Active sessions untouched for this long are considered stale
    #[serde(default = "default_session_timeout_hours")]
    pub session_timeout_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_directory(),
            compression: true,
            compression_level: default_compression_level(),
            max_sessions: default_max_sessions(),
            auto_cleanup: false,
            cleanup_settings: CleanupSettings::default(),
            save_frequency: default_save_frequency(),
            session_timeout_hours: default_session_timeout_hours(),
        }
    }
}

/// Old-session cleanup thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupSettings {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Always keep this many most recent completed sessions
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            keep_completed: default_keep_completed(),
        }
    }
}

/// Output chunking options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Size budget per chunk, e.g. "10MB" or "500KB"
    #[serde(default = "default_max_size")]
    pub default_max_size: String,

    #[serde(default)]
    pub size_estimation: SizeEstimation,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            default_max_size: default_max_size(),
            size_estimation: SizeEstimation::default(),
        }
    }
}

/// Format-specific output size multipliers used by the chunker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeEstimation {
    #[serde(default = "default_markdown_overhead")]
    pub markdown_overhead: f64,

    #[serde(default = "default_pdf_overhead")]
    pub pdf_overhead: f64,
}

impl Default for SizeEstimation {
    fn default() -> Self {
        Self {
            markdown_overhead: default_markdown_overhead(),
            pdf_overhead: default_pdf_overhead(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    3
}

fn default_max_pages() -> usize {
    100
}

fn default_request_delay() -> f64 {
    1.0
}

fn default_user_agent() -> String {
    format!("sitebinder/{}", env!("CARGO_PKG_VERSION"))
}

fn default_tracking_params() -> Vec<String> {
    [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "fbclid",
        "gclid",
        "mc_eid",
        "ref",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_parent_levels() -> u32 {
    1
}

fn default_navigation_policy() -> NavigationPolicy {
    NavigationPolicy::Limited
}

fn default_min_content_length() -> usize {
    50
}

fn default_base_reading_time() -> [f64; 2] {
    [2.0, 8.0]
}

fn default_navigation_decision() -> [f64; 2] {
    [1.0, 3.0]
}

fn default_variance_percent() -> u32 {
    30
}

fn default_session_break_after() -> usize {
    50
}

fn default_session_break_duration() -> [f64; 2] {
    [30.0, 60.0]
}

fn default_fatigue_factor() -> f64 {
    0.1
}

fn default_weekend_factor() -> f64 {
    1.5
}

fn default_complexity_multiplier() -> f64 {
    1.5
}

fn default_minimum_delay() -> f64 {
    0.5
}

fn default_maximum_delay() -> f64 {
    30.0
}

fn default_cooldown_pages() -> usize {
    10
}

fn default_page_size() -> String {
    "A4".to_string()
}

fn default_orientation() -> String {
    "portrait".to_string()
}

fn default_cache_directory() -> String {
    "cache".to_string()
}

fn default_compression_level() -> u32 {
    6
}

fn default_max_sessions() -> usize {
    50
}

fn default_save_frequency() -> usize {
    1
}

fn default_session_timeout_hours() -> u32 {
    24
}

fn default_max_age_days() -> u32 {
    30
}

fn default_keep_completed() -> usize {
    10
}

fn default_max_size() -> String {
    "10MB".to_string()
}

fn default_markdown_overhead() -> f64 {
    1.2
}

fn default_pdf_overhead() -> f64 {
    2.5
}
