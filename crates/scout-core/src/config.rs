use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub sitemap: SitemapConfig,
    pub tunnel: TunnelConfig,
    pub browser: BrowserConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    pub base_url: String,
    pub target_category_id: u64,
    /// X display identifier passed to the headless browser (e.g. ":99").
    #[serde(default)]
    pub display_num: Option<String>,
    #[serde(default)]
    pub telemetry_dsn: Option<String>,
    #[serde(default = "default_max_stores")]
    pub max_stores_default: Option<u64>,
}

fn default_max_stores() -> Option<u64> {
    None
}

#[derive(Debug, Deserialize, Clone)]
pub struct SitemapConfig {
    pub root_index_url: String,
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_retry_delays")]
    pub retry_delays_seconds: Vec<u64>,
}

fn default_staleness_days() -> i64 {
    7
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_retry_delays() -> Vec<u64> {
    vec![1, 3, 8]
}

#[derive(Debug, Deserialize, Clone)]
pub struct TunnelConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path to a JSON file mapping tunnel names to endpoint records.
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default = "default_establish_timeout")]
    pub establish_timeout_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

fn default_establish_timeout() -> u64 {
    10
}
fn default_probe_timeout() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_nav_timeout")]
    pub navigation_timeout_seconds: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_store: u32,
    #[serde(default = "default_per_page_cap")]
    pub per_page_type_cap: i64,
}

fn default_nav_timeout() -> u64 {
    30
}
fn default_max_pages() -> u32 {
    20
}
fn default_per_page_cap() -> i64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Filesystem path to the embedded SQLite store.
    pub database_path: String,
}
