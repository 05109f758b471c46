use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScoutError;

/// A dealer store, identified by its canonical URL. Mirrors the
/// `scraped_stores` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub url: String,
    /// Opaque per-run payload (last run only); never interpreted by the core.
    pub results: Option<Value>,
    pub is_valid: bool,
    pub is_automoto: Option<bool>,
    pub new_vehicle_count: i64,
    pub used_vehicle_count: i64,
    pub test_vehicle_count: i64,
    pub total_vehicle_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only row in the ledger. Mirrors `store_snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub scraped_at: DateTime<Utc>,
    pub active_new: i64,
    pub active_used: i64,
    pub active_test: i64,
    pub active_total: i64,
    pub delta_new: i64,
    pub delta_used: i64,
    pub delta_test: i64,
    pub delta_total: i64,
}

/// What a single store visit produces; the sole input to persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationOutcome {
    pub is_valid: bool,
    pub is_automoto: bool,
    pub new: i64,
    pub used: i64,
    pub test: i64,
}

impl ClassificationOutcome {
    pub fn total(&self) -> i64 {
        self.new + self.used + self.test
    }

    pub fn unreachable() -> Self {
        Self {
            is_valid: false,
            is_automoto: false,
            new: 0,
            used: 0,
            test: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapRefKind {
    Index,
    Leaf,
}

#[derive(Debug, Clone)]
pub struct SitemapRef {
    pub url: String,
    pub kind: SitemapRefKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    Down,
    Connecting,
    Up,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub name: String,
    pub local_loopback_port: u16,
    pub remote_ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub ssh_key_path: String,
    pub status: ProxyStatus,
}

impl ProxyEndpoint {
    pub fn socks_addr(&self) -> String {
        format!("127.0.0.1:{}", self.local_loopback_port)
    }
}

/// Enumerated pacing situations. Parameters are the triangular
/// distribution bounds for each; situations with no mode are uniform
/// on (min, max).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacingSituation {
    StoreVisit,
    PageLoad,
    DataExtract,
    Pagination,
    ErrorRecovery,
    ExtendedBreak,
}

impl PacingSituation {
    /// (min, mode, max) in seconds. `mode = None` means draw uniform(min, max).
    pub fn bounds(self) -> (f64, Option<f64>, f64) {
        match self {
            PacingSituation::StoreVisit => (8.0, Some(12.0), 20.0),
            PacingSituation::PageLoad => (2.0, Some(3.0), 5.0),
            PacingSituation::DataExtract => (1.0, Some(2.0), 3.0),
            PacingSituation::Pagination => (3.0, Some(5.0), 8.0),
            PacingSituation::ErrorRecovery => (15.0, None, 30.0),
            PacingSituation::ExtendedBreak => (30.0, None, 90.0),
        }
    }
}

/// Which run mode the orchestrator was asked to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Basic,
    Enhanced,
    Tunnel,
}

/// Outcome of a sitemap ingestion pass (C3).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestReport {
    pub discovered: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Terminal summary of one orchestrator run (C8).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub visited: u64,
    pub valid: u64,
    pub automoto: u64,
    pub new_total: i64,
    pub used_total: i64,
    pub test_total: i64,
    pub aborted: bool,
    pub error: Option<String>,
}

/// A DOM element snapshot returned by a [`BrowserDriver`]: just enough
/// for C7's category detection and flag extraction, decoupled from
/// whatever live-handle type the concrete driver uses internally.
#[derive(Debug, Clone, Default)]
pub struct DomElement {
    pub text: String,
    pub href: Option<String>,
}

/// Capability set exposed by the browser layer to the scraper: a
/// headless-browser backend and a fixture-HTML backend are both
/// implementations of this trait, so the extraction logic that drives
/// it is property-testable without a real browser.
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to `url` and wait for document-complete + network-idle.
    async fn open(&mut self, url: &str, timeout: Duration) -> Result<(), ScoutError>;

    /// The current page's rendered HTML.
    fn source(&self) -> Result<String, ScoutError>;

    /// All elements matching `css`, as text/href snapshots.
    fn find_all(&self, css: &str) -> Result<Vec<DomElement>, ScoutError>;

    /// The first element matching `css`, if any.
    fn find(&self, css: &str) -> Result<Option<DomElement>, ScoutError> {
        Ok(self.find_all(css)?.into_iter().next())
    }

    /// Whether any element matches `css`.
    fn exists(&self, css: &str) -> Result<bool, ScoutError> {
        Ok(!self.find_all(css)?.is_empty())
    }

    /// Best-effort click on a known consent-button selector. Errors ignored.
    fn dismiss_consent(&mut self, selector: &str);

    /// Quit and reconstruct the underlying driver (used after a transport
    /// or proxy change, or after repeated navigation failures).
    async fn rebuild(&mut self) -> Result<(), ScoutError>;
}
