//! Sitemap ingestion (C3): walk a root sitemap index, transparently
//! decompress gzipped leaves, extract `/trgovina/` store URLs, and dedupe
//! them into the store registry.

mod client;
mod xml;

use std::time::Duration;

use scout_core::{IngestReport, ScoutError};
use scout_storage::Storage;
use tracing::{info, warn};

pub struct SitemapWalker {
    client: reqwest::Client,
    retry_delays: Vec<Duration>,
}

impl SitemapWalker {
    pub fn new(fetch_timeout: Duration, retry_delays_seconds: &[u64]) -> Result<Self, ScoutError> {
        Ok(Self {
            client: client::build_client(fetch_timeout)?,
            retry_delays: retry_delays_seconds.iter().copied().map(Duration::from_secs).collect(),
        })
    }

    /// Fetch `root_index_url`, walk its child sitemaps, and seed any newly
    /// discovered `/trgovina/` store URLs into `storage`. A child sitemap
    /// that fails to fetch or parse is logged and skipped; `ingest` only
    /// fails if the root index itself cannot be fetched or yields no
    /// usable child references at all.
    pub async fn ingest(
        &self,
        root_index_url: &str,
        storage: &Storage,
    ) -> Result<IngestReport, ScoutError> {
        let root_xml = client::fetch_text(&self.client, root_index_url, &self.retry_delays)
            .await
            .map_err(|e| ScoutError::Network(format!("root sitemap index: {e}")))?;

        let mut child_refs = xml::extract_locs(&root_xml);
        if child_refs.is_empty() {
            return Err(ScoutError::Parse(format!(
                "root sitemap index {root_index_url} yielded no <loc> references"
            )));
        }

        // Prioritise children whose URL suggests they hold store pages.
        child_refs.sort_by_key(|u| !xml::looks_like_store_sitemap(u));

        let mut discovered = Vec::new();
        let mut skipped = 0usize;

        for child_url in &child_refs {
            match client::fetch_text(&self.client, child_url, &self.retry_delays).await {
                Ok(body) => {
                    let locs = xml::extract_locs(&body);
                    let stores = xml::filter_store_urls(locs);
                    if stores.is_empty() {
                        debug_no_stores(child_url);
                    } else {
                        info!(child = %child_url, count = stores.len(), "store URLs extracted");
                    }
                    discovered.extend(stores);
                }
                Err(e) => {
                    warn!(child = %child_url, error = %e, "skipping unreachable/unparseable child sitemap");
                    skipped += 1;
                }
            }
        }

        if discovered.is_empty() && skipped == child_refs.len() {
            return Err(ScoutError::Network(format!(
                "all {} child sitemaps under {root_index_url} failed",
                child_refs.len()
            )));
        }

        discovered.sort();
        discovered.dedup();

        let inserted = storage
            .seed_new(&discovered)
            .await
            .map_err(|e| ScoutError::Storage(e.to_string()))?;

        Ok(IngestReport {
            discovered: discovered.len(),
            inserted,
            skipped,
        })
    }
}

fn debug_no_stores(child_url: &str) {
    tracing::debug!(child = %child_url, "no /trgovina/ URLs in this child sitemap");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingest_is_idempotent_on_repeat_run() {
        let storage = Storage::open(":memory:").await.unwrap();
        storage.run_migrations().await.unwrap();

        // Simulate the dedupe step directly (network fetch is exercised in
        // client.rs's unit tests; this guards the storage-facing half of
        // ingest's contract: repeat seeding of the same URLs yields 0).
        let urls = vec![
            "https://example.hr/trgovina/a".to_string(),
            "https://example.hr/trgovina/b".to_string(),
        ];
        assert_eq!(storage.seed_new(&urls).await.unwrap(), 2);
        assert_eq!(storage.seed_new(&urls).await.unwrap(), 0);
    }
}
