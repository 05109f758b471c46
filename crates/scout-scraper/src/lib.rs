//! Store Scraper (C7): given a store URL, drives the browser driver (C5)
//! and pacing controller (C6) to detect the target category, walk
//! pagination, and count active listings by vehicle condition.

mod category;
pub mod config;
mod flags;

use std::time::Duration;

use scout_core::{BrowserDriver, ClassificationOutcome, PacingSituation, ScoutError};
use scout_pacing::{PacingController, Sleeper};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use config::ScraperLimits;
pub use flags::{Flag, PageCounts};

pub struct StoreScraper {
    pub target_category_id: u64,
    pub limits: ScraperLimits,
}

impl StoreScraper {
    pub fn new(target_category_id: u64, limits: ScraperLimits) -> Self {
        Self { target_category_id, limits }
    }

    /// Visit `url`, classify it, and count active listings by type.
    /// Never propagates a driver or DOM-traversal error to the caller —
    /// everything below this function is recovered into a
    /// `ClassificationOutcome` instead, so one bad store never aborts
    /// the run.
    pub async fn scrape<S: Sleeper>(
        &self,
        url: &str,
        driver: &mut dyn BrowserDriver,
        pacing: &PacingController<S>,
        cancel: &CancellationToken,
    ) -> ClassificationOutcome {
        let target_url = format!("{url}?categoryId={}", self.target_category_id);
        let timeout = Duration::from_secs(self.limits.navigation_timeout_secs);

        if let Err(e) = driver.open(&target_url, timeout).await {
            warn!(url, error = %e, "store unreachable");
            pacing.pace(PacingSituation::ErrorRecovery, cancel).await;
            return ClassificationOutcome::unreachable();
        }

        driver.dismiss_consent(config::CONSENT_BUTTON_SELECTOR);
        pacing.pace(PacingSituation::PageLoad, cancel).await;

        let is_automoto = match category::detects_target_category(driver, self.target_category_id) {
            Ok(v) => v,
            Err(e) => {
                warn!(url, error = %e, "category detection failed");
                pacing.pace(PacingSituation::ErrorRecovery, cancel).await;
                return ClassificationOutcome::unreachable();
            }
        };

        if !is_automoto {
            return ClassificationOutcome {
                is_valid: true,
                is_automoto: false,
                new: 0,
                used: 0,
                test: 0,
            };
        }

        match self.walk_pagination(url, driver, pacing, cancel).await {
            Ok(totals) => ClassificationOutcome {
                is_valid: true,
                is_automoto: true,
                new: totals.new,
                used: totals.used,
                test: totals.test,
            },
            Err(e) => {
                warn!(url, error = %e, "pagination walk failed");
                pacing.pace(PacingSituation::ErrorRecovery, cancel).await;
                ClassificationOutcome::unreachable()
            }
        }
    }

    /// Basic-mode visit: open the store and detect its category, but skip
    /// the pagination walk entirely — counts always come back zero. Used
    /// when the run is asked for classification only, no inventory counts.
    pub async fn scrape_basic<S: Sleeper>(
        &self,
        url: &str,
        driver: &mut dyn BrowserDriver,
        pacing: &PacingController<S>,
        cancel: &CancellationToken,
    ) -> ClassificationOutcome {
        let target_url = format!("{url}?categoryId={}", self.target_category_id);
        let timeout = Duration::from_secs(self.limits.navigation_timeout_secs);

        if let Err(e) = driver.open(&target_url, timeout).await {
            warn!(url, error = %e, "store unreachable");
            pacing.pace(PacingSituation::ErrorRecovery, cancel).await;
            return ClassificationOutcome::unreachable();
        }

        driver.dismiss_consent(config::CONSENT_BUTTON_SELECTOR);
        pacing.pace(PacingSituation::PageLoad, cancel).await;

        match category::detects_target_category(driver, self.target_category_id) {
            Ok(is_automoto) => ClassificationOutcome {
                is_valid: true,
                is_automoto,
                new: 0,
                used: 0,
                test: 0,
            },
            Err(e) => {
                warn!(url, error = %e, "category detection failed");
                pacing.pace(PacingSituation::ErrorRecovery, cancel).await;
                ClassificationOutcome::unreachable()
            }
        }
    }

    async fn walk_pagination<S: Sleeper>(
        &self,
        base_url: &str,
        driver: &mut dyn BrowserDriver,
        pacing: &PacingController<S>,
        cancel: &CancellationToken,
    ) -> Result<PageCounts, ScoutError> {
        let timeout = Duration::from_secs(self.limits.navigation_timeout_secs);
        let mut totals = PageCounts::default();

        for page in 1..=self.limits.max_pages {
            if page > 1 {
                pacing.pace(PacingSituation::Pagination, cancel).await;
                let page_url = format!(
                    "{base_url}?categoryId={}&page={page}",
                    self.target_category_id
                );
                if let Err(e) = driver.open(&page_url, timeout).await {
                    info!(base_url, page, error = %e, "pagination request failed, stopping walk");
                    break;
                }
            }

            let page_counts = flags::extract_page_flags(driver, self.limits.per_page_type_cap)?;
            totals.new += page_counts.new;
            totals.used += page_counts.used;
            totals.test += page_counts.test;

            if page_counts.total() == 0 && page > 1 {
                break;
            }

            pacing.pace(PacingSituation::DataExtract, cancel).await;
        }

        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_browser::FixtureDriver;

    fn listing_page(flags: &[&str]) -> String {
        let items: String = flags
            .iter()
            .map(|f| format!(r#"<li class="entity-flag"><span class="flag">{f}</span></li>"#))
            .collect();
        format!(
            r#"<html><body><a href="?categoryId=123">Auto-moto</a>{items}</body></html>"#
        )
    }

    #[tokio::test]
    async fn single_page_store_counts_by_type() {
        let mut driver = FixtureDriver::new().with_page(
            "https://example.hr/trgovina/a?categoryId=123",
            listing_page(&["Novo vozilo", "Novo vozilo", "Rabljeno vozilo", "Testno vozilo"]),
        );
        let scraper = StoreScraper::new(123, ScraperLimits::default());
        let pacing = PacingController::with_sleeper(NoopSleeper);
        let cancel = CancellationToken::new();

        let outcome = scraper
            .scrape("https://example.hr/trgovina/a", &mut driver, &pacing, &cancel)
            .await;

        assert!(outcome.is_valid);
        assert!(outcome.is_automoto);
        assert_eq!(outcome.new, 2);
        assert_eq!(outcome.used, 1);
        assert_eq!(outcome.test, 1);
        assert_eq!(outcome.total(), 4);
    }

    #[tokio::test]
    async fn store_without_category_has_zero_counts() {
        let mut driver = FixtureDriver::new().with_page(
            "https://example.hr/trgovina/b?categoryId=123",
            "<html><body><h1>Odjeća i obuća</h1></body></html>",
        );
        let scraper = StoreScraper::new(123, ScraperLimits::default());
        let pacing = PacingController::with_sleeper(NoopSleeper);
        let cancel = CancellationToken::new();

        let outcome = scraper
            .scrape("https://example.hr/trgovina/b", &mut driver, &pacing, &cancel)
            .await;

        assert!(outcome.is_valid);
        assert!(!outcome.is_automoto);
        assert_eq!(outcome.total(), 0);
    }

    #[tokio::test]
    async fn unreachable_store_is_invalid() {
        let mut driver = FixtureDriver::new(); // no pages registered
        let scraper = StoreScraper::new(123, ScraperLimits::default());
        let pacing = PacingController::with_sleeper(NoopSleeper);
        let cancel = CancellationToken::new();

        let outcome = scraper
            .scrape("https://example.hr/trgovina/missing", &mut driver, &pacing, &cancel)
            .await;

        assert!(!outcome.is_valid);
        assert_eq!(outcome.total(), 0);
    }

    #[tokio::test]
    async fn pagination_stops_on_empty_page() {
        let mut driver = FixtureDriver::new()
            .with_page(
                "https://example.hr/trgovina/c?categoryId=123",
                listing_page(&["Novo vozilo"]),
            )
            .with_page(
                "https://example.hr/trgovina/c?categoryId=123&page=2",
                listing_page(&["Novo vozilo"]),
            )
            .with_page(
                "https://example.hr/trgovina/c?categoryId=123&page=3",
                "<html><body><a href=\"?categoryId=123\">Auto-moto</a></body></html>",
            );
        let scraper = StoreScraper::new(123, ScraperLimits::default());
        let pacing = PacingController::with_sleeper(NoopSleeper);
        let cancel = CancellationToken::new();

        let outcome = scraper
            .scrape("https://example.hr/trgovina/c", &mut driver, &pacing, &cancel)
            .await;

        assert_eq!(outcome.new, 2); // page 1 + page 2, stops before a 4th page
    }

    struct NoopSleeper;
    #[async_trait::async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }
}
