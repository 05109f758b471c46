use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use scout_core::{BrowserDriver, DomElement, ScoutError};
use scraper::{Html, Selector};

/// Test backend for the browser driver pool: serves static HTML fixtures
/// keyed by URL instead of driving a real browser, so the extraction
/// logic built on top of it is property-testable without Chromium.
/// `open` fails for any URL not in the fixture map, mirroring a
/// navigation timeout.
#[derive(Default)]
pub struct FixtureDriver {
    pages: HashMap<String, String>,
    current: Option<String>,
    consent_clicked: bool,
}

impl FixtureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn consent_was_clicked(&self) -> bool {
        self.consent_clicked
    }
}

#[async_trait]
impl BrowserDriver for FixtureDriver {
    async fn open(&mut self, url: &str, _timeout: Duration) -> Result<(), ScoutError> {
        if self.pages.contains_key(url) {
            self.current = Some(url.to_string());
            Ok(())
        } else {
            Err(ScoutError::Timeout(0))
        }
    }

    fn source(&self) -> Result<String, ScoutError> {
        let url = self.current.as_ref().ok_or_else(|| ScoutError::Network("no page open".into()))?;
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }

    fn find_all(&self, css: &str) -> Result<Vec<DomElement>, ScoutError> {
        let html = self.source()?;
        let document = Html::parse_document(&html);
        let Ok(selector) = Selector::parse(css) else {
            return Ok(Vec::new());
        };

        Ok(document
            .select(&selector)
            .map(|el| DomElement {
                text: el.text().collect::<Vec<_>>().join(""),
                href: el.value().attr("href").map(str::to_string),
            })
            .collect())
    }

    fn dismiss_consent(&mut self, selector: &str) {
        if self.find_all(selector).map(|v| !v.is_empty()).unwrap_or(false) {
            self.consent_clicked = true;
        }
    }

    async fn rebuild(&mut self) -> Result<(), ScoutError> {
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_registered_pages_and_rejects_unknown_urls() {
        let mut driver = FixtureDriver::new().with_page("https://example.hr/a", "<html><body>hi</body></html>");
        assert!(driver.open("https://example.hr/a", Duration::from_secs(1)).await.is_ok());
        assert_eq!(driver.source().unwrap(), "<html><body>hi</body></html>");
        assert!(driver.open("https://example.hr/missing", Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn find_all_queries_fixture_dom() {
        let mut driver = FixtureDriver::new().with_page(
            "https://example.hr/a",
            r#"<html><body><li class="entity-flag"><span class="flag">Novo vozilo</span></li></body></html>"#,
        );
        driver.open("https://example.hr/a", Duration::from_secs(1)).await.unwrap();
        let els = driver.find_all("li.entity-flag > span.flag").unwrap();
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].text, "Novo vozilo");
    }
}
