use scout_core::{BrowserDriver, ScoutError};

use crate::config::{CATEGORY_CHIP_SELECTORS, CATEGORY_KEYWORDS};

/// Whether the currently-open page exposes the target category: any of
/// (a) a category anchor linking to `categoryId=<target>`, (b)
/// visible-text keyword match, (c) a known category-chip element
/// labelled with those keywords.
pub fn detects_target_category(driver: &dyn BrowserDriver, target_category_id: u64) -> Result<bool, ScoutError> {
    if has_category_anchor(driver, target_category_id)? {
        return Ok(true);
    }
    if has_category_keyword_in_text(driver)? {
        return Ok(true);
    }
    if has_labelled_category_chip(driver)? {
        return Ok(true);
    }
    Ok(false)
}

fn has_category_anchor(driver: &dyn BrowserDriver, target_category_id: u64) -> Result<bool, ScoutError> {
    let needle = format!("categoryId={target_category_id}");
    let anchors = driver.find_all("a[href]")?;
    Ok(anchors.iter().any(|a| a.href.as_deref().is_some_and(|h| h.contains(&needle))))
}

fn has_category_keyword_in_text(driver: &dyn BrowserDriver) -> Result<bool, ScoutError> {
    let html = driver.source()?;
    let lower = html.to_lowercase();
    Ok(CATEGORY_KEYWORDS.iter().any(|kw| lower.contains(kw)))
}

fn has_labelled_category_chip(driver: &dyn BrowserDriver) -> Result<bool, ScoutError> {
    for selector in CATEGORY_CHIP_SELECTORS {
        let chips = driver.find_all(selector)?;
        for chip in chips {
            let lower = chip.text.to_lowercase();
            if CATEGORY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_browser::FixtureDriver;
    use std::time::Duration;

    async fn open(driver: &mut FixtureDriver, url: &str) {
        driver.open(url, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn detects_via_category_anchor() {
        let mut driver = FixtureDriver::new().with_page(
            "https://example.hr/trgovina/a",
            r#"<html><body><a href="/trgovina/a?categoryId=123">Auto-moto</a></body></html>"#,
        );
        open(&mut driver, "https://example.hr/trgovina/a").await;
        assert!(detects_target_category(&driver, 123).unwrap());
        assert!(!detects_target_category(&driver, 999).unwrap());
    }

    #[tokio::test]
    async fn detects_via_keyword_text_when_no_anchor_matches() {
        let mut driver = FixtureDriver::new().with_page(
            "https://example.hr/trgovina/b",
            "<html><body><h1>Dobrodošli u naš auto-moto odjel</h1></body></html>",
        );
        open(&mut driver, "https://example.hr/trgovina/b").await;
        assert!(detects_target_category(&driver, 123).unwrap());
    }

    #[tokio::test]
    async fn returns_false_when_nothing_matches() {
        let mut driver = FixtureDriver::new()
            .with_page("https://example.hr/trgovina/c", "<html><body><h1>Odjeća</h1></body></html>");
        open(&mut driver, "https://example.hr/trgovina/c").await;
        assert!(!detects_target_category(&driver, 123).unwrap());
    }
}
