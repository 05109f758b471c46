/// Croatian keywords for fallback category-text detection. Includes
/// morphological variants to reduce false negatives, not just the
/// three bare root words.
pub const CATEGORY_KEYWORDS: &[&str] = &[
    "auto", "automobil", "moto", "motocikl", "vozila", "vozilo",
];

/// CSS selectors tried, in order, for a "category chip" UI element that
/// labels the current category.
pub const CATEGORY_CHIP_SELECTORS: &[&str] = &[
    ".category-chip",
    ".chip.category",
    "[data-category]",
    ".active-category",
];

/// Best-effort GDPR consent button selector. A miss here is not an
/// error — `dismiss_consent` on the driver swallows it.
pub const CONSENT_BUTTON_SELECTOR: &str = "#onetrust-accept-btn-handler";

pub const FLAG_SPAN_SELECTOR: &str = "li.entity-flag > span.flag";
pub const FLAG_CONTAINER_SELECTOR: &str = "li.entity-flag";

pub const PHRASE_NEW: &str = "Novo vozilo";
pub const PHRASE_USED_PRIMARY: &str = "Rabljeno vozilo";
pub const PHRASE_USED_ALT: &str = "Polovno vozilo";
pub const PHRASE_TEST: &str = "Testno vozilo";

#[derive(Debug, Clone, Copy)]
pub struct ScraperLimits {
    pub max_pages: u32,
    pub per_page_type_cap: i64,
    pub navigation_timeout_secs: u64,
}

impl Default for ScraperLimits {
    fn default() -> Self {
        Self {
            max_pages: 20,
            per_page_type_cap: 100,
            navigation_timeout_secs: 30,
        }
    }
}
