use once_cell::sync::Lazy;
use regex::RegexBuilder;
use scout_core::{BrowserDriver, DomElement, ScoutError};
use tracing::debug;

use crate::config::{
    FLAG_CONTAINER_SELECTOR, FLAG_SPAN_SELECTOR, PHRASE_NEW, PHRASE_TEST, PHRASE_USED_ALT,
    PHRASE_USED_PRIMARY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    New,
    Used,
    Test,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub new: i64,
    pub used: i64,
    pub test: i64,
}

impl PageCounts {
    pub fn total(&self) -> i64 {
        self.new + self.used + self.test
    }

    /// Add one observation of `flag`, respecting the per-page-per-type cap.
    fn add(&mut self, flag: Flag, cap: i64) {
        match flag {
            Flag::New if self.new < cap => self.new += 1,
            Flag::Used if self.used < cap => self.used += 1,
            Flag::Test if self.test < cap => self.test += 1,
            _ => {}
        }
    }
}

/// Exact-phrase classification. A listing contributes to exactly one
/// bucket; resolution order is new > used > test when more than one
/// phrase would match (in practice only possible if a caller
/// concatenates multiple labels into one text blob).
pub fn classify_phrase(text: &str) -> Option<Flag> {
    let trimmed = text.trim();
    if trimmed == PHRASE_NEW {
        Some(Flag::New)
    } else if trimmed == PHRASE_USED_PRIMARY || trimmed == PHRASE_USED_ALT {
        Some(Flag::Used)
    } else if trimmed == PHRASE_TEST {
        Some(Flag::Test)
    } else {
        None
    }
}

fn classify_elements(elements: &[DomElement], cap: i64) -> PageCounts {
    let mut counts = PageCounts::default();
    for el in elements {
        if let Some(flag) = classify_phrase(&el.text) {
            counts.add(flag, cap);
        }
    }
    counts
}

static NEW_RE: Lazy<regex::Regex> = Lazy::new(|| phrase_regex(PHRASE_NEW));
static USED_PRIMARY_RE: Lazy<regex::Regex> = Lazy::new(|| phrase_regex(PHRASE_USED_PRIMARY));
static USED_ALT_RE: Lazy<regex::Regex> = Lazy::new(|| phrase_regex(PHRASE_USED_ALT));
static TEST_RE: Lazy<regex::Regex> = Lazy::new(|| phrase_regex(PHRASE_TEST));

fn phrase_regex(phrase: &str) -> regex::Regex {
    RegexBuilder::new(&regex::escape(phrase))
        .case_insensitive(true)
        .build()
        .expect("static phrase is always a valid regex")
}

/// Tier 3: case-insensitive regex over the raw page source, counting
/// non-overlapping matches per type, each capped at `cap`.
fn regex_fallback(raw_html: &str, cap: i64) -> PageCounts {
    let new = NEW_RE.find_iter(raw_html).count().min(cap as usize) as i64;
    let used = (USED_PRIMARY_RE.find_iter(raw_html).count() + USED_ALT_RE.find_iter(raw_html).count())
        .min(cap as usize) as i64;
    let test = TEST_RE.find_iter(raw_html).count().min(cap as usize) as i64;
    PageCounts { new, used, test }
}

/// Three-tier flag extraction for the current page. First tier that
/// yields any counts wins.
pub fn extract_page_flags(driver: &dyn BrowserDriver, cap: i64) -> Result<PageCounts, ScoutError> {
    let tier1 = classify_elements(&driver.find_all(FLAG_SPAN_SELECTOR)?, cap);
    if tier1.total() > 0 {
        return Ok(tier1);
    }

    let tier2 = classify_elements(&driver.find_all(FLAG_CONTAINER_SELECTOR)?, cap);
    if tier2.total() > 0 {
        debug!("flag extraction fell back to tier 2 (container text)");
        return Ok(tier2);
    }

    let raw = driver.source()?;
    let tier3 = regex_fallback(&raw, cap);
    if tier3.total() > 0 {
        debug!("flag extraction fell back to tier 3 (regex over raw source)");
    }
    Ok(tier3)
}
