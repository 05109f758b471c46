use rand::seq::SliceRandom;
use rand::Rng;

/// Small pool of real desktop browser user-agent strings. Real entries —
/// no version numbers that would fingerprint this scraper as a bot by
/// being implausibly out-of-date.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Realistic desktop viewport range to jitter within, so every launched
/// driver doesn't present an identical window size.
const VIEWPORT_WIDTH_RANGE: (u32, u32) = (1280, 1920);
const VIEWPORT_HEIGHT_RANGE: (u32, u32) = (800, 1080);

pub fn random_user_agent() -> &'static str {
    USER_AGENTS.choose(&mut rand::thread_rng()).copied().unwrap_or(USER_AGENTS[0])
}

pub fn random_viewport() -> (u32, u32) {
    let mut rng = rand::thread_rng();
    (
        rng.gen_range(VIEWPORT_WIDTH_RANGE.0..=VIEWPORT_WIDTH_RANGE.1),
        rng.gen_range(VIEWPORT_HEIGHT_RANGE.0..=VIEWPORT_HEIGHT_RANGE.1),
    )
}

/// Injected once per tab via `Page.addScriptToEvaluateOnNewDocument` so it
/// runs before every page's own scripts, on every navigation in that tab —
/// not re-applied per call, just registered once at driver construction.
pub const STEALTH_SCRIPT: &str = r#"
(() => {
  Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
  Object.defineProperty(navigator, 'languages', { get: () => ['hr-HR', 'hr', 'en-US', 'en'] });
  Object.defineProperty(navigator, 'plugins', {
    get: () => [1, 2, 3, 4, 5].map(() => ({ name: 'Chrome PDF Plugin' })),
  });
  window.chrome = window.chrome || { runtime: {} };
})();
"#;
