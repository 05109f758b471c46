use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use scout_core::{BrowserDriver, DomElement, ScoutError};
use tracing::{info, warn};

use crate::stealth;

/// C5's real backend: a `headless_chrome`-driven Chromium instance with
/// stealth posture applied once at construction, optionally routed
/// through a loopback SOCKS5 endpoint.
pub struct HeadlessBrowserDriver {
    browser: Browser,
    tab: Option<Arc<Tab>>,
    proxy_addr: Option<String>,
    display_num: Option<String>,
    consecutive_failures: u32,
}

impl HeadlessBrowserDriver {
    /// Build a fresh browser instance. `proxy_addr` is `host:port` for a
    /// loopback SOCKS5 endpoint (C4), or `None` for a direct connection.
    pub fn new(proxy_addr: Option<String>, display_num: Option<String>) -> Result<Self, ScoutError> {
        let browser = launch(proxy_addr.as_deref(), display_num.as_deref())?;
        Ok(Self {
            browser,
            tab: None,
            proxy_addr,
            display_num,
            consecutive_failures: 0,
        })
    }

    /// Navigation failures since the last success or rebuild; the
    /// driver's own bookkeeping for its "3 consecutive failures" rebuild
    /// trigger (distinct from the scraper's per-store invalid-visit count).
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    async fn rebuild_if_unhealthy(&mut self) {
        if self.consecutive_failures >= 3 {
            if let Err(e) = self.rebuild().await {
                warn!(error = %e, "driver rebuild after repeated failures also failed");
            }
        }
    }

    fn tab(&mut self) -> Result<Arc<Tab>, ScoutError> {
        if let Some(tab) = &self.tab {
            return Ok(Arc::clone(tab));
        }
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| ScoutError::Network(format!("opening tab: {e}")))?;

        // Stealth script runs once per tab, re-applied on every navigation
        // in that tab via addScriptToEvaluateOnNewDocument — not re-issued
        // per call.
        let _ = tab.call_method(AddScriptToEvaluateOnNewDocument {
            source: stealth::STEALTH_SCRIPT.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        });

        self.tab = Some(Arc::clone(&tab));
        Ok(tab)
    }
}

#[async_trait]
impl BrowserDriver for HeadlessBrowserDriver {
    async fn open(&mut self, url: &str, timeout: Duration) -> Result<(), ScoutError> {
        let url = url.to_string();
        let tab = self.tab()?;
        let tab_nav = Arc::clone(&tab);

        let result = tokio::time::timeout(timeout, async move {
            tokio::task::spawn_blocking(move || -> Result<(), ScoutError> {
                tab_nav
                    .navigate_to(&url)
                    .map_err(|e| ScoutError::Network(format!("navigate to {url}: {e}")))?;
                tab_nav
                    .wait_until_navigated()
                    .map_err(|e| ScoutError::Network(format!("waiting for navigation: {e}")))?;
                Ok(())
            })
            .await
            .map_err(|e| ScoutError::Other(anyhow::anyhow!("navigation task panicked: {e}")))?
        })
        .await;

        match result {
            Ok(Ok(())) => {
                self.consecutive_failures = 0;
                Ok(())
            }
            Ok(Err(e)) => {
                self.consecutive_failures += 1;
                self.rebuild_if_unhealthy().await;
                Err(e)
            }
            Err(_) => {
                self.consecutive_failures += 1;
                self.rebuild_if_unhealthy().await;
                Err(ScoutError::Timeout(timeout.as_secs()))
            }
        }
    }

    fn source(&self) -> Result<String, ScoutError> {
        let tab = self.tab.as_ref().ok_or_else(|| ScoutError::Network("no open tab".into()))?;
        tab.get_content().map_err(|e| ScoutError::Network(e.to_string()))
    }

    fn find_all(&self, css: &str) -> Result<Vec<DomElement>, ScoutError> {
        let tab = self.tab.as_ref().ok_or_else(|| ScoutError::Network("no open tab".into()))?;
        let elements = match tab.find_elements(css) {
            Ok(els) => els,
            Err(_) => return Ok(Vec::new()), // selector matched nothing: not an error
        };

        let mut out = Vec::with_capacity(elements.len());
        for el in elements {
            let text = el.get_inner_text().unwrap_or_default();
            let href = el.get_attribute_value("href").ok().flatten();
            out.push(DomElement { text, href });
        }
        Ok(out)
    }

    fn dismiss_consent(&mut self, selector: &str) {
        let Some(tab) = &self.tab else { return };
        if let Ok(el) = tab.find_element(selector) {
            let _ = el.click();
        }
    }

    async fn rebuild(&mut self) -> Result<(), ScoutError> {
        warn!("rebuilding browser driver after repeated failures");
        self.tab = None;
        let browser = launch(self.proxy_addr.as_deref(), self.display_num.as_deref())?;
        self.browser = browser;
        self.consecutive_failures = 0;
        Ok(())
    }
}

fn launch(proxy_addr: Option<&str>, display_num: Option<&str>) -> Result<Browser, ScoutError> {
    let mut extra_args: Vec<OsString> = vec![
        OsString::from("--no-sandbox"),
        OsString::from("--disable-dev-shm-usage"),
        OsString::from("--disable-gpu"),
        OsString::from("--disable-blink-features=AutomationControlled"),
        OsString::from("--metrics-recording-only"),
        OsString::from("--disable-background-networking"),
    ];

    if let Some(proxy) = proxy_addr {
        extra_args.push(OsString::from(format!("--proxy-server=socks5://{proxy}")));
    }
    if let Some(display) = display_num {
        std::env::set_var("DISPLAY", display);
    }

    let (width, height) = stealth::random_viewport();
    let ua = stealth::random_user_agent();
    extra_args.push(OsString::from(format!("--user-agent={ua}")));

    let launch_options = LaunchOptionsBuilder::default()
        .headless(true)
        .window_size(Some((width, height)))
        .args(extra_args.iter().map(|a| a.as_ref()).collect())
        .build()
        .map_err(|e| ScoutError::Config(e.to_string()))?;

    info!(proxy = ?proxy_addr, width, height, "launching browser");
    Browser::new(launch_options).map_err(|e| ScoutError::Network(format!("launching browser: {e}")))
}
