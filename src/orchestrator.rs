//! Run Orchestrator (C8): a single scrape run — decide whether to
//! re-ingest the sitemap, scan known stores in the chosen mode, respect
//! a per-run store cap, and produce a terminal summary.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use scout_browser::HeadlessBrowserDriver;
use scout_core::{AppConfig, BrowserDriver, RunMode, RunReport};
use scout_pacing::PacingController;
use scout_scraper::{ScraperLimits, StoreScraper};
use scout_sitemap::SitemapWalker;
use scout_storage::Storage;
use scout_tunnel::TunnelSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, CliMode};

impl From<CliMode> for RunMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Tunnel => RunMode::Tunnel,
            CliMode::Enhanced => RunMode::Enhanced,
            CliMode::Basic => RunMode::Basic,
        }
    }
}

pub async fn run(config: AppConfig, cli: &Cli, cancel: CancellationToken) -> Result<RunReport> {
    let mode: RunMode = cli.mode.into();
    let use_tunnels = mode == RunMode::Tunnel && !cli.no_tunnels && config.tunnel.enabled;

    // Rather than skip persistence logic entirely (which would also skip
    // the registry the run iterates over), --no-database runs against an
    // ephemeral in-memory database so the full pipeline still executes
    // but leaves no durable artifact on disk.
    let storage = if cli.no_database {
        info!("--no-database: running against an ephemeral in-memory registry");
        Storage::open(":memory:").await?
    } else {
        Storage::open(&config.database.database_path).await?
    };
    storage.run_migrations().await?;

    maybe_ingest_sitemap(&config, &storage).await;

    let urls = storage.list_to_scrape(cli.max_stores.or(config.general.max_stores_default)).await?;
    info!(count = urls.len(), mode = ?mode, "stores selected for this run");

    let mut tunnel = if use_tunnels {
        build_tunnel_supervisor(&config).await
    } else {
        None
    };

    let mut current_proxy = match tunnel.as_mut() {
        Some(supervisor) => supervisor.current().await.map(|e| e.socks_addr()),
        None => None,
    };
    let mut driver = HeadlessBrowserDriver::new(current_proxy.clone(), config.general.display_num.clone())?;

    let scraper = StoreScraper::new(
        config.general.target_category_id,
        ScraperLimits {
            max_pages: config.browser.max_pages_per_store,
            per_page_type_cap: config.browser.per_page_type_cap,
            navigation_timeout_secs: config.browser.navigation_timeout_seconds,
        },
    );
    let mut pacing = PacingController::new();
    let extended_break_period = rand::thread_rng().gen_range(8..=15u64);

    let mut report = RunReport::default();
    let mut consecutive_invalid = 0u32;

    for (i, url) in urls.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("cancellation observed, stopping before next store");
            break;
        }

        if i > 0 {
            pacing.pace(scout_core::PacingSituation::StoreVisit, &cancel).await;
        }

        if i > 0 && (i as u64) % extended_break_period == 0 {
            pacing.pace(scout_core::PacingSituation::ExtendedBreak, &cancel).await;
            if let Some(supervisor) = tunnel.as_mut() {
                match supervisor.rotate().await {
                    Ok(()) => {
                        if let Some(endpoint) = supervisor.current().await {
                            let addr = endpoint.socks_addr();
                            if let Err(e) =
                                rebuild_with_proxy(&mut driver, &addr, config.general.display_num.clone()).await
                            {
                                warn!(error = %e, "driver rebuild after rotation failed");
                            } else {
                                current_proxy = Some(addr);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "tunnel rotation exhausted all candidates, continuing without proxy");
                        current_proxy = None;
                    }
                }
            }
        }

        let started = std::time::Instant::now();
        let outcome = if mode == RunMode::Basic {
            scraper.scrape_basic(url, &mut driver, &pacing, &cancel).await
        } else {
            scraper.scrape(url, &mut driver, &pacing, &cancel).await
        };
        let elapsed_ms = started.elapsed().as_millis();

        info!(
            url = %url,
            is_valid = outcome.is_valid,
            is_automoto = outcome.is_automoto,
            new = outcome.new,
            used = outcome.used,
            test = outcome.test,
            elapsed_ms,
            proxy = ?current_proxy,
            "store visited"
        );

        // Basic mode never collects flag counts; persist only is_valid/
        // is_automoto so it can't overwrite a prior run's real counts or
        // fabricate a delta (see DESIGN.md's basic-mode persistence note).
        let persist_result = if mode == RunMode::Basic {
            storage
                .record_classification_only(url, outcome.is_valid, outcome.is_valid.then_some(outcome.is_automoto))
                .await
        } else {
            storage.record_outcome(url, &outcome).await
        };
        if let Err(e) = persist_result {
            warn!(url, error = %e, "storage write failed, aborting run");
            report.aborted = true;
            report.error = Some(e.to_string());
            break;
        }

        report.visited += 1;
        if outcome.is_valid {
            report.valid += 1;
            consecutive_invalid = 0;
        } else {
            consecutive_invalid += 1;
        }
        if outcome.is_automoto {
            report.automoto += 1;
        }
        report.new_total += outcome.new;
        report.used_total += outcome.used;
        report.test_total += outcome.test;

        if consecutive_invalid >= 3 {
            warn!("3 consecutive invalid visits, rebuilding driver");
            if let Some(supervisor) = tunnel.as_mut() {
                match supervisor.rotate().await {
                    Ok(()) => {
                        current_proxy = supervisor.current().await.map(|e| e.socks_addr());
                        match &current_proxy {
                            Some(addr) => {
                                if let Err(e) =
                                    rebuild_with_proxy(&mut driver, addr, config.general.display_num.clone()).await
                                {
                                    warn!(error = %e, "driver rebuild after rotation failed");
                                }
                            }
                            None => {
                                let _ = driver.rebuild().await;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "rotation exhausted all candidates, rebuilding direct");
                        current_proxy = None;
                        let _ = driver.rebuild().await;
                    }
                }
            } else {
                let _ = driver.rebuild().await;
            }
            consecutive_invalid = 0;
        }

        pacing.record_store_scraped();
    }

    if let Some(supervisor) = tunnel.as_mut() {
        supervisor.close_all();
    }

    info!(
        visited = report.visited,
        valid = report.valid,
        automoto = report.automoto,
        new_total = report.new_total,
        used_total = report.used_total,
        test_total = report.test_total,
        "run complete"
    );

    Ok(report)
}

async fn maybe_ingest_sitemap(config: &AppConfig, storage: &Storage) {
    let stale = storage
        .is_stale(config.sitemap.staleness_days)
        .await
        .unwrap_or(true);
    if !stale {
        info!("registry is fresh, skipping sitemap re-ingest");
        return;
    }

    info!(root = %config.sitemap.root_index_url, "registry stale or empty, re-ingesting sitemap");
    let walker = match SitemapWalker::new(
        Duration::from_secs(config.sitemap.fetch_timeout_seconds),
        &config.sitemap.retry_delays_seconds,
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, "failed to build sitemap client, continuing with known stores only");
            return;
        }
    };

    match walker.ingest(&config.sitemap.root_index_url, storage).await {
        Ok(report) => info!(
            discovered = report.discovered,
            inserted = report.inserted,
            skipped = report.skipped,
            "sitemap ingest complete"
        ),
        Err(e) => warn!(error = %e, "sitemap ingest failed, continuing with known stores only"),
    }
}

async fn build_tunnel_supervisor(config: &AppConfig) -> Option<TunnelSupervisor> {
    let Some(path) = &config.tunnel.config_path else {
        warn!("tunnel mode requested but no tunnel config_path set, continuing direct");
        return None;
    };

    let mut supervisor = match TunnelSupervisor::load(
        path,
        Duration::from_secs(config.tunnel.establish_timeout_seconds),
        Duration::from_secs(config.tunnel.probe_timeout_seconds),
    ) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to load tunnel config, continuing direct");
            return None;
        }
    };

    let Some(first) = supervisor.entry_names().into_iter().next() else {
        return None;
    };

    match supervisor.establish(&first).await {
        Ok(()) => Some(supervisor),
        Err(e) => {
            warn!(error = %e, "initial tunnel establish failed, continuing direct");
            None
        }
    }
}

async fn rebuild_with_proxy(
    driver: &mut HeadlessBrowserDriver,
    proxy_addr: &str,
    display_num: Option<String>,
) -> Result<(), scout_core::ScoutError> {
    *driver = HeadlessBrowserDriver::new(Some(proxy_addr.to_string()), display_num)?;
    Ok(())
}
