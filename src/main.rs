mod cli;
mod orchestrator;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

// Use mimalloc to prevent memory bloat across a long-running multi-hour run.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use scout_core::AppConfig;

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, falling back to built-in defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    apply_env_overrides(&mut config);

    let cancel = tokio_util::sync::CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, finishing the in-flight store then stopping");
            cancel_for_signal.cancel();
        }
    });

    match orchestrator::run(config, &cli, cancel).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.aborted {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("run failed: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Environment overrides layered on top of the config file — these exist
/// so the same config file can be reused across environments without
/// editing it (container deploys, local smoke runs).
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = std::env::var("DATABASE_PATH") {
        config.database.database_path = v;
    }
    if let Ok(v) = std::env::var("SITEMAP_INDEX_URL") {
        config.sitemap.root_index_url = v;
    }
    if let Ok(v) = std::env::var("BASE_URL") {
        config.general.base_url = v;
    }
    if let Ok(v) = std::env::var("TARGET_CATEGORY_ID") {
        if let Ok(id) = v.parse::<u64>() {
            config.general.target_category_id = id;
        }
    }
    if let Ok(v) = std::env::var("DISPLAY_NUM") {
        config.general.display_num = Some(v);
    }
    if let Ok(v) = std::env::var("TELEMETRY_DSN") {
        // Stored for downstream tooling; this binary never dials it.
        config.general.telemetry_dsn = Some(v);
    }
}
