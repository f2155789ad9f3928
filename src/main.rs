//! SUREBET — cross-bookie arbitrage pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the configured bookies and runs the detection-and-execution
//! pipeline until Ctrl+C.

use anyhow::Result;
use tracing::{info, warn};

use surebet::arbitrage::SurebetBuilder;
use surebet::config;
use surebet::engine::pipeline::Pipeline;
use surebet::matching::TitleMatcher;

const BANNER: &str = r#"
 ____  _   _ ____  _____ ____  _____ _____
/ ___|| | | |  _ \| ____| __ )| ____|_   _|
\___ \| | | | |_) |  _| |  _ \|  _|   | |
 ___) | |_| |  _ <| |___| |_) | |___  | |
|____/ \___/|_| \_\_____|____/|_____| |_|

  Cross-bookie arbitrage pipeline
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = config::AppConfig::load(&path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %path,
        bookies = cfg.bookies.len(),
        ways = cfg.pipeline.ways,
        interval_ms = cfg.pipeline.interval_ms,
        streak_threshold = cfg.pipeline.streak_threshold,
        stake = %format!("{} {}", cfg.stake.amount, cfg.stake.currency),
        "SUREBET starting up"
    );

    // -- Initialise components -------------------------------------------

    let bookies = cfg.build_bookies()?;
    for bookie in &bookies {
        info!(bookie = bookie.name(), authenticated = bookie.is_authenticated(), "Bookie ready");
    }

    let matcher = TitleMatcher::new(cfg.pipeline.ways, cfg.pipeline.match_threshold);
    let builder = SurebetBuilder::new(cfg.builder_config());

    let (pipeline, handle) = Pipeline::new(
        bookies,
        Box::new(matcher),
        Box::new(builder),
        cfg.pipeline_config(),
        cfg.bans.clone(),
    );
    if pipeline.is_watch_only() {
        warn!("Watch-only: opportunities will be logged, never executed");
    }

    // -- Main loop -------------------------------------------------------

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
            shutdown.close();
        }
    });

    info!("Entering main loop. Press Ctrl+C to stop.");
    let banned = pipeline.run().await;

    let listed: Vec<String> = banned.iter().map(|l| l.to_string()).collect();
    let status = handle.status();
    info!(
        cycles = status.cycles,
        banned = ?listed,
        "SUREBET shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("surebet=info"));

    let json_logging = std::env::var("SUREBET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
