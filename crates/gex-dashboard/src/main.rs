//! gex-stream dashboard - entry point.
//!
//! Streams one option chain from the simulated feed and prints the gamma
//! exposure table on every redraw.

use anyhow::Result;
use clap::Parser;
use chrono::NaiveDate;
use gex_feed::SimulatedMarket;
use std::time::Duration;
use tracing::info;

/// Streaming gamma exposure dashboard
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via GEX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Underlying symbol, overriding the configuration
    #[arg(short, long)]
    symbol: Option<String>,

    /// Expiration date (YYYY-MM-DD), overriding the configuration
    #[arg(short, long)]
    expiry: Option<NaiveDate>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = gex_dashboard::AppConfig::load(args.config.as_deref())?;
    if let Some(symbol) = args.symbol {
        config.symbol = symbol;
    }
    if let Some(expiry) = args.expiry {
        config.expiry = Some(expiry);
    }
    config.validate()?;

    gex_telemetry::init_logging(Some(&config.telemetry.log_level))?;
    info!("Starting gex-dashboard v{}", env!("CARGO_PKG_VERSION"));
    info!(symbol = %config.symbol, spacing = %config.spacing, "Configuration loaded");

    let market = SimulatedMarket::new(&config.symbol.trim().to_uppercase(), config.feed.base_price)
        .with_drift(config.feed.drift);
    let app = gex_dashboard::Application::new(config, move || market.client());

    app.run(args.run_secs.map(Duration::from_secs)).await?;
    Ok(())
}
