//! Dual-feed arbitrage monitor - Main Entry Point

use dual_feed_arb::*;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    let _logging_guard = utils::setup_logging()?;

    // Load configuration
    let config = CONFIG.clone();

    info!("🛰️  Dual-feed arbitrage monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration:");
    info!("   Market: {}", config.market_symbol);
    info!("   Depth stream: {} ({} ms updates)", config.cex_ws_url, config.depth_update_speed_ms);
    info!("   Watchdog timeout: {} ms", config.watchdog_timeout_ms);
    info!("   Token decimals: {}", config.token_decimals);
    info!("   Gas station: {} (refresh every {} ms)", config.gas_station_url, config.gas_ttl_ms);
    info!("   Percentage diff target: {}%", config.percentage_diff_target);

    // Setup network providers
    let provider = network::setup_provider(&config).await?;

    let cex_stream = Arc::new(cex::CexDepthStream::new(
        cex::BinanceVenue::from_config(&config)?,
        config.watchdog_timeout(),
    ));
    let dex_stream = Arc::new(dex::DexPriceStream::new(
        dex::AlloyPoolReader::from_config(provider.clone(), &config)?,
        config.token_decimals,
    )?);
    let gas_cache = Arc::new(gas::GasPriceCache::new(
        Arc::new(gas::GasStation::new(&config.gas_station_url)?),
        config.gas_ttl(),
    ));

    let engine = arbitrage::ArbitrageEngine::new(
        cex_stream,
        dex_stream,
        gas_cache,
        config.percentage_diff_target,
    )?;

    let mut opportunities = match engine.run().await {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to start arbitrage engine: {}", e);
            engine.end();
            return Err(e.into());
        }
    };

    info!("\n🚀 Watching both venues, press Ctrl+C to stop...\n");

    loop {
        tokio::select! {
            opportunity = opportunities.recv() => match opportunity {
                Some(opportunity) => {
                    info!(
                        id = %opportunity.id,
                        direction = %opportunity.direction,
                        diff = %opportunity.percentage_diff,
                        "opportunity forwarded"
                    );
                }
                None => {
                    error!("Opportunity channel closed unexpectedly");
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("\n📛 Received shutdown signal (Ctrl+C)...");
                break;
            }
        }
    }

    engine.end();
    engine.join().await;

    // Print final statistics
    utils::print_session_stats(&engine.stats());

    Ok(())
}
