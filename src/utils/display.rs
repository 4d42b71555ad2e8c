//! Display and printing utilities

use alloy::primitives::U256;
use rust_decimal::Decimal;
use tracing::{info, warn};
use crate::{
    types::{EngineStats, FixedPoint, Opportunity, NATIVE_SCALE},
    utils::pow10_u256,
};

pub fn print_opportunity(opportunity: &Opportunity) {
    warn!("\n🎯 ARBITRAGE OPPORTUNITY #{}", opportunity.id);
    warn!("📋 Strategy: {}", opportunity.direction);
    warn!("💰 Spread Analysis:");
    warn!("   DEX Price: ${}", opportunity.dex_price.to_decimal());
    warn!("   CEX Price: ${}", opportunity.cex_price.to_decimal());
    warn!("   Difference: {}%", opportunity.percentage_diff.to_decimal());
    warn!("⛽ Fastest gas: {} gwei", wei_to_gwei(opportunity.gas_price_wei));
    warn!("🚫 Detection only, no trade placed");
}

pub fn print_session_stats(stats: &EngineStats) {
    info!("\n📊 Session Statistics");
    info!("   CEX updates processed: {}", stats.cex_updates);
    info!("   DEX updates processed: {}", stats.dex_updates);
    info!("   Opportunities signalled: {}", stats.opportunities);
}

/// Gwei rendering of a wei amount; saturates on absurd values.
pub fn wei_to_gwei(wei: U256) -> Decimal {
    let gwei_unit = pow10_u256(NATIVE_SCALE - 9);
    let whole = wei / gwei_unit;
    let frac = wei % gwei_unit;
    match (u128::try_from(whole), u128::try_from(frac)) {
        (Ok(whole), Ok(frac)) => {
            let whole = FixedPoint::from_raw(whole as i128, 0).to_decimal();
            whole + FixedPoint::from_raw(frac as i128, 9).to_decimal()
        }
        _ => Decimal::MAX,
    }
}
