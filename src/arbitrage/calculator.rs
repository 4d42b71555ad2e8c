//! Percentage spread between the two venues

use rust_decimal::Decimal;
use crate::{
    errors::{BotError, BotResult},
    types::{ArbitrageSnapshot, Direction, FixedPoint, PERCENT_SCALE},
    utils::pow10_i128,
};

/// `(cex − dex) * 100 * 10^PERCENT_SCALE / dex`, truncated toward zero.
///
/// With `PERCENT_SCALE = 6` the multiplier is `10^8` and the result is in
/// percent units: `-5_000_000` means the CEX price is 5.000000% below the DEX.
pub fn percentage_diff(cex_price: &FixedPoint, dex_price: &FixedPoint) -> BotResult<FixedPoint> {
    if dex_price.is_zero() {
        return Err(BotError::Arithmetic("DEX price is zero".to_string()));
    }
    let diff = cex_price.checked_sub(dex_price)?;
    let scaled = diff
        .raw()
        .checked_mul(100 * pow10_i128(PERCENT_SCALE))
        .ok_or_else(|| BotError::Arithmetic(format!("overflow scaling spread {}", diff)))?;
    Ok(FixedPoint::from_raw(scaled / dex_price.raw(), PERCENT_SCALE))
}

/// Convert a configured percentage (e.g. `5` for 5%) to a strictly positive threshold.
pub fn threshold_from_percent(percent: Decimal) -> BotResult<FixedPoint> {
    if percent <= Decimal::ZERO {
        return Err(BotError::Configuration(format!(
            "percentage diff target must be greater than 0, got {}",
            percent
        )));
    }
    FixedPoint::from_decimal(percent, PERCENT_SCALE)
        .map_err(|e| BotError::Configuration(format!("unusable percentage diff target: {}", e)))
}

/// A direction whose spread crossed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadSignal {
    pub direction: Direction,
    pub percentage_diff: FixedPoint,
    pub cex_price: FixedPoint,
    pub dex_price: FixedPoint,
}

/// Check both directions; boundaries are inclusive.
///
/// A side with no known CEX quote, or a missing DEX price, is skipped.
pub fn evaluate(snapshot: &ArbitrageSnapshot, threshold: &FixedPoint) -> BotResult<Vec<SpreadSignal>> {
    let Some(dex) = snapshot.dex_price else {
        return Ok(Vec::new());
    };
    let dex_price = dex.native_in_token_units;
    let mut signals = Vec::new();

    if let Some(ask) = snapshot.cex_lowest_ask {
        let diff = percentage_diff(&ask, &dex_price)?;
        if diff.raw() <= -threshold.raw() {
            signals.push(SpreadSignal {
                direction: Direction::BuyCexSellDex,
                percentage_diff: diff,
                cex_price: ask,
                dex_price,
            });
        }
    }

    if let Some(bid) = snapshot.cex_highest_bid {
        let diff = percentage_diff(&bid, &dex_price)?;
        if diff.raw() >= threshold.raw() {
            signals.push(SpreadSignal {
                direction: Direction::BuyDexSellCex,
                percentage_diff: diff,
                cex_price: bid,
                dex_price,
            });
        }
    }

    Ok(signals)
}
