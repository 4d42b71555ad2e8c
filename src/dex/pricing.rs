//! Constant-product price derivation from pool reserves

use alloy::primitives::U256;
use crate::{
    errors::{BotError, BotResult},
    types::{DexPrices, FixedPoint, MAX_SCALE, NATIVE_SCALE, PRICE_SCALE},
    utils::pow10_u256,
};

/// Derive both pool prices from the token reserve `R_t` and native reserve `R_n`.
///
/// * native in token units: `R_t * 10^18 / R_n`, at the token's decimals, truncated to [`PRICE_SCALE`]
/// * token in native units: `R_n * 10^token_decimals / R_t`, in wei
pub fn derive_prices(
    token_reserve: U256,
    native_reserve: U256,
    token_decimals: u32,
    block_number: Option<u64>,
) -> BotResult<DexPrices> {
    check_token_decimals(token_decimals)?;
    if token_reserve.is_zero() || native_reserve.is_zero() {
        return Err(BotError::Configuration(format!(
            "pool has zero reserves (token={}, native={})",
            token_reserve, native_reserve
        )));
    }

    let native_in_token = mul_div(token_reserve, pow10_u256(NATIVE_SCALE), native_reserve)?;
    let token_in_native = mul_div(native_reserve, pow10_u256(token_decimals), token_reserve)?;

    Ok(DexPrices {
        native_in_token_units: FixedPoint::from_raw(to_i128(native_in_token)?, token_decimals)
            .rescale(PRICE_SCALE)?,
        token_in_native_units: FixedPoint::from_raw(to_i128(token_in_native)?, NATIVE_SCALE),
        block_number,
    })
}

/// Token decimals beyond what a fixed-point amount can carry are a setup error.
pub fn check_token_decimals(token_decimals: u32) -> BotResult<u32> {
    if token_decimals > MAX_SCALE {
        return Err(BotError::Configuration(format!(
            "token decimals {} exceed the supported maximum of {}",
            token_decimals, MAX_SCALE
        )));
    }
    Ok(token_decimals)
}

fn mul_div(value: U256, factor: U256, divisor: U256) -> BotResult<U256> {
    value
        .checked_mul(factor)
        .map(|product| product / divisor)
        .ok_or_else(|| BotError::Arithmetic(format!("overflow computing {} * {} / {}", value, factor, divisor)))
}

fn to_i128(value: U256) -> BotResult<i128> {
    u128::try_from(value)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(|| BotError::Arithmetic(format!("{} does not fit a fixed-point amount", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(whole: u64, decimals: u32) -> U256 {
        U256::from(whole) * pow10_u256(decimals)
    }

    #[test]
    fn prices_six_decimal_token_pool() {
        // 30,000,000 USDT against 10,000 ETH.
        let prices = derive_prices(units(30_000_000, 6), units(10_000, 18), 6, Some(7)).unwrap();
        assert_eq!(prices.native_in_token_units, FixedPoint::from_raw(3_000_000_000, PRICE_SCALE));
        // 1 USDT = 1/3000 ETH, truncated in wei.
        assert_eq!(
            prices.token_in_native_units,
            FixedPoint::from_raw(333_333_333_333_333, NATIVE_SCALE)
        );
        assert_eq!(prices.block_number, Some(7));
    }

    #[test]
    fn eighteen_decimal_token_is_brought_to_price_scale() {
        let prices = derive_prices(units(30_000_000, 18), units(10_000, 18), 18, None).unwrap();
        assert_eq!(prices.native_in_token_units, FixedPoint::from_raw(3_000_000_000, PRICE_SCALE));
        assert_eq!(
            prices.token_in_native_units,
            FixedPoint::from_raw(333_333_333_333_333, NATIVE_SCALE)
        );
    }

    #[test]
    fn zero_reserves_are_fatal() {
        let err = derive_prices(U256::ZERO, units(1, 18), 6, None).unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
        let err = derive_prices(units(1, 6), U256::ZERO, 6, None).unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
    }

    #[test]
    fn oversized_token_decimals_are_rejected() {
        for decimals in [39, 45, u32::MAX] {
            let err = derive_prices(units(1, 6), units(1, 18), decimals, None).unwrap_err();
            assert!(matches!(err, BotError::Configuration(_)), "{}: {:?}", decimals, err);
        }
        assert_eq!(check_token_decimals(38).unwrap(), 38);
        assert_eq!(check_token_decimals(0).unwrap(), 0);
    }

    #[test]
    fn both_views_move_together() {
        let before = derive_prices(units(30_000_000, 6), units(10_000, 18), 6, Some(1)).unwrap();
        let after = derive_prices(units(29_000_000, 6), units(10_400, 18), 6, Some(2)).unwrap();
        assert!(after.native_in_token_units < before.native_in_token_units);
        assert!(after.token_in_native_units > before.token_in_native_units);
    }
}
