//! Integer fixed-point amounts
//!
//! Every price and percentage in the decision path is an `i128` scaled by
//! `10^scale`. Division truncates toward zero, the same as integer division.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use crate::errors::{BotError, BotResult};
use crate::utils::pow10_i128;

/// Scale of CEX quotes and the token-denominated DEX price (stable asset smallest unit).
pub const PRICE_SCALE: u32 = 6;
/// Scale of the native asset (wei).
pub const NATIVE_SCALE: u32 = 18;
/// Percentages are expressed in percent units with this many decimals: 5_000_000 == 5.000000%.
pub const PERCENT_SCALE: u32 = 6;
/// Largest scale whose unit `10^scale` fits an `i128`.
pub const MAX_SCALE: u32 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FixedPoint {
    raw: i128,
    scale: u32,
}

impl FixedPoint {
    pub const fn from_raw(raw: i128, scale: u32) -> Self {
        Self { raw, scale }
    }

    pub const fn zero(scale: u32) -> Self {
        Self { raw: 0, scale }
    }

    pub const fn raw(&self) -> i128 {
        self.raw
    }

    pub const fn scale(&self) -> u32 {
        self.scale
    }

    pub const fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Parse a decimal string such as `"2849.999999"` into `scale` decimals.
    ///
    /// More fractional digits than `scale` is an error rather than a silent
    /// rounding, so a quote can never drift from what the venue sent.
    pub fn parse(value: &str, scale: u32) -> BotResult<Self> {
        let decimal = Decimal::from_str(value.trim())
            .map_err(|e| BotError::parsing(format!("invalid decimal '{}'", value), e))?;
        Self::from_decimal(decimal, scale)
    }

    pub fn from_decimal(decimal: Decimal, scale: u32) -> BotResult<Self> {
        // Trailing zeros beyond the scale are harmless.
        let decimal = if decimal.scale() > scale { decimal.normalize() } else { decimal };
        if decimal.scale() > scale {
            return Err(BotError::Arithmetic(format!(
                "{} has more than {} fractional digits",
                decimal, scale
            )));
        }
        Self::from_raw(decimal.mantissa(), decimal.scale()).rescale(scale)
    }

    /// Conversion for display and logging; saturates outside `Decimal` range.
    pub fn to_decimal(&self) -> Decimal {
        let (raw, scale) = if self.scale > 28 {
            // Past 10^38 the magnitude is below Decimal's smallest unit.
            (10i128.checked_pow(self.scale - 28).map_or(0, |unit| self.raw / unit), 28)
        } else {
            (self.raw, self.scale)
        };
        Decimal::try_from_i128_with_scale(raw, scale)
            .unwrap_or(if raw < 0 { Decimal::MIN } else { Decimal::MAX })
    }

    /// Change the scale; narrowing truncates toward zero.
    pub fn rescale(&self, scale: u32) -> BotResult<Self> {
        if scale.max(self.scale) > MAX_SCALE {
            return Err(BotError::Arithmetic(format!(
                "cannot rescale from {} to {} decimals, limit is {}",
                self.scale, scale, MAX_SCALE
            )));
        }
        match scale.cmp(&self.scale) {
            Ordering::Equal => Ok(*self),
            Ordering::Greater => {
                let factor = pow10_i128(scale - self.scale);
                self.raw
                    .checked_mul(factor)
                    .map(|raw| Self::from_raw(raw, scale))
                    .ok_or_else(|| BotError::Arithmetic(format!("overflow rescaling {} to {}", self, scale)))
            }
            Ordering::Less => Ok(Self::from_raw(self.raw / pow10_i128(self.scale - scale), scale)),
        }
    }

    pub fn checked_add(&self, other: &Self) -> BotResult<Self> {
        self.same_scale(other, "add")?;
        self.raw
            .checked_add(other.raw)
            .map(|raw| Self::from_raw(raw, self.scale))
            .ok_or_else(|| BotError::Arithmetic(format!("overflow adding {} and {}", self, other)))
    }

    pub fn checked_sub(&self, other: &Self) -> BotResult<Self> {
        self.same_scale(other, "subtract")?;
        self.raw
            .checked_sub(other.raw)
            .map(|raw| Self::from_raw(raw, self.scale))
            .ok_or_else(|| BotError::Arithmetic(format!("overflow subtracting {} from {}", other, self)))
    }

    pub fn checked_div_int(&self, divisor: i128) -> BotResult<Self> {
        if divisor == 0 {
            return Err(BotError::Arithmetic(format!("division of {} by zero", self)));
        }
        Ok(Self::from_raw(self.raw / divisor, self.scale))
    }

    fn same_scale(&self, other: &Self, op: &str) -> BotResult<()> {
        if self.scale != other.scale {
            return Err(BotError::Arithmetic(format!(
                "cannot {} amounts with scales {} and {}",
                op, self.scale, other.scale
            )));
        }
        Ok(())
    }
}

impl PartialOrd for FixedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.scale == other.scale {
            Some(self.raw.cmp(&other.raw))
        } else {
            None
        }
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.raw < 0 { "-" } else { "" };
        let abs = self.raw.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{}{}", sign, abs);
        }
        let Some(base) = 10u128.checked_pow(self.scale) else {
            return write!(f, "{}e-{}", self.raw, self.scale);
        };
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / base,
            abs % base,
            width = self.scale as usize
        )
    }
}
