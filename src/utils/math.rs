//! Mathematical utility functions

use alloy::primitives::U256;

/// `10^n` as `i128`; valid for `n <= 38`.
pub const fn pow10_i128(n: u32) -> i128 {
    10i128.pow(n)
}

pub fn pow10_u256(n: u32) -> U256 {
    U256::from(10u64).pow(U256::from(n))
}
