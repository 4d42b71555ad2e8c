//! Core data types and structures

pub mod amount;
pub mod quotes;
pub mod gas;
pub mod arbitrage;

pub use amount::*;
pub use quotes::*;
pub use gas::*;
pub use arbitrage::*;
