//! Centralized exchange market-depth feed

pub mod transport;
pub mod binance;
pub mod stream;

pub use transport::*;
pub use binance::*;
pub use stream::*;
