//! Network providers, retries and reconnect backoff

pub mod providers;
pub mod retry;

pub use providers::*;
pub use retry::*;
