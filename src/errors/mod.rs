//! Error types shared by the feeds, the gas cache and the engine

pub mod bot_error;

pub use bot_error::*;
