//! Spread evaluation and the decision engine

pub mod calculator;
pub mod engine;

pub use calculator::*;
pub use engine::*;
