//! Network fee estimation

pub mod station;
pub mod cache;

pub use station::*;
pub use cache::*;
