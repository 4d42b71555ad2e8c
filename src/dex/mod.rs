//! Decentralized exchange pool price feed

pub mod reader;
pub mod pricing;
pub mod stream;

pub use reader::*;
pub use pricing::*;
pub use stream::*;
