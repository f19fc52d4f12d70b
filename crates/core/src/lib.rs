//! Core data types for the stock watch engine.

pub mod error;
pub mod quote;
pub mod store;
pub mod ticker;
pub mod watch;

pub use error::*;
pub use quote::*;
pub use store::*;
pub use ticker::*;
pub use watch::*;
