//! Price sources for watched tickers.
//!
//! ## Architecture
//!
//! - `source` - the `PriceSource` trait the monitor polls
//! - `yahoo` - REST source backed by the Yahoo Finance chart API
//! - `simulated` - offline oscillating prices for demos
//! - `scripted` - pre-recorded outcomes for tests

pub mod error;
pub mod scripted;
pub mod simulated;
pub mod source;
pub mod yahoo;

pub use error::*;
pub use scripted::*;
pub use simulated::*;
pub use source::*;
pub use yahoo::*;
