//! Stock price monitoring engine.
//!
//! This crate contains the polling loop, the per-ticker threshold state
//! machine and the control handle the surrounding application talks to.

pub mod error;
pub mod handle;
pub mod monitor;
pub mod status;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use error::*;
pub use handle::*;
pub use monitor::*;
pub use status::*;
pub use tracker::*;
