//! Flashloan adapter program
//!
//! Executes one atomic borrow -> swap -> repay cycle on behalf of an
//! authorized vault, routing swaps along admin-registered trade paths.

pub mod adapter;
pub mod cycle;
pub mod registry;

pub use adapter::*;
pub use cycle::{Direction, FlashloanContext, FlashloanReport, FlashloanRequest};
pub use registry::*;
