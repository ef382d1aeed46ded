//! Upgradeable proxy program
//!
//! The proxy owns the vault's storage and identity; the logic it forwards to
//! can be swapped by the admin without moving either.

pub mod dispatch;
pub mod proxy;

pub use dispatch::*;
pub use proxy::*;
