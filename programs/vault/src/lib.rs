//! Leverage vault program
//!
//! Share accounting over a leveraged collateral/debt position, kept inside a
//! leverage band by flash-loan-funded rebalances. Logic is stateless; all
//! persistent state lives in `VaultStorage`, which the proxy owns and lends
//! to whichever logic version is active.

pub mod config;
pub mod logic;
pub mod storage;
pub mod vault;

pub use config::*;
pub use logic::*;
pub use storage::*;
pub use vault::*;
