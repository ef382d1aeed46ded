//! Shared types for the Dango leverage programs
//!
//! Addresses, the protocol error taxonomy, WAD math wrappers and the token
//! ledger every simulated collaborator settles against.

pub mod error;
pub mod ledger;
pub mod math;
pub mod types;

pub use error::*;
pub use ledger::*;
pub use math::*;
pub use types::*;
