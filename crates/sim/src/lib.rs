//! In-process venues and host for the leverage programs
//!
//! A lending pool, a constant-product exchange router and an incentives
//! controller implementing the `adapter-core` collaborator traits, plus a
//! transactional host (`Chain`) that commits a call's effects only when the
//! call succeeds.

pub mod chain;
pub mod deploy;
pub mod dex;
pub mod incentives;
pub mod lending;

pub use chain::*;
pub use deploy::*;
pub use dex::*;
pub use incentives::*;
pub use lending::*;
