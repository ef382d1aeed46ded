//! Vault configuration

use dango_common::{Address, ProtocolError, Result, WAD};
use model_safety::Band;

/// Default target leverage (2.0x)
pub const DEFAULT_TARGET_LEVER_RATIO: u128 = 2 * WAD;
/// Default lower bound (1.7x)
pub const DEFAULT_LOWER_LEVER_RATIO: u128 = 17 * WAD / 10;
/// Default upper bound (2.3x)
pub const DEFAULT_UPPER_LEVER_RATIO: u128 = 23 * WAD / 10;
/// Default capacity: 100 collateral tokens of equity
pub const DEFAULT_CAPACITY: u128 = 100 * WAD;

/// Logic-level parameters, fixed for the lifetime of a logic version
///
/// The bounds here are the envelope the operative band chosen at
/// initialization must fit inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    pub addresses_provider: Address,
    pub data_provider: Address,
    pub collateral_token: Address,
    pub debt_token: Address,
    pub target_lever_ratio: u128,
    pub lower_lever_ratio: u128,
    pub upper_lever_ratio: u128,
}

impl VaultConfig {
    /// Validated config; requires `1 < lower <= target <= upper`
    pub fn new(
        addresses_provider: Address,
        data_provider: Address,
        collateral_token: Address,
        debt_token: Address,
        target_lever_ratio: u128,
        lower_lever_ratio: u128,
        upper_lever_ratio: u128,
    ) -> Result<Self> {
        let config = Self {
            addresses_provider,
            data_provider,
            collateral_token,
            debt_token,
            target_lever_ratio,
            lower_lever_ratio,
            upper_lever_ratio,
        };
        config.envelope()?;
        if collateral_token == debt_token {
            return Err(ProtocolError::CollaboratorMismatch);
        }
        Ok(config)
    }

    /// The constructor band
    pub fn envelope(&self) -> Result<Band> {
        if self.lower_lever_ratio <= WAD {
            return Err(ProtocolError::InvalidBounds);
        }
        Ok(Band::new(self.lower_lever_ratio, self.target_lever_ratio, self.upper_lever_ratio)?)
    }
}

/// Arguments of `initialize`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub name: String,
    pub symbol: String,
    pub flashloan_adapter: Address,
    pub fee_recipient: Address,
    /// Operative lower bound (WAD)
    pub lower_bound: u128,
    /// Operative upper bound (WAD)
    pub upper_bound: u128,
    /// Maximum position value, WAD collateral units
    pub capacity: u128,
}
