//! Protocol error taxonomy

use crate::types::Address;
use model_safety::{LeverageError, MathError, ShareError};
use thiserror::Error;

/// Every failure a top-level call can abort with
///
/// The host rolls back all effects of a call that returns any of these, so
/// callers always observe either the full operation or none of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("not initialized")]
    NotInitialized,
    #[error("caller is not the admin")]
    Unauthorized,
    #[error("caller is not an authorized vault")]
    UnauthorizedCaller,
    #[error("invalid leverage bounds")]
    InvalidBounds,
    #[error("deposit would exceed vault capacity")]
    CapacityExceeded,
    #[error("insufficient shares")]
    InsufficientShares,
    #[error("withdrawal would leave the position outside its leverage band")]
    WithdrawBreaksInvariant,
    #[error("leverage {leverage} outside band [{lower}, {upper}]")]
    LeverageOutOfBounds { leverage: u128, lower: u128, upper: u128 },
    #[error("no trade path registered for {token_in} -> {token_out}")]
    RouteNotFound { token_in: Address, token_out: Address },
    #[error("invalid trade path")]
    InvalidPath,
    #[error("flash loan repayment shortfall: required {required}, available {available}")]
    RepaymentShortfall { required: u128, available: u128 },
    #[error("reentrant call")]
    Reentrancy,
    #[error("storage layout mismatch: expected {expected}, found {found}")]
    StorageLayoutMismatch { expected: u16, found: u16 },
    #[error("amount is zero")]
    ZeroAmount,
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("unknown token {0}")]
    UnknownToken(Address),
    #[error("unknown vault {0}")]
    UnknownVault(Address),
    #[error("no price for {0}")]
    PriceUnavailable(Address),
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    #[error("health factor below 1")]
    HealthFactorTooLow,
    #[error("output below minimum")]
    SlippageExceeded,
    #[error("no pool for pair")]
    PoolNotFound,
    #[error("flash loan not repaid")]
    FlashLoanNotRepaid,
    #[error("position is insolvent")]
    Insolvent,
    #[error("adapter has no rewards configuration")]
    RewardsNotConfigured,
    #[error("collaborator does not match configuration")]
    CollaboratorMismatch,
}

pub type Result<T, E = ProtocolError> = core::result::Result<T, E>;

impl From<MathError> for ProtocolError {
    fn from(_: MathError) -> Self {
        ProtocolError::MathOverflow
    }
}

impl From<LeverageError> for ProtocolError {
    fn from(e: LeverageError) -> Self {
        match e {
            LeverageError::Insolvent => ProtocolError::Insolvent,
            LeverageError::InvalidBounds => ProtocolError::InvalidBounds,
            LeverageError::Math(m) => m.into(),
        }
    }
}

impl From<ShareError> for ProtocolError {
    fn from(e: ShareError) -> Self {
        match e {
            ShareError::ZeroAmount => ProtocolError::ZeroAmount,
            ShareError::InsufficientShares => ProtocolError::InsufficientShares,
            ShareError::Insolvent => ProtocolError::Insolvent,
            ShareError::InvalidFee => ProtocolError::InvalidBounds,
            ShareError::Math(m) => m.into(),
        }
    }
}
