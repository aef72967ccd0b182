// External transaction collaborators.
//
// The engine never talks to the ledger or the AMM SDK directly; it drives
// these trait boundaries. Every call here is a suspension point and may be
// repeated after a crash, so implementations must tolerate re-invocation.

pub mod amm;
pub mod ledger;
pub mod mocks;

use thiserror::Error;

pub use amm::{AmmClient, CreatedPool, LiquidityLock, PoolState};
pub use ledger::{verify_despite_error, LedgerClient, WithdrawOutcome, SUCCESS_LOG_MARKER};

#[derive(Debug, Error)]
pub enum ChainError {
    /// Transient RPC failure (timeout, rate limit, node unavailability).
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The transaction was submitted but confirmation reported an error.
    #[error("confirmation failed for {signature}: {reason}")]
    Confirmation { signature: String, reason: String },

    /// Confirmation reported an error code known to sometimes accompany a
    /// transaction that actually succeeded. Callers re-fetch the recorded
    /// effects before treating this as a failure.
    #[error("ambiguous confirmation for {signature}: {code}")]
    AmbiguousConfirmation { signature: String, code: String },

    #[error("pool not found: {pool_id}")]
    PoolNotFound { pool_id: String },

    #[error("no LP balance held for pool {pool_id}")]
    NoLpBalance { pool_id: String },
}
