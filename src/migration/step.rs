// Step contract: one named, ordered unit of externally-visible work.

use async_trait::async_trait;
use thiserror::Error;

use crate::chain::ChainError;
use crate::store::StoreError;
use crate::token::{StepName, Token, TokenPatch};

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The entity is missing a field a later step depends on; usually a
    /// sign of manual intervention or a partially reset record.
    #[error("token {mint} is missing required field `{field}`")]
    MissingField { mint: String, field: &'static str },

    #[error("withdrawn reserves too small: have {have} lamports, need {need}")]
    InsufficientReserves { have: u64, need: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// What a committed step hands back: the transaction that proves it, and a
/// typed patch of entity fields to merge.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    pub tx_id: String,
    pub patch: TokenPatch,
}

impl StepResult {
    pub fn new(tx_id: impl Into<String>) -> Self {
        StepResult {
            tx_id: tx_id.into(),
            patch: TokenPatch::default(),
        }
    }

    pub fn with_patch(tx_id: impl Into<String>, patch: TokenPatch) -> Self {
        StepResult {
            tx_id: tx_id.into(),
            patch,
        }
    }
}

/// A migration step. Implementations are thin adapters over the chain
/// collaborators and must be safe to re-invoke after a crash: check
/// externally observable state before re-submitting anything irreversible.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    fn name(&self) -> StepName;

    /// Event published to the token's room after the step commits, if any.
    fn event_name(&self) -> Option<&'static str> {
        None
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError>;
}
