// AMM-side collaborator: pool creation, pool state lookup, liquidity
// locking, and custody-NFT vault deposit.

use async_trait::async_trait;

use super::ChainError;
use crate::token::{Mint, PoolAddresses};

/// A freshly created pool and the transaction that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPool {
    pub tx_id: String,
    pub addresses: PoolAddresses,
}

/// Observable state of an existing pool, as needed for liquidity locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub pool_id: String,
    pub lp_mint: String,
    /// LP token balance held by the orchestrator wallet for this pool.
    pub lp_balance: u64,
}

/// One committed liquidity lock and the custody NFT it minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityLock {
    pub tx_id: String,
    pub nft_mint: String,
}

#[async_trait]
pub trait AmmClient: Send + Sync {
    /// Create a pool pairing `mint` with the native asset, seeded with the
    /// given amounts. Must detect an already-existing pool for the pair and
    /// fail rather than double-seed it.
    async fn create_pool(
        &self,
        mint: &Mint,
        token_amount: u64,
        lamport_amount: u64,
    ) -> Result<CreatedPool, ChainError>;

    /// Look up a pool by id. A pool created moments ago may not be visible
    /// yet; callers poll with backoff.
    async fn fetch_pool(&self, pool_id: &str) -> Result<PoolState, ChainError>;

    /// Lock `lp_amount` LP tokens of `pool`, minting a custody NFT that
    /// represents the locked share.
    async fn lock_liquidity(
        &self,
        pool: &PoolState,
        lp_amount: u64,
    ) -> Result<LiquidityLock, ChainError>;

    /// Deposit a custody NFT into the protocol vault with `claimer` as the
    /// fee-claim authority. Returns the tx signature.
    async fn deposit_to_vault(&self, nft_mint: &str, claimer: &str) -> Result<String, ChainError>;
}
