// Concrete migration steps. Each is a thin adapter over the chain
// collaborators; the executor owns retries, persistence, and events.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::step::{MigrationStep, StepError, StepResult};
use crate::chain::{verify_despite_error, AmmClient, ChainError, LedgerClient, PoolState};
use crate::config::PoolConfig;
use crate::retry::retry_with_backoff;
use crate::store::{FeeRecord, TokenStore};
use crate::token::{StepName, Token, TokenPatch, WithdrawnAmounts};

/// Literal tx id recorded for steps that commit nothing on chain.
pub const FINALIZED_TX_ID: &str = "finalized";
pub const NO_FEE_TX_ID: &str = "no_fee";

const POOL_LOOKUP_ATTEMPTS: u32 = 5;
const POOL_LOOKUP_BASE_DELAY: Duration = Duration::from_millis(500);

fn missing(token: &Token, field: &'static str) -> StepError {
    StepError::MissingField {
        mint: token.mint.to_string(),
        field,
    }
}

/// Parse the withdrawn lamport and token amounts out of the program logs of
/// a committed withdraw transaction.
pub fn parse_withdraw_logs(logs: &[String]) -> WithdrawnAmounts {
    fn amount_after(logs: &[String], marker: &str) -> Option<u64> {
        logs.iter().find_map(|line| {
            let (_, rest) = line.split_once(marker)?;
            rest.trim().parse().ok()
        })
    }

    WithdrawnAmounts {
        sol: amount_after(logs, "withdraw lamports:").unwrap_or_default(),
        tokens: amount_after(logs, "withdraw token:").unwrap_or_default(),
    }
}

/// Pull the curve reserves into the orchestrator wallet.
pub struct WithdrawStep {
    ledger: Arc<dyn LedgerClient>,
}

impl WithdrawStep {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        WithdrawStep { ledger }
    }
}

#[async_trait]
impl MigrationStep for WithdrawStep {
    fn name(&self) -> StepName {
        StepName::Withdraw
    }

    fn event_name(&self) -> Option<&'static str> {
        Some("migrationStarted")
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        let outcome = match self.ledger.withdraw_reserves(&token.mint).await {
            Ok(outcome) => outcome,
            // Confirmation sometimes reports failure for a transaction that
            // actually landed; trust the recorded logs over the error.
            Err(err) => verify_despite_error(self.ledger.as_ref(), err).await?,
        };

        let amounts = parse_withdraw_logs(&outcome.logs);
        info!(
            mint = %token.mint,
            signature = %outcome.signature,
            lamports = amounts.sol,
            tokens = amounts.tokens,
            "Withdrew curve reserves"
        );

        let patch = TokenPatch {
            withdrawn_amounts: Some(amounts),
            withdrawn_at: Some(Utc::now()),
            ..Default::default()
        };
        Ok(StepResult::with_patch(outcome.signature, patch))
    }
}

/// Create the AMM pool, seeded with the withdrawn reserves minus the
/// protocol fee. The fee row is recorded here; the lamports move later in
/// the collect step.
pub struct CreatePoolStep {
    amm: Arc<dyn AmmClient>,
    store: Arc<dyn TokenStore>,
    pool: PoolConfig,
}

impl CreatePoolStep {
    pub fn new(amm: Arc<dyn AmmClient>, store: Arc<dyn TokenStore>, pool: PoolConfig) -> Self {
        CreatePoolStep { amm, store, pool }
    }
}

#[async_trait]
impl MigrationStep for CreatePoolStep {
    fn name(&self) -> StepName {
        StepName::CreatePool
    }

    fn event_name(&self) -> Option<&'static str> {
        Some("poolCreated")
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        // A crash between pool creation and checkpoint advance leaves the
        // pool on chain but the checkpoint here. Re-seeding would burn the
        // reserves, so reuse what the row already carries.
        if let (Some(market_id), Some(pool_info)) = (&token.market_id, &token.pool_info) {
            warn!(mint = %token.mint, market_id = %market_id, "Pool already exists, skipping creation");
            let tx_id = token
                .migration
                .steps
                .get(&StepName::CreatePool)
                .map(|o| o.tx_id.clone())
                .unwrap_or_else(|| "already_created".to_string());
            let patch = TokenPatch {
                market_id: Some(market_id.clone()),
                pool_info: Some(pool_info.clone()),
                ..Default::default()
            };
            return Ok(StepResult::with_patch(tx_id, patch));
        }

        let withdrawn = token
            .withdrawn_amounts
            .ok_or_else(|| missing(token, "withdrawn_amounts"))?;

        let fee = self.pool.fixed_fee_lamports;
        if withdrawn.sol <= fee {
            return Err(StepError::InsufficientReserves {
                have: withdrawn.sol,
                need: fee,
            });
        }
        let seed_lamports = withdrawn.sol - fee;

        let created = self
            .amm
            .create_pool(&token.mint, withdrawn.tokens, seed_lamports)
            .await?;
        info!(
            mint = %token.mint,
            pool_id = %created.addresses.id,
            seed_lamports = seed_lamports,
            fee_lamports = fee,
            "Created AMM pool"
        );

        self.store
            .record_fee(FeeRecord::migration(
                created.tx_id.clone(),
                token.mint.clone(),
                fee,
            ))
            .await?;

        let patch = TokenPatch {
            market_id: Some(created.addresses.id.clone()),
            pool_info: Some(created.addresses),
            migrated_at: Some(Utc::now()),
            ..Default::default()
        };
        Ok(StepResult::with_patch(created.tx_id, patch))
    }
}

/// Lock the LP balance in two tranches, minting a custody NFT per tranche.
pub struct LockLpStep {
    amm: Arc<dyn AmmClient>,
    pool: PoolConfig,
}

impl LockLpStep {
    pub fn new(amm: Arc<dyn AmmClient>, pool: PoolConfig) -> Self {
        LockLpStep { amm, pool }
    }

    /// A pool created moments ago may not be indexed yet; poll with backoff.
    async fn fetch_pool(&self, pool_id: &str) -> Result<PoolState, ChainError> {
        retry_with_backoff(
            || self.amm.fetch_pool(pool_id),
            POOL_LOOKUP_ATTEMPTS,
            POOL_LOOKUP_BASE_DELAY,
        )
        .await
    }
}

#[async_trait]
impl MigrationStep for LockLpStep {
    fn name(&self) -> StepName {
        StepName::LockLp
    }

    fn event_name(&self) -> Option<&'static str> {
        Some("lpLocked")
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        let market_id = token
            .market_id
            .as_deref()
            .ok_or_else(|| missing(token, "market_id"))?;

        let pool = self.fetch_pool(market_id).await?;
        if pool.lp_balance == 0 {
            return Err(StepError::Chain(ChainError::NoLpBalance {
                pool_id: pool.pool_id,
            }));
        }

        // Widen before multiplying; lp_balance can sit near u64::MAX.
        let primary_amount =
            (pool.lp_balance as u128 * self.pool.primary_lock_percentage as u128 / 100) as u64;
        let secondary_amount = pool.lp_balance - primary_amount;

        let primary = self.amm.lock_liquidity(&pool, primary_amount).await?;
        let secondary = self.amm.lock_liquidity(&pool, secondary_amount).await?;
        info!(
            mint = %token.mint,
            pool_id = %pool.pool_id,
            primary_amount = primary_amount,
            secondary_amount = secondary_amount,
            "Locked LP balance"
        );

        let tx_id = format!("{},{}", primary.tx_id, secondary.tx_id);
        let patch = TokenPatch {
            lock_id: Some(tx_id.clone()),
            nft_minted: Some(format!("{},{}", primary.nft_mint, secondary.nft_mint)),
            locked_amount: Some(pool.lp_balance.to_string()),
            locked_at: Some(Utc::now()),
            ..Default::default()
        };
        Ok(StepResult::with_patch(tx_id, patch))
    }
}

fn nft_pair(token: &Token) -> Result<(&str, &str), StepError> {
    let minted = token
        .nft_minted
        .as_deref()
        .ok_or_else(|| missing(token, "nft_minted"))?;
    minted
        .split_once(',')
        .ok_or_else(|| missing(token, "nft_minted (secondary)"))
}

/// Hand the secondary custody NFT to the manager multisig.
pub struct SendNftStep {
    ledger: Arc<dyn LedgerClient>,
    pool: PoolConfig,
}

impl SendNftStep {
    pub fn new(ledger: Arc<dyn LedgerClient>, pool: PoolConfig) -> Self {
        SendNftStep { ledger, pool }
    }
}

#[async_trait]
impl MigrationStep for SendNftStep {
    fn name(&self) -> StepName {
        StepName::SendNft
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        let (_, secondary) = nft_pair(token)?;
        let tx_id = self
            .ledger
            .transfer_nft(secondary, &self.pool.manager_multisig)
            .await?;
        info!(mint = %token.mint, nft = secondary, "Sent secondary custody NFT to manager");
        Ok(StepResult::new(tx_id))
    }
}

/// Deposit the primary custody NFT into the protocol vault, with the token
/// creator as the fee-claim authority.
pub struct DepositNftStep {
    amm: Arc<dyn AmmClient>,
}

impl DepositNftStep {
    pub fn new(amm: Arc<dyn AmmClient>) -> Self {
        DepositNftStep { amm }
    }
}

#[async_trait]
impl MigrationStep for DepositNftStep {
    fn name(&self) -> StepName {
        StepName::DepositNft
    }

    fn event_name(&self) -> Option<&'static str> {
        Some("nftDeposited")
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        let (primary, _) = nft_pair(token)?;
        let tx_id = self.amm.deposit_to_vault(primary, &token.creator).await?;
        info!(mint = %token.mint, nft = primary, claimer = %token.creator, "Deposited custody NFT into vault");
        Ok(StepResult::new(tx_id))
    }
}

/// No external call; marks the row's completion timestamp.
pub struct FinalizeStep;

#[async_trait]
impl MigrationStep for FinalizeStep {
    fn name(&self) -> StepName {
        StepName::Finalize
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        info!(mint = %token.mint, "Finalized migration bookkeeping");
        let patch = TokenPatch {
            completed_at: Some(Utc::now()),
            ..Default::default()
        };
        Ok(StepResult::with_patch(FINALIZED_TX_ID, patch))
    }
}

/// Move the protocol fee withheld at pool creation to the fee wallet.
pub struct CollectFeesStep {
    ledger: Arc<dyn LedgerClient>,
    pool: PoolConfig,
}

impl CollectFeesStep {
    pub fn new(ledger: Arc<dyn LedgerClient>, pool: PoolConfig) -> Self {
        CollectFeesStep { ledger, pool }
    }
}

#[async_trait]
impl MigrationStep for CollectFeesStep {
    fn name(&self) -> StepName {
        StepName::CollectFees
    }

    fn event_name(&self) -> Option<&'static str> {
        Some("feesCollected")
    }

    async fn run(&self, token: &Token) -> Result<StepResult, StepError> {
        let fee = self.pool.fixed_fee_lamports;
        if fee == 0 {
            info!(mint = %token.mint, "No protocol fee configured, nothing to collect");
            return Ok(StepResult::new(NO_FEE_TX_ID));
        }
        if self.pool.fee_wallet.is_empty() {
            return Err(StepError::InvalidConfig(
                "pool.fee_wallet is not configured".to_string(),
            ));
        }
        let tx_id = self.ledger.transfer_sol(fee, &self.pool.fee_wallet).await?;
        info!(mint = %token.mint, lamports = fee, "Collected protocol fee");
        Ok(StepResult::new(tx_id))
    }
}
