// Scripted chain collaborators for testing - no side effects.
//
// Each mock records the calls it receives and pops scripted results from a
// queue; an empty queue yields a deterministic canned success so tests only
// script the interesting cases.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::amm::{AmmClient, CreatedPool, LiquidityLock, PoolState};
use super::ledger::{LedgerClient, WithdrawOutcome, SUCCESS_LOG_MARKER};
use super::ChainError;
use crate::token::{Mint, PoolAddresses};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    WithdrawReserves { mint: Mint },
    TransferNft { nft_mint: String, recipient: String },
    TransferSol { lamports: u64, recipient: String },
    TransactionLogs { signature: String },
}

pub struct MockLedger {
    withdraw_results: Mutex<VecDeque<Result<WithdrawOutcome, ChainError>>>,
    transfer_results: Mutex<VecDeque<Result<String, ChainError>>>,
    transaction_logs: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<LedgerCall>>,
    /// Artificial latency per call, for exercising interleavings.
    pub call_delay: Mutex<Duration>,
    sequence: AtomicU64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger {
            withdraw_results: Mutex::new(VecDeque::new()),
            transfer_results: Mutex::new(VecDeque::new()),
            transaction_logs: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_delay: Mutex::new(Duration::ZERO),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn push_withdraw(&self, result: Result<WithdrawOutcome, ChainError>) {
        self.withdraw_results.lock().unwrap().push_back(result);
    }

    pub fn push_transfer(&self, result: Result<String, ChainError>) {
        self.transfer_results.lock().unwrap().push_back(result);
    }

    pub fn set_transaction_logs(&self, signature: &str, logs: Vec<String>) {
        self.transaction_logs
            .lock()
            .unwrap()
            .insert(signature.to_string(), logs);
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn withdraw_call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, LedgerCall::WithdrawReserves { .. }))
            .count()
    }

    fn next_signature(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    async fn apply_delay(&self) {
        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn default_withdraw(&self, mint: &Mint) -> WithdrawOutcome {
        WithdrawOutcome {
            signature: self.next_signature(&format!("withdraw-{mint}")),
            logs: vec![
                "Program log: withdraw lamports: 8000000000".to_string(),
                "Program log: withdraw token: 999000000000000".to_string(),
                SUCCESS_LOG_MARKER.to_string(),
            ],
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn withdraw_reserves(&self, mint: &Mint) -> Result<WithdrawOutcome, ChainError> {
        self.apply_delay().await;
        self.calls
            .lock()
            .unwrap()
            .push(LedgerCall::WithdrawReserves { mint: mint.clone() });
        let scripted = self.withdraw_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.default_withdraw(mint)),
        }
    }

    async fn transfer_nft(&self, nft_mint: &str, recipient: &str) -> Result<String, ChainError> {
        self.apply_delay().await;
        self.calls.lock().unwrap().push(LedgerCall::TransferNft {
            nft_mint: nft_mint.to_string(),
            recipient: recipient.to_string(),
        });
        let scripted = self.transfer_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.next_signature("send-nft")),
        }
    }

    async fn transfer_sol(&self, lamports: u64, recipient: &str) -> Result<String, ChainError> {
        self.apply_delay().await;
        self.calls.lock().unwrap().push(LedgerCall::TransferSol {
            lamports,
            recipient: recipient.to_string(),
        });
        let scripted = self.transfer_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.next_signature("send-sol")),
        }
    }

    async fn transaction_logs(&self, signature: &str) -> Result<Vec<String>, ChainError> {
        self.calls.lock().unwrap().push(LedgerCall::TransactionLogs {
            signature: signature.to_string(),
        });
        Ok(self
            .transaction_logs
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmmCall {
    CreatePool {
        mint: Mint,
        token_amount: u64,
        lamport_amount: u64,
    },
    FetchPool {
        pool_id: String,
    },
    LockLiquidity {
        pool_id: String,
        lp_amount: u64,
    },
    DepositToVault {
        nft_mint: String,
        claimer: String,
    },
}

pub struct MockAmm {
    create_results: Mutex<VecDeque<Result<CreatedPool, ChainError>>>,
    fetch_results: Mutex<VecDeque<Result<PoolState, ChainError>>>,
    lock_results: Mutex<VecDeque<Result<LiquidityLock, ChainError>>>,
    deposit_results: Mutex<VecDeque<Result<String, ChainError>>>,
    calls: Mutex<Vec<AmmCall>>,
    sequence: AtomicU64,
}

impl Default for MockAmm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAmm {
    pub fn new() -> Self {
        MockAmm {
            create_results: Mutex::new(VecDeque::new()),
            fetch_results: Mutex::new(VecDeque::new()),
            lock_results: Mutex::new(VecDeque::new()),
            deposit_results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn push_create_pool(&self, result: Result<CreatedPool, ChainError>) {
        self.create_results.lock().unwrap().push_back(result);
    }

    pub fn push_fetch_pool(&self, result: Result<PoolState, ChainError>) {
        self.fetch_results.lock().unwrap().push_back(result);
    }

    pub fn push_lock(&self, result: Result<LiquidityLock, ChainError>) {
        self.lock_results.lock().unwrap().push_back(result);
    }

    pub fn push_deposit(&self, result: Result<String, ChainError>) {
        self.deposit_results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<AmmCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count_of(&self, matcher: impl Fn(&AmmCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matcher(c)).count()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    fn default_pool(&self, mint: &Mint) -> CreatedPool {
        CreatedPool {
            tx_id: self.next_id("create-pool"),
            addresses: PoolAddresses {
                id: format!("pool-{mint}"),
                lp_mint: format!("lp-{mint}"),
                base_vault: format!("base-vault-{mint}"),
                quote_vault: format!("quote-vault-{mint}"),
            },
        }
    }
}

#[async_trait]
impl AmmClient for MockAmm {
    async fn create_pool(
        &self,
        mint: &Mint,
        token_amount: u64,
        lamport_amount: u64,
    ) -> Result<CreatedPool, ChainError> {
        self.calls.lock().unwrap().push(AmmCall::CreatePool {
            mint: mint.clone(),
            token_amount,
            lamport_amount,
        });
        let scripted = self.create_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.default_pool(mint)),
        }
    }

    async fn fetch_pool(&self, pool_id: &str) -> Result<PoolState, ChainError> {
        self.calls.lock().unwrap().push(AmmCall::FetchPool {
            pool_id: pool_id.to_string(),
        });
        let scripted = self.fetch_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(PoolState {
                pool_id: pool_id.to_string(),
                lp_mint: format!("lp-of-{pool_id}"),
                lp_balance: 1_000_000,
            }),
        }
    }

    async fn lock_liquidity(
        &self,
        pool: &PoolState,
        lp_amount: u64,
    ) -> Result<LiquidityLock, ChainError> {
        self.calls.lock().unwrap().push(AmmCall::LockLiquidity {
            pool_id: pool.pool_id.clone(),
            lp_amount,
        });
        let scripted = self.lock_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(LiquidityLock {
                tx_id: self.next_id("lock"),
                nft_mint: self.next_id("nft"),
            }),
        }
    }

    async fn deposit_to_vault(&self, nft_mint: &str, claimer: &str) -> Result<String, ChainError> {
        self.calls.lock().unwrap().push(AmmCall::DepositToVault {
            nft_mint: nft_mint.to_string(),
            claimer: claimer.to_string(),
        });
        let scripted = self.deposit_results.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.next_id("deposit")),
        }
    }
}
