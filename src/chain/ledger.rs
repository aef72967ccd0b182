// Ledger-side transaction collaborator: reserve withdrawal, token and SOL
// transfers, and transaction log lookup for post-hoc verification.

use async_trait::async_trait;
use tracing::info;

use super::ChainError;
use crate::token::Mint;

/// Log line emitted by the on-chain program when it ran to completion.
/// Presence in a transaction's recorded logs outranks an ambiguous
/// confirmation error.
pub const SUCCESS_LOG_MARKER: &str = "Program success";

/// Result of an executed withdraw transaction, program logs included so the
/// caller can parse the exact withdrawn amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub signature: String,
    pub logs: Vec<String>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Withdraw the curve reserves for `mint` into the orchestrator wallet.
    /// Must be safe to re-invoke: a withdraw that already committed should
    /// be detected and reported as success, not re-submitted.
    async fn withdraw_reserves(&self, mint: &Mint) -> Result<WithdrawOutcome, ChainError>;

    /// Transfer a custody NFT to `recipient`. Returns the tx signature.
    async fn transfer_nft(&self, nft_mint: &str, recipient: &str) -> Result<String, ChainError>;

    /// Transfer `lamports` to `recipient`. Returns the tx signature.
    async fn transfer_sol(&self, lamports: u64, recipient: &str) -> Result<String, ChainError>;

    /// Recorded log messages of a committed transaction, for verifying
    /// ambiguous confirmations.
    async fn transaction_logs(&self, signature: &str) -> Result<Vec<String>, ChainError>;
}

/// Shared resolution for ambiguous confirmation errors: re-fetch the
/// transaction's recorded effects and treat a success marker in its logs as
/// success. Any other error passes through unchanged.
pub async fn verify_despite_error(
    ledger: &dyn LedgerClient,
    err: ChainError,
) -> Result<WithdrawOutcome, ChainError> {
    match err {
        ChainError::AmbiguousConfirmation { signature, code } => {
            let logs = ledger.transaction_logs(&signature).await?;
            if logs.iter().any(|l| l.contains(SUCCESS_LOG_MARKER)) {
                info!(
                    signature = %signature,
                    code = %code,
                    "Transaction succeeded despite ambiguous confirmation"
                );
                Ok(WithdrawOutcome { signature, logs })
            } else {
                Err(ChainError::Confirmation {
                    signature,
                    reason: code,
                })
            }
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::super::mocks::MockLedger;
    use super::*;

    #[tokio::test]
    async fn ambiguous_error_with_success_logs_resolves_to_success() {
        let ledger = MockLedger::new();
        ledger.set_transaction_logs(
            "sig-1",
            vec![
                "Program log: withdraw lamports: 5".to_string(),
                "Program success".to_string(),
            ],
        );

        let err = ChainError::AmbiguousConfirmation {
            signature: "sig-1".to_string(),
            code: "ProgramFailedToComplete".to_string(),
        };
        let outcome = verify_despite_error(&ledger, err).await.unwrap();
        assert_eq!(outcome.signature, "sig-1");
        assert!(outcome.logs.iter().any(|l| l.contains("withdraw lamports")));
    }

    #[tokio::test]
    async fn ambiguous_error_without_success_marker_stays_failed() {
        let ledger = MockLedger::new();
        ledger.set_transaction_logs("sig-2", vec!["Program log: panicked".to_string()]);

        let err = ChainError::AmbiguousConfirmation {
            signature: "sig-2".to_string(),
            code: "ProgramFailedToComplete".to_string(),
        };
        let result = verify_despite_error(&ledger, err).await;
        assert!(matches!(result, Err(ChainError::Confirmation { .. })));
    }

    #[tokio::test]
    async fn non_ambiguous_errors_pass_through() {
        let ledger = MockLedger::new();
        let err = ChainError::Rpc("timeout".to_string());
        let result = verify_despite_error(&ledger, err).await;
        assert!(matches!(result, Err(ChainError::Rpc(_))));
    }
}
