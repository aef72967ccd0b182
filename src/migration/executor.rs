// Step executor: runs one step through the retry wrapper, commits its
// outcome and patch to the persisted row, and advances the checkpoint.

use std::sync::Arc;
use tracing::{info, warn};

use super::step::{MigrationStep, StepError, StepResult};
use crate::notify::Notifier;
use crate::retry::{retry_operation, RetryPolicy};
use crate::store::{StoreError, TokenStore};
use crate::token::{Checkpoint, StepOutcome, Token, TokenStatus};

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("step {step} failed: {source}")]
    Step {
        step: crate::token::StepName,
        #[source]
        source: StepError,
    },

    #[error("persisting step outcome failed: {0}")]
    Persist(#[from] StoreError),
}

pub struct StepExecutor {
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl StepExecutor {
    pub fn new(store: Arc<dyn TokenStore>, notifier: Arc<dyn Notifier>, policy: RetryPolicy) -> Self {
        StepExecutor {
            store,
            notifier,
            policy,
        }
    }

    /// Run `step` against `token` and, on success, commit in one write:
    /// the step outcome, the step's patch, and the advanced checkpoint.
    /// On failure the error propagates and the persisted row is untouched,
    /// so a later invocation resumes at the same step.
    pub async fn execute_step(
        &self,
        token: &mut Token,
        step: &dyn MigrationStep,
        next: Checkpoint,
    ) -> Result<StepResult, ExecuteError> {
        let name = step.name();
        info!(mint = %token.mint, step = %name, "Executing migration step");

        let result = {
            let snapshot: &Token = token;
            retry_operation(|| step.run(snapshot), self.policy)
                .await
                .map_err(|source| ExecuteError::Step { step: name, source })?
        };

        let mut migration = token.migration.clone();
        migration
            .steps
            .insert(name, StepOutcome::success(result.tx_id.clone()));
        migration.last_step = Some(next);

        // Single write: outcome, patch, and checkpoint land together so a
        // crash cannot record one without the others.
        let mut patch = result.patch.clone();
        patch.status = Some(TokenStatus::Migrating);
        patch.migration = Some(migration);
        *token = self.store.update(&token.mint, patch).await?;

        info!(
            mint = %token.mint,
            step = %name,
            tx_id = %result.tx_id,
            checkpoint = %next,
            "Migration step committed"
        );

        if let Some(event) = step.event_name() {
            if let Err(err) = self.notifier.publish(&token.room(), event, token).await {
                warn!(mint = %token.mint, event = event, error = %err, "Event publish failed");
            }
        }

        Ok(result)
    }
}
