// Top-level control loop. One invocation of `migrate_token` advances the
// workflow by exactly one step (or finishes it), then hands off to the
// scheduler; the persisted checkpoint carries the state between invocations,
// so a crash anywhere simply means the next invocation resumes.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};

use super::executor::{ExecuteError, StepExecutor};
use super::lock::MigrationLockManager;
use super::registry::{Resume, StepRegistry};
use crate::config::MigrationConfig;
use crate::monitor::PoolMonitor;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use crate::store::{StoreError, TokenStore};
use crate::telemetry::{create_migration_span, generate_correlation_id};
use crate::token::{Checkpoint, Mint, StepName, Token, TokenPatch, TokenStatus};

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How one `migrate_token` invocation ended. Informational; callers other
/// than tests usually ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Another holder owns the token, or it was not found; nothing was done.
    Deferred,
    /// The token was already terminal; the invocation was a no-op beyond
    /// re-asserting the terminal state.
    AlreadyComplete,
    /// One step committed; a follow-up invocation was scheduled for `next`.
    Rescheduled { next: StepName },
    /// The final step committed and the token is now locked.
    Completed,
    /// The invocation failed. `dead_lettered` is true once the attempt
    /// budget is exhausted and no further retries will be scheduled.
    Failed { dead_lettered: bool },
}

pub struct TokenMigrator {
    store: Arc<dyn TokenStore>,
    registry: StepRegistry,
    lock: MigrationLockManager,
    executor: StepExecutor,
    monitor: Arc<dyn PoolMonitor>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn Scheduler>,
    settings: MigrationConfig,
}

impl TokenMigrator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        registry: StepRegistry,
        notifier: Arc<dyn Notifier>,
        monitor: Arc<dyn PoolMonitor>,
        scheduler: Arc<dyn Scheduler>,
        settings: MigrationConfig,
    ) -> Self {
        let lock = MigrationLockManager::new(store.clone(), settings.lock_lease());
        let executor = StepExecutor::new(
            store.clone(),
            notifier.clone(),
            settings.step_retry_policy(),
        );
        TokenMigrator {
            store,
            registry,
            lock,
            executor,
            monitor,
            notifier,
            scheduler,
            settings,
        }
    }

    /// Drive the workflow for `mint` by one step. Never panics and never
    /// propagates an error to the caller: failures are absorbed into the
    /// persisted state and, budget permitting, a scheduled retry.
    pub async fn migrate_token(self: Arc<Self>, mint: Mint) -> MigrationOutcome {
        let correlation_id = generate_correlation_id();
        let span = create_migration_span("migrate_token", mint.as_str(), Some(&correlation_id));
        self.run_invocation(mint).instrument(span).await
    }

    async fn run_invocation(self: Arc<Self>, mint: Mint) -> MigrationOutcome {
        info!(mint = %mint, "Migration invocation started");

        let token = match self.store.get(&mint).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(mint = %mint, "Migration requested for unknown token");
                return MigrationOutcome::Deferred;
            }
            Err(err) => {
                error!(mint = %mint, error = %err, "Failed to load token, deferring");
                return MigrationOutcome::Deferred;
            }
        };

        // Soft check before the real acquire; saves a write when another
        // invocation obviously owns the token.
        if token.migration.lock_is_held(self.settings.lock_lease()) {
            info!(mint = %mint, "Token is locked by another invocation, deferring");
            return MigrationOutcome::Deferred;
        }

        let mut token = match self.lock.acquire(&token).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!(mint = %mint, "Lost the lock race, deferring");
                return MigrationOutcome::Deferred;
            }
            Err(err) => {
                error!(mint = %mint, error = %err, "Lock acquisition failed, deferring");
                return MigrationOutcome::Deferred;
            }
        };

        match Self::run_locked(&self, &mut token).await {
            Ok(outcome) => outcome,
            Err(err) => Self::handle_failure(&self, token, err).await,
        }
    }

    async fn run_locked(
        this: &Arc<Self>,
        token: &mut Token,
    ) -> Result<MigrationOutcome, MigrateError> {
        let index = match this.registry.resume_point(&token.migration) {
            Resume::Done => {
                // Terminal special case: everything committed on a prior
                // invocation but the terminal write may not have landed.
                this.finish_terminal(token).await?;
                return Ok(MigrationOutcome::AlreadyComplete);
            }
            Resume::At(index) => index,
        };

        // Registry indices come from the registry itself, so the lookup
        // cannot miss; guard anyway rather than index.
        let Some(step) = this.registry.get(index).cloned() else {
            this.finish_terminal(token).await?;
            return Ok(MigrationOutcome::AlreadyComplete);
        };

        let next = this.registry.checkpoint_after(index);
        this.executor.execute_step(token, step.as_ref(), next).await?;

        if this.registry.is_last(index) {
            this.finish_terminal(token).await?;
            return Ok(MigrationOutcome::Completed);
        }

        // Unlock before handing off so the scheduled invocation can acquire.
        this.lock.release(token).await?;
        let next_name = match next {
            Checkpoint::Step(name) => name,
            Checkpoint::Done => StepName::CollectFees,
        };
        Self::schedule_invocation(this, token.mint.clone(), this.settings.reschedule_delay());
        Ok(MigrationOutcome::Rescheduled { next: next_name })
    }

    /// The terminal write: status `Locked`, completion stamp, lock cleared,
    /// all in one update. Monitor registration is best-effort afterwards.
    async fn finish_terminal(&self, token: &mut Token) -> Result<(), MigrateError> {
        let mut migration = token.migration.clone();
        migration.lock = false;
        migration.locked_at = None;

        let patch = TokenPatch {
            status: Some(TokenStatus::Locked),
            completed_at: token.completed_at.or_else(|| Some(chrono::Utc::now())),
            migration: Some(migration),
            ..Default::default()
        };
        *token = self.store.update(&token.mint, patch).await?;
        self.lock.forget(&token.mint);

        info!(
            mint = %token.mint,
            market_id = token.market_id.as_deref().unwrap_or("unknown"),
            "Token graduated and locked"
        );

        // Observers of the room get the final status flip, not just the last
        // step event. Best-effort, like the monitor registration.
        if let Err(err) = self.notifier.publish(&token.room(), "updateToken", token).await {
            warn!(mint = %token.mint, error = %err, "Terminal event publish failed");
        }
        if let Err(err) = self.monitor.register(token).await {
            warn!(mint = %token.mint, error = %err, "Pool monitor registration failed");
        }
        Ok(())
    }

    /// Failure policy: count the attempt, dead-letter past the budget,
    /// otherwise leave the token migrating and schedule a retry. The
    /// persisted lock is cleared either way so a later invocation (scheduled
    /// or swept) can take over.
    async fn handle_failure(this: &Arc<Self>, token: Token, err: MigrateError) -> MigrationOutcome {
        let attempts = token.migration.attempts + 1;
        let exhausted = attempts >= this.settings.max_workflow_attempts;

        let mut migration = token.migration.clone();
        migration.attempts = attempts;
        migration.lock = false;
        migration.locked_at = None;

        let status = if exhausted {
            error!(
                mint = %token.mint,
                attempts = attempts,
                error = %err,
                "Migration attempt budget exhausted, dead-lettering token"
            );
            TokenStatus::MigrationFailed
        } else {
            warn!(
                mint = %token.mint,
                attempts = attempts,
                max_attempts = this.settings.max_workflow_attempts,
                error = %err,
                "Migration invocation failed, will retry"
            );
            TokenStatus::Migrating
        };

        let mut patch = TokenPatch::migration(migration);
        patch.status = Some(status);
        if let Err(persist_err) = this.store.update(&token.mint, patch).await {
            error!(mint = %token.mint, error = %persist_err, "Failed to persist failure state");
        }
        this.lock.forget(&token.mint);

        if !exhausted {
            Self::schedule_invocation(this, token.mint.clone(), this.settings.reschedule_delay());
        }
        MigrationOutcome::Failed {
            dead_lettered: exhausted,
        }
    }

    fn schedule_invocation(migrator: &Arc<Self>, mint: Mint, delay: Duration) {
        let next = Arc::clone(migrator);
        let scheduler = migrator.scheduler.clone();
        scheduler.schedule_once(
            delay,
            Box::pin(async move {
                next.migrate_token(mint).await;
            }),
        );
    }

    pub fn settings(&self) -> &MigrationConfig {
        &self.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }
}
