// Periodic sweep: picks up tokens stranded mid-migration by a crash or a
// missed reschedule and re-invokes the workflow for them.

use std::sync::Arc;
use tracing::{error, info};

use super::orchestrator::TokenMigrator;
use crate::token::TokenStatus;

pub struct MigrationSweep {
    migrator: Arc<TokenMigrator>,
}

impl MigrationSweep {
    pub fn new(migrator: Arc<TokenMigrator>) -> Self {
        MigrationSweep { migrator }
    }

    /// One pass: re-invoke the workflow for every migrating token that is
    /// not freshly locked, up to the configured batch size. Returns how many
    /// tokens were re-invoked.
    pub async fn tick(&self) -> usize {
        let settings = self.migrator.settings();
        let lease = settings.lock_lease();
        let batch_size = settings.sweep_batch_size;

        let stranded = match self
            .migrator
            .store()
            .list_by_status(TokenStatus::Migrating)
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                error!(error = %err, "Sweep failed to list migrating tokens");
                return 0;
            }
        };

        let mut resumed = 0;
        for token in stranded {
            if resumed >= batch_size {
                info!(batch_size = batch_size, "Sweep batch limit reached");
                break;
            }
            // A fresh lock means a live invocation already owns this token.
            if token.migration.lock_is_held(lease) {
                continue;
            }
            info!(mint = %token.mint, "Sweep resuming stranded migration");
            self.migrator.clone().migrate_token(token.mint).await;
            resumed += 1;
        }
        resumed
    }

    /// Tick forever on the configured interval. Runs until the task is
    /// dropped or the runtime shuts down.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.migrator.settings().sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let resumed = self.tick().await;
            if resumed > 0 {
                info!(resumed = resumed, "Sweep tick resumed migrations");
            }
        }
    }
}
