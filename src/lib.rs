// Graduator Library - Bonding Curve to AMM Graduation Engine
// This exposes the core components for testing and integration

pub mod chain;
pub mod config;
pub mod migration;
pub mod monitor;
pub mod notify;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod token;

// Re-export key types for easy access
pub use chain::{AmmClient, ChainError, LedgerClient};
pub use config::{config, init_config, GraduatorConfig};
pub use migration::{
    MigrationLockManager, MigrationOutcome, MigrationSweep, MigrationStep, StepError,
    StepExecutor, StepRegistry, StepResult, TokenMigrator,
};
pub use monitor::{LogMonitor, PoolMonitor};
pub use notify::{ChannelNotifier, LogNotifier, MigrationEvent, Notifier};
pub use retry::{retry_operation, retry_with_backoff, RetryPolicy};
pub use scheduler::{ManualScheduler, ScheduledTask, Scheduler, TokioScheduler};
pub use store::{FeeRecord, JsonFileStore, MemoryTokenStore, StoreError, TokenStore};
pub use telemetry::{create_migration_span, generate_correlation_id, init_telemetry};
pub use token::{
    Checkpoint, MigrationRecord, Mint, StepName, StepOutcome, Token, TokenPatch, TokenStatus,
};
