// The workflow engine: a resumable, idempotent, per-token-locked sequence of
// graduation steps. The persisted checkpoint is the source of truth; every
// component here is written so that repeating an invocation after a crash
// converges to the same final state.

pub mod executor;
pub mod lock;
pub mod orchestrator;
pub mod registry;
pub mod step;
pub mod steps;
pub mod sweep;

pub use executor::{ExecuteError, StepExecutor};
pub use lock::MigrationLockManager;
pub use orchestrator::{MigrateError, MigrationOutcome, TokenMigrator};
pub use registry::{Resume, StepRegistry};
pub use step::{MigrationStep, StepError, StepResult};
pub use sweep::MigrationSweep;
