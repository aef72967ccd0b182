//! Exclusion and recovery tests: concurrent invocations, stale-lease
//! reclaim, and the periodic sweep that picks up stranded migrations.

use std::sync::Arc;
use std::time::Duration;

use graduator::chain::mocks::{MockAmm, MockLedger};
use graduator::config::{MigrationConfig, PoolConfig};
use graduator::migration::{MigrationOutcome, MigrationSweep, StepRegistry, TokenMigrator};
use graduator::monitor::RecordingMonitor;
use graduator::notify::LogNotifier;
use graduator::scheduler::ManualScheduler;
use graduator::store::{MemoryTokenStore, TokenStore};
use graduator::token::{Checkpoint, Mint, StepName, StepOutcome, Token, TokenStatus, WithdrawnAmounts};

struct Harness {
    store: Arc<MemoryTokenStore>,
    ledger: Arc<MockLedger>,
    amm: Arc<MockAmm>,
    scheduler: Arc<ManualScheduler>,
    migrator: Arc<TokenMigrator>,
}

fn fast_settings() -> MigrationConfig {
    MigrationConfig {
        step_retry_attempts: 3,
        step_retry_delay_ms: 1,
        reschedule_delay_ms: 1,
        max_workflow_attempts: 5,
        lock_lease_seconds: 300,
        sweep_interval_seconds: 1,
        sweep_batch_size: 10,
    }
}

fn test_pool_config() -> PoolConfig {
    PoolConfig {
        primary_lock_percentage: 90,
        secondary_lock_percentage: 10,
        fixed_fee_lamports: 1_000_000_000,
        fee_wallet: "fee-wallet".to_string(),
        manager_multisig: "manager-multisig".to_string(),
    }
}

fn harness_with(settings: MigrationConfig) -> Harness {
    let store = Arc::new(MemoryTokenStore::new());
    let ledger = Arc::new(MockLedger::new());
    let amm = Arc::new(MockAmm::new());
    let scheduler = Arc::new(ManualScheduler::new());

    let registry = StepRegistry::standard(
        ledger.clone(),
        amm.clone(),
        store.clone(),
        test_pool_config(),
    );
    let migrator = Arc::new(TokenMigrator::new(
        store.clone(),
        registry,
        Arc::new(LogNotifier),
        Arc::new(RecordingMonitor::new()),
        scheduler.clone(),
        settings,
    ));

    Harness {
        store,
        ledger,
        amm,
        scheduler,
        migrator,
    }
}

fn harness() -> Harness {
    harness_with(fast_settings())
}

/// A token stranded mid-migration: withdraw committed, lock not held.
fn stranded_token(mint: &str) -> Token {
    let mut token = Token::new(mint, "Test Token", "TST", "creator-1");
    token.status = TokenStatus::Migrating;
    token.withdrawn_amounts = Some(WithdrawnAmounts {
        sol: 8_000_000_000,
        tokens: 999_000_000_000_000,
    });
    token.migration.last_step = Some(Checkpoint::Step(StepName::CreatePool));
    token
        .migration
        .steps
        .insert(StepName::Withdraw, StepOutcome::success("tx-w"));
    token
}

#[tokio::test]
async fn concurrent_invocations_run_exactly_one_workflow() {
    let h = harness();
    let token = Token::new("MintRace", "Test Token", "TST", "creator-1");
    h.store.insert(token).await.unwrap();

    // Stretch the withdraw call so both invocations overlap in flight.
    h.ledger.set_call_delay(Duration::from_millis(50));

    let first = h.migrator.clone().migrate_token(Mint::from("MintRace"));
    let second = h.migrator.clone().migrate_token(Mint::from("MintRace"));
    let (a, b) = tokio::join!(first, second);

    // Exactly one invocation did step work; the other deferred immediately.
    let deferred = [a, b]
        .iter()
        .filter(|o| **o == MigrationOutcome::Deferred)
        .count();
    assert_eq!(deferred, 1, "outcomes: {a:?}, {b:?}");
    assert_eq!(h.ledger.withdraw_call_count(), 1);
}

#[tokio::test]
async fn fresh_lock_defers_the_invocation() {
    let h = harness();
    let mut token = stranded_token("MintHeld");
    token.migration.lock = true;
    token.migration.locked_at = Some(chrono::Utc::now());
    h.store.insert(token).await.unwrap();

    let outcome = h.migrator.clone().migrate_token(Mint::from("MintHeld")).await;
    assert_eq!(outcome, MigrationOutcome::Deferred);
    assert!(h.amm.calls().is_empty());
}

#[tokio::test]
async fn stale_lock_is_reclaimed_and_the_run_resumes() {
    let h = harness();
    let mut token = stranded_token("MintStale");
    // Crashed worker: lock held, lease expired hours ago.
    token.migration.lock = true;
    token.migration.locked_at = Some(chrono::Utc::now() - chrono::Duration::hours(2));
    h.store.insert(token).await.unwrap();

    let outcome = h
        .migrator
        .clone()
        .migrate_token(Mint::from("MintStale"))
        .await;
    assert_eq!(
        outcome,
        MigrationOutcome::Rescheduled {
            next: StepName::LockLp
        }
    );

    h.scheduler.drain_all(20).await;
    let token = h
        .store
        .get(&Mint::from("MintStale"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.status, TokenStatus::Locked);
    // The resume started at createPool, not withdraw.
    assert_eq!(h.ledger.withdraw_call_count(), 0);
}

#[tokio::test]
async fn sweep_resumes_stranded_and_skips_fresh_locked() {
    let h = harness();

    h.store.insert(stranded_token("MintSwept")).await.unwrap();

    let mut held = stranded_token("MintBusy");
    held.migration.lock = true;
    held.migration.locked_at = Some(chrono::Utc::now());
    h.store.insert(held).await.unwrap();

    let sweep = MigrationSweep::new(h.migrator.clone());
    let resumed = sweep.tick().await;
    assert_eq!(resumed, 1);

    h.scheduler.drain_all(20).await;

    let swept = h
        .store
        .get(&Mint::from("MintSwept"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swept.status, TokenStatus::Locked);

    let busy = h.store.get(&Mint::from("MintBusy")).await.unwrap().unwrap();
    assert_eq!(busy.status, TokenStatus::Migrating);
    assert_eq!(busy.migration.steps.len(), 1);
}

#[tokio::test]
async fn sweep_reclaims_abandoned_tokens_with_stale_locks() {
    let h = harness();

    // Lock held but the lease expired long ago and nothing was rescheduled:
    // the classic abandoned entity.
    let mut abandoned = stranded_token("MintAbandoned");
    abandoned.migration.lock = true;
    abandoned.migration.locked_at = Some(chrono::Utc::now() - chrono::Duration::hours(3));
    h.store.insert(abandoned).await.unwrap();

    let sweep = MigrationSweep::new(h.migrator.clone());
    assert_eq!(sweep.tick().await, 1);

    h.scheduler.drain_all(20).await;
    let token = h
        .store
        .get(&Mint::from("MintAbandoned"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.status, TokenStatus::Locked);
}

#[tokio::test]
async fn sweep_honors_the_batch_limit() {
    let mut settings = fast_settings();
    settings.sweep_batch_size = 1;
    let h = harness_with(settings);

    h.store.insert(stranded_token("MintOne")).await.unwrap();
    h.store.insert(stranded_token("MintTwo")).await.unwrap();

    let sweep = MigrationSweep::new(h.migrator.clone());
    assert_eq!(sweep.tick().await, 1);

    // The second tick picks up whichever token the first one skipped.
    h.scheduler.drain_all(20).await;
    assert_eq!(sweep.tick().await, 1);
    h.scheduler.drain_all(20).await;

    for mint in ["MintOne", "MintTwo"] {
        let token = h.store.get(&Mint::from(mint)).await.unwrap().unwrap();
        assert_eq!(token.status, TokenStatus::Locked, "{mint} not graduated");
    }
}

#[tokio::test]
async fn sweep_ignores_terminal_and_dead_lettered_tokens() {
    let h = harness();

    let mut done = Token::new("MintDone", "Test Token", "TST", "creator-1");
    done.status = TokenStatus::Locked;
    done.migration.last_step = Some(Checkpoint::Done);
    h.store.insert(done).await.unwrap();

    let mut dead = Token::new("MintDead", "Test Token", "TST", "creator-1");
    dead.status = TokenStatus::MigrationFailed;
    h.store.insert(dead).await.unwrap();

    let sweep = MigrationSweep::new(h.migrator.clone());
    assert_eq!(sweep.tick().await, 0);
    assert!(h.ledger.calls().is_empty());
    assert!(h.amm.calls().is_empty());
}
