// Ordered step registry. The sequence is compiled in: changing the workflow
// means redeploying the orchestrator, which is intentional.

use std::sync::Arc;

use super::step::MigrationStep;
use super::steps::{
    CollectFeesStep, CreatePoolStep, DepositNftStep, FinalizeStep, LockLpStep, SendNftStep,
    WithdrawStep,
};
use crate::chain::{AmmClient, LedgerClient};
use crate::config::PoolConfig;
use crate::store::TokenStore;
use crate::token::{Checkpoint, MigrationRecord, StepName};

/// Where a resumed workflow should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// All steps have committed; only terminal bookkeeping may remain.
    Done,
    /// Run the step at this registry index next.
    At(usize),
}

pub struct StepRegistry {
    steps: Vec<Arc<dyn MigrationStep>>,
}

impl StepRegistry {
    /// The production workflow, wired over the given collaborators.
    pub fn standard(
        ledger: Arc<dyn LedgerClient>,
        amm: Arc<dyn AmmClient>,
        store: Arc<dyn TokenStore>,
        pool: PoolConfig,
    ) -> Self {
        let steps: Vec<Arc<dyn MigrationStep>> = vec![
            Arc::new(WithdrawStep::new(ledger.clone())),
            Arc::new(CreatePoolStep::new(amm.clone(), store, pool.clone())),
            Arc::new(LockLpStep::new(amm.clone(), pool.clone())),
            Arc::new(SendNftStep::new(ledger.clone(), pool.clone())),
            Arc::new(DepositNftStep::new(amm)),
            Arc::new(FinalizeStep),
            Arc::new(CollectFeesStep::new(ledger, pool)),
        ];
        debug_assert_eq!(steps.len(), StepName::SEQUENCE.len());
        StepRegistry { steps }
    }

    /// Custom sequence, for tests that script individual steps.
    pub fn with_steps(steps: Vec<Arc<dyn MigrationStep>>) -> Self {
        StepRegistry { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn MigrationStep>> {
        self.steps.get(index)
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.steps.len()
    }

    /// Checkpoint to persist once the step at `index` commits.
    pub fn checkpoint_after(&self, index: usize) -> Checkpoint {
        match self.steps.get(index + 1) {
            Some(step) => Checkpoint::Step(step.name()),
            None => Checkpoint::Done,
        }
    }

    /// Resolve the resume point from the persisted record. An absent
    /// checkpoint means the workflow has never run; a named step is the step
    /// to run next; an unknown position past the end degrades to `Done`.
    pub fn resume_point(&self, record: &MigrationRecord) -> Resume {
        match record.last_step {
            None => Resume::At(0),
            Some(Checkpoint::Done) => Resume::Done,
            Some(Checkpoint::Step(name)) => {
                match self.steps.iter().position(|s| s.name() == name) {
                    Some(index) => Resume::At(index),
                    None => Resume::Done,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mocks::{MockAmm, MockLedger};
    use crate::config::GraduatorConfig;
    use crate::store::MemoryTokenStore;

    fn standard_registry() -> StepRegistry {
        StepRegistry::standard(
            Arc::new(MockLedger::new()),
            Arc::new(MockAmm::new()),
            Arc::new(MemoryTokenStore::new()),
            GraduatorConfig::default().pool,
        )
    }

    #[test]
    fn registry_order_matches_step_sequence() {
        let registry = standard_registry();
        assert_eq!(registry.len(), 7);
        for (index, expected) in StepName::SEQUENCE.iter().enumerate() {
            assert_eq!(registry.get(index).unwrap().name(), *expected);
        }
    }

    #[test]
    fn resume_point_resolution() {
        let registry = standard_registry();

        let mut record = MigrationRecord::default();
        assert_eq!(registry.resume_point(&record), Resume::At(0));

        record.last_step = Some(Checkpoint::Step(StepName::LockLp));
        assert_eq!(registry.resume_point(&record), Resume::At(2));

        record.last_step = Some(Checkpoint::Done);
        assert_eq!(registry.resume_point(&record), Resume::Done);
    }

    #[test]
    fn checkpoint_after_last_step_is_done() {
        let registry = standard_registry();
        assert_eq!(
            registry.checkpoint_after(0),
            Checkpoint::Step(StepName::CreatePool)
        );
        assert_eq!(registry.checkpoint_after(6), Checkpoint::Done);
        assert!(registry.is_last(6));
        assert!(!registry.is_last(3));
    }
}
