// Token data model - the entity being graduated from the bonding curve
// into a public AMM pool, together with its persisted migration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Address-like identity of a migratable token. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mint(pub String);

impl Mint {
    pub fn new(value: impl Into<String>) -> Self {
        Mint(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mint {
    fn from(value: &str) -> Self {
        Mint(value.to_string())
    }
}

/// Lifecycle status of a token. Advances monotonically toward `Locked`;
/// recoverable failures revert to `Migrating`, exhausted attempt budgets
/// land in `MigrationFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Migrating,
    Locked,
    MigrationFailed,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenStatus::Active => "active",
            TokenStatus::Migrating => "migrating",
            TokenStatus::Locked => "locked",
            TokenStatus::MigrationFailed => "migration_failed",
        };
        f.write_str(s)
    }
}

/// The fixed, ordered migration steps. Position in `SEQUENCE` encodes the
/// real-world dependency chain: no liquidity lock before a pool exists, no
/// custody distribution before the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepName {
    #[serde(rename = "withdraw")]
    Withdraw,
    #[serde(rename = "createPool")]
    CreatePool,
    #[serde(rename = "lockLP")]
    LockLp,
    #[serde(rename = "sendNft")]
    SendNft,
    #[serde(rename = "depositNft")]
    DepositNft,
    #[serde(rename = "finalize")]
    Finalize,
    #[serde(rename = "collectFees")]
    CollectFees,
}

impl StepName {
    pub const SEQUENCE: [StepName; 7] = [
        StepName::Withdraw,
        StepName::CreatePool,
        StepName::LockLp,
        StepName::SendNft,
        StepName::DepositNft,
        StepName::Finalize,
        StepName::CollectFees,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Withdraw => "withdraw",
            StepName::CreatePool => "createPool",
            StepName::LockLp => "lockLP",
            StepName::SendNft => "sendNft",
            StepName::DepositNft => "depositNft",
            StepName::Finalize => "finalize",
            StepName::CollectFees => "collectFees",
        }
    }

    /// Zero-based position in the registry order.
    pub fn position(&self) -> usize {
        Self::SEQUENCE
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// The step that follows this one, or `None` for the last step.
    pub fn next(&self) -> Option<StepName> {
        Self::SEQUENCE.get(self.position() + 1).copied()
    }

    pub fn is_last(&self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SEQUENCE
            .iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown migration step: {s}"))
    }
}

/// Persisted resume point: the name of the step to run next, or the terminal
/// marker once all steps have committed. Serialized as a bare string
/// (`"createPool"`, `"done"`) so the stored record stays operator-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Checkpoint {
    Step(StepName),
    Done,
}

impl Checkpoint {
    pub fn is_done(&self) -> bool {
        matches!(self, Checkpoint::Done)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Step(step) => f.write_str(step.as_str()),
            Checkpoint::Done => f.write_str("done"),
        }
    }
}

impl From<Checkpoint> for String {
    fn from(value: Checkpoint) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Checkpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "done" {
            Ok(Checkpoint::Done)
        } else {
            value.parse::<StepName>().map(Checkpoint::Step)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
}

/// Outcome of one committed step. Write-once per step name under normal
/// operation; a step re-attempted after a crash overwrites only its own
/// prior entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub tx_id: String,
    pub updated_at: DateTime<Utc>,
}

impl StepOutcome {
    pub fn success(tx_id: impl Into<String>) -> Self {
        StepOutcome {
            status: StepStatus::Success,
            tx_id: tx_id.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Structured migration state attached to the token row. Owned exclusively
/// by the workflow engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// True while a worker holds exclusive access to this token.
    #[serde(default)]
    pub lock: bool,
    /// Lease timestamp for the lock; a lock whose lease has expired belongs
    /// to a crashed worker and may be reclaimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    /// Resume point: the step to run next, or the terminal marker. Absent
    /// until the first step has persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_step: Option<Checkpoint>,
    /// One entry per completed step, keyed by step name.
    #[serde(default)]
    pub steps: BTreeMap<StepName, StepOutcome>,
    /// Whole-workflow failure counter, bounded by configuration.
    #[serde(default)]
    pub attempts: u32,
}

impl MigrationRecord {
    pub fn is_done(&self) -> bool {
        matches!(self.last_step, Some(Checkpoint::Done))
    }

    /// A held lock with an expired (or missing) lease belongs to a worker
    /// that crashed mid-flight and can be reclaimed.
    pub fn lock_is_stale(&self, lease: chrono::Duration) -> bool {
        if !self.lock {
            return false;
        }
        match self.locked_at {
            Some(at) => Utc::now().signed_duration_since(at) > lease,
            None => true,
        }
    }

    /// A lock that is held and whose lease is still fresh.
    pub fn lock_is_held(&self, lease: chrono::Duration) -> bool {
        self.lock && !self.lock_is_stale(lease)
    }
}

/// Amounts pulled out of the curve during the withdraw step, parsed from the
/// program logs of the withdraw transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawnAmounts {
    pub sol: u64,
    pub tokens: u64,
}

/// Addresses of the created AMM pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAddresses {
    pub id: String,
    pub lp_mint: String,
    pub base_vault: String,
    pub quote_vault: String,
}

/// The migratable entity. Created `Active` by an unrelated subsystem,
/// mutated step-by-step by the executor, `Locked` once the final step
/// commits. Never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub mint: Mint,
    pub name: String,
    pub ticker: String,
    pub creator: String,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_lamport: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_amounts: Option<WithdrawnAmounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_info: Option<PoolAddresses>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft_minted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_amount: Option<String>,
    #[serde(default)]
    pub migration: MigrationRecord,
}

impl Token {
    pub fn new(mint: impl Into<Mint>, name: &str, ticker: &str, creator: &str) -> Self {
        let now = Utc::now();
        Token {
            mint: mint.into(),
            name: name.to_string(),
            ticker: ticker.to_string(),
            creator: creator.to_string(),
            status: TokenStatus::Active,
            created_at: now,
            last_updated: now,
            withdrawn_at: None,
            migrated_at: None,
            locked_at: None,
            completed_at: None,
            reserve_amount: None,
            reserve_lamport: None,
            withdrawn_amounts: None,
            market_id: None,
            pool_info: None,
            lock_id: None,
            nft_minted: None,
            locked_amount: None,
            migration: MigrationRecord::default(),
        }
    }

    /// Notification room scoped to this token.
    pub fn room(&self) -> String {
        format!("token-{}", self.mint)
    }

    /// Apply a partial update. Only fields present in the patch are touched
    /// (last-write-wins); `last_updated` is always bumped.
    pub fn apply_patch(&mut self, patch: &TokenPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(at) = patch.withdrawn_at {
            self.withdrawn_at = Some(at);
        }
        if let Some(at) = patch.migrated_at {
            self.migrated_at = Some(at);
        }
        if let Some(at) = patch.locked_at {
            self.locked_at = Some(at);
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(amounts) = patch.withdrawn_amounts {
            self.withdrawn_amounts = Some(amounts);
        }
        if let Some(market_id) = &patch.market_id {
            self.market_id = Some(market_id.clone());
        }
        if let Some(pool_info) = &patch.pool_info {
            self.pool_info = Some(pool_info.clone());
        }
        if let Some(lock_id) = &patch.lock_id {
            self.lock_id = Some(lock_id.clone());
        }
        if let Some(nft_minted) = &patch.nft_minted {
            self.nft_minted = Some(nft_minted.clone());
        }
        if let Some(locked_amount) = &patch.locked_amount {
            self.locked_amount = Some(locked_amount.clone());
        }
        if let Some(migration) = &patch.migration {
            self.migration = migration.clone();
        }
        self.last_updated = Utc::now();
    }
}

/// Typed partial update for a token row. Replaces the dynamic field-bag
/// merge: every mergeable field is named here, so a colliding write is a
/// compile error rather than a silent overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPatch {
    pub status: Option<TokenStatus>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub migrated_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub withdrawn_amounts: Option<WithdrawnAmounts>,
    pub market_id: Option<String>,
    pub pool_info: Option<PoolAddresses>,
    pub lock_id: Option<String>,
    pub nft_minted: Option<String>,
    pub locked_amount: Option<String>,
    pub migration: Option<MigrationRecord>,
}

impl TokenPatch {
    pub fn status(status: TokenStatus) -> Self {
        TokenPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn migration(record: MigrationRecord) -> Self {
        TokenPatch {
            migration: Some(record),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_sequence_order_and_successors() {
        assert_eq!(StepName::Withdraw.position(), 0);
        assert_eq!(StepName::Withdraw.next(), Some(StepName::CreatePool));
        assert_eq!(StepName::Finalize.next(), Some(StepName::CollectFees));
        assert_eq!(StepName::CollectFees.next(), None);
        assert!(StepName::CollectFees.is_last());
    }

    #[test]
    fn checkpoint_serializes_as_bare_string() {
        let step = serde_json::to_string(&Checkpoint::Step(StepName::CreatePool)).unwrap();
        assert_eq!(step, "\"createPool\"");
        let done = serde_json::to_string(&Checkpoint::Done).unwrap();
        assert_eq!(done, "\"done\"");

        let parsed: Checkpoint = serde_json::from_str("\"lockLP\"").unwrap();
        assert_eq!(parsed, Checkpoint::Step(StepName::LockLp));
        let parsed: Checkpoint = serde_json::from_str("\"done\"").unwrap();
        assert!(parsed.is_done());
    }

    #[test]
    fn step_names_keep_their_wire_spelling() {
        let expected = [
            "withdraw",
            "createPool",
            "lockLP",
            "sendNft",
            "depositNft",
            "finalize",
            "collectFees",
        ];
        for (step, wire) in StepName::SEQUENCE.iter().zip(expected) {
            assert_eq!(step.as_str(), wire);
            assert_eq!(serde_json::to_string(step).unwrap(), format!("\"{wire}\""));
        }
        // Map keys in the persisted record use the same spelling.
        let mut steps = BTreeMap::new();
        steps.insert(StepName::LockLp, StepOutcome::success("tx-l"));
        let json = serde_json::to_string(&steps).unwrap();
        assert!(json.contains("\"lockLP\""));
        // Operator input stays forgiving about case.
        assert_eq!("locklp".parse::<StepName>().unwrap(), StepName::LockLp);
    }

    #[test]
    fn patch_overwrites_only_present_fields() {
        let mut token = Token::new("MintA", "Token A", "TKA", "creator-1");
        token.market_id = Some("pool-1".to_string());

        let patch = TokenPatch {
            nft_minted: Some("nft-a,nft-b".to_string()),
            status: Some(TokenStatus::Migrating),
            ..Default::default()
        };
        token.apply_patch(&patch);

        assert_eq!(token.nft_minted.as_deref(), Some("nft-a,nft-b"));
        assert_eq!(token.status, TokenStatus::Migrating);
        // Untouched fields survive.
        assert_eq!(token.market_id.as_deref(), Some("pool-1"));
    }

    #[test]
    fn stale_lock_detection() {
        let lease = chrono::Duration::seconds(60);
        let mut record = MigrationRecord::default();
        assert!(!record.lock_is_stale(lease));

        record.lock = true;
        record.locked_at = Some(Utc::now());
        assert!(!record.lock_is_stale(lease));
        assert!(record.lock_is_held(lease));

        record.locked_at = Some(Utc::now() - chrono::Duration::seconds(120));
        assert!(record.lock_is_stale(lease));
        assert!(!record.lock_is_held(lease));

        // A lock with no lease timestamp cannot be verified fresh.
        record.locked_at = None;
        assert!(record.lock_is_stale(lease));
    }

    #[test]
    fn migration_record_round_trips_through_json() {
        let mut record = MigrationRecord {
            lock: true,
            locked_at: Some(Utc::now()),
            last_step: Some(Checkpoint::Step(StepName::SendNft)),
            steps: BTreeMap::new(),
            attempts: 2,
        };
        record
            .steps
            .insert(StepName::Withdraw, StepOutcome::success("sig-1"));
        record
            .steps
            .insert(StepName::CreatePool, StepOutcome::success("sig-2"));

        let json = serde_json::to_string(&record).unwrap();
        let parsed: MigrationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.steps.len(), 2);
    }
}
