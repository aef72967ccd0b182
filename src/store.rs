// Persistent store contract and implementations.
//
// The engine only depends on the read/write contract: point reads, partial
// updates that never clobber untouched fields, a status scan for the sweep,
// and an append-only fee ledger. The in-memory store backs tests and single
// process wiring; the JSON file store gives operators a durable, greppable
// trail across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::token::{Mint, Token, TokenPatch, TokenStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token not found: {0}")]
    NotFound(Mint),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Migration,
}

/// Protocol fee collected during graduation, recorded for accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecord {
    pub tx_id: String,
    pub mint: Mint,
    pub sol_amount: u64,
    pub token_amount: u64,
    pub kind: FeeKind,
    pub timestamp: DateTime<Utc>,
}

impl FeeRecord {
    pub fn migration(tx_id: impl Into<String>, mint: Mint, sol_amount: u64) -> Self {
        FeeRecord {
            tx_id: tx_id.into(),
            mint,
            sol_amount,
            token_amount: 0,
            kind: FeeKind::Migration,
            timestamp: Utc::now(),
        }
    }
}

/// Read/write contract over the token rows. Partial updates are
/// last-write-wins on the fields touched and never clobber the rest.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, mint: &Mint) -> Result<Option<Token>, StoreError>;

    async fn insert(&self, token: Token) -> Result<(), StoreError>;

    async fn update(&self, mint: &Mint, patch: TokenPatch) -> Result<Token, StoreError>;

    async fn list_by_status(&self, status: TokenStatus) -> Result<Vec<Token>, StoreError>;

    async fn record_fee(&self, fee: FeeRecord) -> Result<(), StoreError>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<Mint, Token>>,
    fees: RwLock<Vec<FeeRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fees(&self) -> Vec<FeeRecord> {
        self.fees.read().await.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, mint: &Mint) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.read().await.get(mint).cloned())
    }

    async fn insert(&self, token: Token) -> Result<(), StoreError> {
        self.tokens.write().await.insert(token.mint.clone(), token);
        Ok(())
    }

    async fn update(&self, mint: &Mint, patch: TokenPatch) -> Result<Token, StoreError> {
        let mut tokens = self.tokens.write().await;
        let token = tokens
            .get_mut(mint)
            .ok_or_else(|| StoreError::NotFound(mint.clone()))?;
        token.apply_patch(&patch);
        Ok(token.clone())
    }

    async fn list_by_status(&self, status: TokenStatus) -> Result<Vec<Token>, StoreError> {
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn record_fee(&self, fee: FeeRecord) -> Result<(), StoreError> {
        self.fees.write().await.push(fee);
        Ok(())
    }
}

/// One JSON file per token plus an append-style fee ledger. Not safe for
/// concurrent multi-process writers; single-orchestrator deployments only.
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            directory: directory.into(),
        }
    }

    fn token_path(&self, mint: &Mint) -> PathBuf {
        self.directory.join(format!("{mint}.json"))
    }

    fn fees_path(&self) -> PathBuf {
        self.directory.join("fees.json")
    }

    async fn ensure_directory(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory).await?;
        Ok(())
    }

    async fn read_token(&self, path: &Path) -> Result<Option<Token>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_token(&self, token: &Token) -> Result<(), StoreError> {
        self.ensure_directory().await?;
        let path = self.token_path(&token.mint);
        let json = serde_json::to_vec_pretty(token)?;
        fs::write(&path, json).await?;
        debug!(mint = %token.mint, path = %path.display(), "Persisted token row");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for JsonFileStore {
    async fn get(&self, mint: &Mint) -> Result<Option<Token>, StoreError> {
        self.read_token(&self.token_path(mint)).await
    }

    async fn insert(&self, token: Token) -> Result<(), StoreError> {
        self.write_token(&token).await
    }

    async fn update(&self, mint: &Mint, patch: TokenPatch) -> Result<Token, StoreError> {
        let mut token = self
            .get(mint)
            .await?
            .ok_or_else(|| StoreError::NotFound(mint.clone()))?;
        token.apply_patch(&patch);
        self.write_token(&token).await?;
        Ok(token)
    }

    async fn list_by_status(&self, status: TokenStatus) -> Result<Vec<Token>, StoreError> {
        let mut tokens = Vec::new();
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(tokens),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some("fees.json") {
                continue;
            }
            if let Some(token) = self.read_token(&path).await? {
                if token.status == status {
                    tokens.push(token);
                }
            }
        }
        Ok(tokens)
    }

    async fn record_fee(&self, fee: FeeRecord) -> Result<(), StoreError> {
        self.ensure_directory().await?;
        let path = self.fees_path();
        let mut fees: Vec<FeeRecord> = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        fees.push(fee);
        fs::write(&path, serde_json::to_vec_pretty(&fees)?).await?;
        Ok(())
    }
}
