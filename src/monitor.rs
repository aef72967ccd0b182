// Post-graduation monitoring registration. Invoked best-effort at terminal
// completion; a failure here never rolls back the terminal state.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use crate::token::{Mint, Token};

#[async_trait]
pub trait PoolMonitor: Send + Sync {
    async fn register(&self, token: &Token) -> Result<()>;
}

/// Default monitor: logs the registration and does nothing else.
#[derive(Debug, Default)]
pub struct LogMonitor;

#[async_trait]
impl PoolMonitor for LogMonitor {
    async fn register(&self, token: &Token) -> Result<()> {
        info!(
            mint = %token.mint,
            market_id = token.market_id.as_deref().unwrap_or("unknown"),
            "Registered graduated token for monitoring"
        );
        Ok(())
    }
}

/// Recording monitor for tests.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    registered: Mutex<Vec<Mint>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<Mint> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolMonitor for RecordingMonitor {
    async fn register(&self, token: &Token) -> Result<()> {
        self.registered.lock().unwrap().push(token.mint.clone());
        Ok(())
    }
}
