use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the graduator service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraduatorConfig {
    /// Workflow engine settings
    pub migration: MigrationConfig,
    /// Pool creation and liquidity lock settings
    pub pool: PoolConfig,
    /// Persistent store settings
    pub store: StoreConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    /// Per-step retry attempts (total invocations, not re-tries)
    pub step_retry_attempts: u32,
    /// Fixed delay between step retry attempts in milliseconds
    pub step_retry_delay_ms: u64,
    /// Delay before a rescheduled workflow invocation in milliseconds
    pub reschedule_delay_ms: u64,
    /// Whole-workflow failure budget before the token is dead-lettered
    pub max_workflow_attempts: u32,
    /// Lock lease duration in seconds; older locks are reclaimable
    pub lock_lease_seconds: u64,
    /// Interval between sweep ticks in seconds
    pub sweep_interval_seconds: u64,
    /// Maximum tokens re-invoked per sweep tick
    pub sweep_batch_size: usize,
}

impl MigrationConfig {
    pub fn step_retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(
            self.step_retry_attempts,
            Duration::from_millis(self.step_retry_delay_ms),
        )
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_millis(self.reschedule_delay_ms)
    }

    pub fn lock_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_lease_seconds as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Share of the LP balance locked with the protocol as claimer
    pub primary_lock_percentage: u64,
    /// Share of the LP balance locked for the manager multisig
    pub secondary_lock_percentage: u64,
    /// Protocol fee in lamports withheld from the withdrawn reserves
    pub fixed_fee_lamports: u64,
    /// Wallet receiving the protocol fee
    pub fee_wallet: String,
    /// Multisig receiving the secondary custody NFT
    pub manager_multisig: String,
}

impl PoolConfig {
    /// The two lock shares must account for the whole LP balance.
    pub fn validate(&self) -> Result<()> {
        if self.primary_lock_percentage + self.secondary_lock_percentage != 100 {
            anyhow::bail!(
                "lock percentages must sum to 100, got {} + {}",
                self.primary_lock_percentage,
                self.secondary_lock_percentage
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding the token rows and fee ledger
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for GraduatorConfig {
    fn default() -> Self {
        Self {
            migration: MigrationConfig {
                step_retry_attempts: 3,
                step_retry_delay_ms: 2000,
                reschedule_delay_ms: 1000,
                max_workflow_attempts: 10,
                lock_lease_seconds: 300,
                sweep_interval_seconds: 120,
                sweep_batch_size: 20,
            },
            pool: PoolConfig {
                primary_lock_percentage: 90,
                secondary_lock_percentage: 10,
                fixed_fee_lamports: 6_000_000_000,
                fee_wallet: String::new(),
                manager_multisig: String::new(),
            },
            store: StoreConfig {
                path: ".graduator/tokens".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl GraduatorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. graduator.toml, if present
    /// 3. Environment variables (prefixed with GRADUATOR_)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&GraduatorConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("graduator.toml").exists() {
            builder = builder.add_source(File::with_name("graduator"));
        }

        builder = builder.add_source(
            Environment::with_prefix("GRADUATOR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let loaded: GraduatorConfig = config.try_deserialize()?;
        loaded.pool.validate()?;
        Ok(loaded)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<GraduatorConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = GraduatorConfig::load_env_file();
        GraduatorConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static GraduatorConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GraduatorConfig::default();
        assert!(config.pool.validate().is_ok());
        assert_eq!(config.migration.step_retry_attempts, 3);
        assert_eq!(config.migration.step_retry_delay_ms, 2000);
    }

    #[test]
    fn save_to_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graduator.toml");

        let config = GraduatorConfig::default();
        config.save_to_file(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let reloaded: GraduatorConfig = toml::from_str(&raw).unwrap();
        assert_eq!(
            reloaded.migration.max_workflow_attempts,
            config.migration.max_workflow_attempts
        );
        assert_eq!(
            reloaded.pool.fixed_fee_lamports,
            config.pool.fixed_fee_lamports
        );
        assert_eq!(reloaded.store.path, config.store.path);
    }

    #[test]
    fn mismatched_lock_percentages_rejected() {
        let mut pool = GraduatorConfig::default().pool;
        pool.primary_lock_percentage = 80;
        assert!(pool.validate().is_err());
    }
}
