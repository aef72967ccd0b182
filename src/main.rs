use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use graduator::config::{config, init_config, GraduatorConfig};
use graduator::store::{JsonFileStore, TokenStore};
use graduator::telemetry::init_telemetry;
use graduator::token::{Checkpoint, Mint, StepName, Token, TokenPatch, TokenStatus};

#[derive(Parser)]
#[command(name = "graduator")]
#[command(about = "Operator console for the bonding-curve graduation engine")]
#[command(
    long_about = "Inspect and repair token graduation state: show a token's checkpoint and \
                  step outcomes, list in-flight migrations, clear a stuck lock, or rewind a \
                  checkpoint after manual on-chain intervention."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default graduator.toml to the current directory
    Init {
        /// Overwrite an existing graduator.toml
        #[arg(long, help = "Overwrite an existing graduator.toml")]
        force: bool,
    },
    /// Show a token's migration state: status, checkpoint, lock, step outcomes
    Status {
        /// Mint address of the token
        mint: String,
    },
    /// List all tokens currently mid-migration
    List,
    /// Clear a stuck migration lock (only do this when no worker is live)
    Unlock {
        /// Mint address of the token
        mint: String,
    },
    /// Rewind the checkpoint so the workflow re-runs from a given step
    Reset {
        /// Mint address of the token
        mint: String,
        /// Step to resume from; omits the checkpoint entirely when absent
        #[arg(long, help = "Step name to resume from (e.g. createPool)")]
        to: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init must work before any configuration exists.
    if let Commands::Init { force } = &cli.command {
        return init_command(*force);
    }

    init_config()?;
    let settings = config()?;
    init_telemetry(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;

    let store = JsonFileStore::new(settings.store.path.clone());

    match cli.command {
        Commands::Init { .. } => unreachable!("handled before configuration load"),
        Commands::Status { mint } => {
            tokio::runtime::Runtime::new()?.block_on(async { status_command(&store, mint).await })
        }
        Commands::List => {
            tokio::runtime::Runtime::new()?.block_on(async { list_command(&store).await })
        }
        Commands::Unlock { mint } => {
            tokio::runtime::Runtime::new()?.block_on(async { unlock_command(&store, mint).await })
        }
        Commands::Reset { mint, to } => {
            tokio::runtime::Runtime::new()?.block_on(async { reset_command(&store, mint, to).await })
        }
    }
}

fn init_command(force: bool) -> Result<()> {
    if Path::new("graduator.toml").exists() && !force {
        anyhow::bail!("graduator.toml already exists (use --force to overwrite)");
    }

    GraduatorConfig::default().save_to_file("graduator.toml")?;
    println!("📝 Wrote default configuration to graduator.toml");
    println!("   Fill in pool.fee_wallet and pool.manager_multisig before running migrations.");
    Ok(())
}

async fn load_token(store: &JsonFileStore, mint: &Mint) -> Result<Token> {
    store
        .get(mint)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no token found for mint {mint}"))
}

async fn status_command(store: &JsonFileStore, mint: String) -> Result<()> {
    let token = load_token(store, &Mint::new(mint)).await?;

    println!("🪙 {} ({} / {})", token.mint, token.name, token.ticker);
    println!("   Status:     {}", token.status);
    println!(
        "   Checkpoint: {}",
        token
            .migration
            .last_step
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unset".to_string())
    );
    println!(
        "   Lock:       {}",
        if token.migration.lock {
            match token.migration.locked_at {
                Some(at) => format!("held since {at}"),
                None => "held (no lease timestamp)".to_string(),
            }
        } else {
            "free".to_string()
        }
    );
    println!("   Attempts:   {}", token.migration.attempts);
    if let Some(market_id) = &token.market_id {
        println!("   Pool:       {market_id}");
    }

    if token.migration.steps.is_empty() {
        println!("   No steps committed yet");
    } else {
        println!("   Committed steps:");
        for name in StepName::SEQUENCE {
            if let Some(outcome) = token.migration.steps.get(&name) {
                println!("     ✅ {:<12} tx: {}", name.to_string(), outcome.tx_id);
            }
        }
    }
    Ok(())
}

async fn list_command(store: &JsonFileStore) -> Result<()> {
    let migrating = store.list_by_status(TokenStatus::Migrating).await?;
    let failed = store.list_by_status(TokenStatus::MigrationFailed).await?;

    if migrating.is_empty() && failed.is_empty() {
        println!("📋 No in-flight or failed migrations");
        return Ok(());
    }

    if !migrating.is_empty() {
        println!("🔄 Migrating:");
        for token in &migrating {
            let checkpoint = token
                .migration
                .last_step
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unset".to_string());
            let lock = if token.migration.lock { "🔒" } else { "  " };
            println!(
                "   {lock} {:<44} checkpoint: {:<12} attempts: {}",
                token.mint.to_string(),
                checkpoint,
                token.migration.attempts
            );
        }
    }

    if !failed.is_empty() {
        println!("💀 Dead-lettered (attempt budget exhausted):");
        for token in &failed {
            println!(
                "      {:<44} checkpoint: {}",
                token.mint.to_string(),
                token
                    .migration
                    .last_step
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unset".to_string())
            );
        }
    }
    Ok(())
}

async fn unlock_command(store: &JsonFileStore, mint: String) -> Result<()> {
    let mint = Mint::new(mint);
    let token = load_token(store, &mint).await?;

    if !token.migration.lock {
        println!("ℹ️  {mint} is not locked");
        return Ok(());
    }

    let mut migration = token.migration.clone();
    migration.lock = false;
    migration.locked_at = None;
    store.update(&mint, TokenPatch::migration(migration)).await?;
    println!("🔓 Cleared migration lock for {mint}");
    println!("   The next sweep will pick the token up if it is still migrating.");
    Ok(())
}

async fn reset_command(store: &JsonFileStore, mint: String, to: Option<String>) -> Result<()> {
    let mint = Mint::new(mint);
    let token = load_token(store, &mint).await?;

    let checkpoint = match &to {
        Some(raw) => {
            let step: StepName = raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            Some(Checkpoint::Step(step))
        }
        None => None,
    };

    let mut migration = token.migration.clone();
    migration.last_step = checkpoint;
    migration.lock = false;
    migration.locked_at = None;
    migration.attempts = 0;
    // Outcomes from the rewound step onward no longer reflect the resume
    // point; drop them so the record stays consistent with the checkpoint.
    if let Some(Checkpoint::Step(step)) = checkpoint {
        migration.steps.retain(|name, _| name.position() < step.position());
    } else {
        migration.steps.clear();
    }

    let mut patch = TokenPatch::migration(migration);
    patch.status = Some(TokenStatus::Migrating);
    store.update(&mint, patch).await?;

    match checkpoint {
        Some(c) => println!("⏪ Reset {mint} to checkpoint {c} (status: migrating)"),
        None => println!("⏪ Reset {mint} to the beginning of the workflow (status: migrating)"),
    }
    println!("   Re-run or wait for the sweep to resume it.");
    Ok(())
}
