use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::api;
use crate::application::BalanceEngine;
use crate::config::Settings;
use crate::domain::{Cents, Operation};
use crate::storage;

/// Wallet ledger - serializable per-account balances
#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "Per-account wallet balances with serializable deposit/withdraw operations")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve,

    /// Create the database schema
    Init,

    /// Deposit into a wallet (created on first use)
    Deposit {
        /// Wallet ID (UUID)
        wallet: String,

        /// Amount in the smallest currency unit
        #[arg(allow_negative_numbers = true)]
        amount: Cents,
    },

    /// Withdraw from a wallet
    Withdraw {
        /// Wallet ID (UUID)
        wallet: String,

        /// Amount in the smallest currency unit
        #[arg(allow_negative_numbers = true)]
        amount: Cents,
    },

    /// Show a wallet's balance
    Balance {
        /// Wallet ID (UUID)
        wallet: String,
    },

    /// Verify a wallet's balance against its ledger
    Check {
        /// Wallet ID (UUID)
        wallet: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let store = storage::connect(&self.settings)
            .await
            .with_context(|| format!("Failed to open database {}", self.settings.database_url))?;

        if matches!(self.command, Commands::Init) {
            println!("Database initialized: {}", self.settings.database_url);
            return Ok(());
        }

        let engine = BalanceEngine::new(store, self.settings.engine_config());

        match self.command {
            Commands::Init => {}

            Commands::Serve => serve(engine, &self.settings).await?,

            Commands::Deposit { wallet, amount } => {
                let operation = Operation::deposit(parse_wallet_id(&wallet)?, amount)?;
                let entry = engine.apply_operation(&operation).await?;
                println!(
                    "Deposited {} into {} (balance {}, entry {})",
                    entry.amount, entry.account_id, entry.balance_after, entry.id
                );
            }

            Commands::Withdraw { wallet, amount } => {
                let operation = Operation::withdraw(parse_wallet_id(&wallet)?, amount)?;
                let entry = engine.apply_operation(&operation).await?;
                println!(
                    "Withdrew {} from {} (balance {}, entry {})",
                    entry.amount, entry.account_id, entry.balance_after, entry.id
                );
            }

            Commands::Balance { wallet } => {
                let wallet_id = parse_wallet_id(&wallet)?;
                let balance = engine.get_balance(wallet_id).await?;
                println!("{}: {}", wallet_id, balance);
            }

            Commands::Check { wallet } => {
                let report = engine.verify_account(parse_wallet_id(&wallet)?).await?;

                println!("Wallet:          {}", report.account_id);
                println!("Stored balance:  {}", report.stored_balance);
                println!("Ledger balance:  {}", report.replayed_balance);
                println!("Entries:         {}", report.entry_count);
                println!();

                if report.is_healthy() {
                    println!("Ledger is consistent.");
                } else {
                    println!("Issues found:");
                    for issue in &report.issues {
                        println!("  - {}", issue);
                    }
                    anyhow::bail!("Ledger integrity check failed");
                }
            }
        }

        Ok(())
    }
}

fn parse_wallet_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid wallet ID '{}' (expected UUID)", s))
}

async fn serve(engine: BalanceEngine, settings: &Settings) -> Result<()> {
    let app = api::router(engine);
    let address = settings.bind_address();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server exited properly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("server is shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deposit_command() {
        let cli = Cli::parse_from([
            "wallet-ledger",
            "--database-url",
            "sqlite:cli.db",
            "deposit",
            "9b2f7c1e-4d1a-4b8e-9c3f-2a6d5e7f8a90",
            "1000",
        ]);
        assert_eq!(cli.settings.database_url, "sqlite:cli.db");
        match cli.command {
            Commands::Deposit { wallet, amount } => {
                assert_eq!(amount, 1000);
                assert!(parse_wallet_id(&wallet).is_ok());
            }
            _ => panic!("expected deposit command"),
        }
    }

    #[test]
    fn test_invalid_wallet_id() {
        assert!(parse_wallet_id("not-a-uuid").is_err());
    }
}
