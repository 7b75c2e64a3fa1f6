use anyhow::Result;
use clap::Parser;
use wallet_ledger::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    wallet_ledger::observability::init();
    let cli = Cli::parse();
    cli.run().await
}
