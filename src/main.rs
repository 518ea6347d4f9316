use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::adapters::PostgresLedgerStore;
use wallet_ledger::cli::{self, Cli, Commands, DbCommands, TxCommands, WalletCommands};
use wallet_ledger::config::{Config, LogFormat};
use wallet_ledger::{create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    match args.command {
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Tx(command) => {
            let pool = db::create_pool(&config).await?;
            let app = create_app(&config, Arc::new(PostgresLedgerStore::new(pool)))?;
            match command {
                TxCommands::Create(create) => cli::handle_tx_create(&app, create).await,
                TxCommands::Status {
                    tx_id,
                    status,
                    order_id,
                } => cli::handle_tx_status(&app, tx_id, status, order_id).await,
                TxCommands::ForceComplete { tx_id } => {
                    cli::handle_tx_force_complete(&app, tx_id).await
                }
                TxCommands::Show { tx_id } => cli::handle_tx_show(&app, tx_id).await,
            }
        }
        Commands::Wallet(WalletCommands::Show { user_id }) => {
            let pool = db::create_pool(&config).await?;
            let app = create_app(&config, Arc::new(PostgresLedgerStore::new(pool)))?;
            cli::handle_wallet_show(&app, user_id).await
        }
    }
}
