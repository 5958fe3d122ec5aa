use clap::{Parser, Subcommand};
use sqlx::PgPool;
use std::sync::Arc;

use crate::adapters::PostgresLedgerStore;
use crate::config::Config;
use crate::envelope::BankCipher;
use crate::ports::LedgerStore;
use crate::processors::ProcessorRegistry;
use crate::services::{reconciliation::DISPATCH_GRACE_MARGIN, CallbackNotifier};
use crate::AppState;

#[derive(Parser)]
#[command(name = "payswitch-core")]
#[command(about = "Payswitch Core - merchant payout and collection switch", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Run one reconciliation pass and exit
    Reconcile {
        /// Maximum number of open orders to re-query
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the masked configuration and validate it
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

/// Builds the application state over Postgres with an empty processor registry.
pub fn build_state(config: &Config, pool: PgPool) -> AppState {
    let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool));
    let processors = Arc::new(ProcessorRegistry::new(config.processor_timeout));

    AppState::new(
        store,
        processors,
        BankCipher::new(config.bank_passphrase.clone()),
        CallbackNotifier::new(config.processor_timeout, config.callback_signing_secret.clone()),
        config.admin_api_key.clone(),
    )
    .with_dispatch_grace(config.processor_timeout + DISPATCH_GRACE_MARGIN)
}

pub async fn handle_reconcile(config: &Config, limit: Option<i64>) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let state = build_state(config, pool);
    let loaded = state.processors.reload_once(state.store.as_ref()).await?;
    tracing::info!("Loaded {} active processor(s)", loaded);
    let batch = limit.filter(|l| *l > 0).unwrap_or(config.reconcile_batch_size);
    let report = state.reconciler.run_once(batch).await?;

    println!("Reconciliation pass complete:");
    println!("  Examined:    {}", report.examined);
    println!("  Finalized:   {}", report.finalized);
    println!("  Compensated: {}", report.compensated);
    println!("  Pending:     {}", report.pending);
    println!("  Errors:      {}", report.errors);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  Bank Passphrase: {}", mask_secret(&config.bank_passphrase));
    println!("  Admin API Key: {}", mask_secret(&config.admin_api_key));
    println!("  Processor Timeout: {}s", config.processor_timeout.as_secs());
    println!("  Processor Refresh: {}s", config.processor_refresh.as_secs());
    println!("  Reconcile Schedule: {}", config.reconcile_schedule);
    println!("  Reconcile Batch Size: {}", config.reconcile_batch_size);
    println!(
        "  Callback Signing: {}",
        if config.callback_signing_secret.is_some() { "enabled" } else { "disabled" }
    );

    let pool = crate::db::create_pool(config).await?;
    let store = PostgresLedgerStore::new(pool.clone());
    let report = crate::startup::validate_environment(config, &pool, &store).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }
    println!("Configuration is valid");
    Ok(())
}

fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "****".to_string();
    }
    let head: String = secret.chars().take(2).collect();
    format!("{}****", head)
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password_hides_credentials() {
        assert_eq!(
            mask_password("postgres://payswitch:hunter2@db:5432/payswitch"),
            "postgres://payswitch:****@db:5432/payswitch"
        );
        assert_eq!(mask_password("postgres://db/payswitch"), "postgres://db/payswitch");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("supersecret"), "su****");
    }

    #[test]
    fn test_cli_parses_reconcile_limit() {
        let cli = Cli::try_parse_from(["payswitch-core", "reconcile", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Reconcile { limit: Some(5) })));

        let cli = Cli::try_parse_from(["payswitch-core"]).unwrap();
        assert!(cli.command.is_none());
    }
}
