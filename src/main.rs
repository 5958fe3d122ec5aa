use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payswitch_core::cli::{self, Cli, Commands, DbCommands};
use payswitch_core::config::{self, Config, LogFormat};
use payswitch_core::{create_app, db, startup};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(config::log_format_from_env());

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Reconcile { limit } => cli::handle_reconcile(&config, limit).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let state = cli::build_state(&config, pool.clone());

    let report = startup::validate_environment(&config, &pool, state.store.as_ref()).await?;
    for error in &report.errors {
        tracing::warn!("Startup check: {}", error);
    }
    if !report.database {
        anyhow::bail!("Database is not ready");
    }

    let _refresher = state
        .processors
        .clone()
        .start(state.store.clone(), config.processor_refresh)
        .await;
    tracing::info!("Processor registry started: {:?}", state.processors.names());

    let schedule = config.schedule()?;
    let reconciler = state.reconciler.as_ref().clone();
    tokio::spawn(reconciler.run_scheduler(schedule, config.reconcile_batch_size));

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
