use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

use crate::config::Config;
use crate::ports::LedgerStore;
use crate::processors::registry::build_adapter;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub processors: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.processors
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database & Migrations: {}", status(self.database));
        println!("Processor Configs:     {}", status(self.processors));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "PASS" } else { "FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "OK" } else { "FAIL" }
}

pub async fn validate_environment(
    config: &Config,
    pool: &PgPool,
    store: &dyn LedgerStore,
) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        processors: true,
        errors: Vec::new(),
    };

    if let Err(e) = config.validate() {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {:#}", e));
    }

    // Processor configs live in the database, so this needs it reachable.
    if report.database {
        match validate_processors(store, config.processor_timeout).await {
            Ok(errors) if errors.is_empty() => {}
            Ok(errors) => {
                report.processors = false;
                report
                    .errors
                    .extend(errors.into_iter().map(|e| format!("Processor: {}", e)));
            }
            Err(e) => {
                report.processors = false;
                report.errors.push(format!("Processor: {:#}", e));
            }
        }
    } else {
        report.processors = false;
    }

    Ok(report)
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Every active processor must build into an adapter.
async fn validate_processors(store: &dyn LedgerStore, timeout: Duration) -> Result<Vec<String>> {
    let configs = store
        .processors()
        .await
        .context("Failed to load processor configs")?;
    Ok(configs
        .iter()
        .filter(|c| c.is_active)
        .filter_map(|c| build_adapter(c, timeout).err())
        .map(|e| e.to_string())
        .collect())
}
