use clap::{Parser, Subcommand};
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{error, info};

use storefront_api::migrator::Migrator;

/// Schema migrations for the storefront database
#[derive(Debug, Parser)]
#[command(name = "migration", version, about)]
struct Cli {
    /// Overrides the configured database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<MigrationCommand>,
}

#[derive(Debug, Subcommand)]
enum MigrationCommand {
    /// Apply pending migrations (default)
    Up {
        /// Number of migrations to apply
        #[arg(short, long)]
        steps: Option<u32>,
    },
    /// Roll back applied migrations
    Down {
        /// Number of migrations to roll back
        #[arg(short, long, default_value_t = 1)]
        steps: u32,
    },
    /// Drop every table and re-apply all migrations
    Fresh,
    /// Show applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let database_url = match cli.database_url {
        Some(url) => url,
        None => storefront_api::config::load_config()?.database_url,
    };
    storefront_api::config::init_tracing("info", false);

    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;

    let result = match cli.command.unwrap_or(MigrationCommand::Up { steps: None }) {
        MigrationCommand::Up { steps } => Migrator::up(&db, steps).await,
        MigrationCommand::Down { steps } => Migrator::down(&db, Some(steps)).await,
        MigrationCommand::Fresh => Migrator::fresh(&db).await,
        MigrationCommand::Status => Migrator::status(&db).await,
    };

    if let Err(err) = result {
        error!(error = %err, "migration failed");
        return Err(err.into());
    }

    info!("Migration command completed");
    Ok(())
}
