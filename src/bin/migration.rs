use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kirim_barang::{config, db, migrator::Migrator};
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Schema management for the transfer database.
#[derive(Parser, Debug)]
#[command(name = "migration", version, about = "Apply or roll back kirim-barang migrations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations
    Up {
        #[arg(long, help = "Apply at most this many migrations")]
        steps: Option<u32>,
    },
    /// Roll back applied migrations
    Down {
        #[arg(long, default_value_t = 1, help = "Number of migrations to roll back")]
        steps: u32,
    },
    /// Print applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    match cli.command.unwrap_or(Command::Up { steps: None }) {
        Command::Up { steps } => {
            info!("Applying migrations");
            Migrator::up(&pool, steps).await.context("migration failed")?;
            info!("Migration completed successfully");
        }
        Command::Down { steps } => {
            info!(steps, "Rolling back migrations");
            Migrator::down(&pool, Some(steps))
                .await
                .context("rollback failed")?;
            info!("Rollback completed successfully");
        }
        Command::Status => {
            Migrator::status(&pool)
                .await
                .context("failed to read migration status")?;
        }
    }

    db::close_pool(pool).await?;
    Ok(())
}
