use clap::Parser;
use library_migration::cli::{Cli, Command};
use library_migration::config::Config;
use library_migration::prelude::*;
use library_migration::store::TargetStore;
use library_migration::store::document::DocumentSource;
use library_migration::store::postgres::{PgJobRepository, PgTarget};
use library_migration::telemetry;
use std::sync::Arc;
use tracing::Level;

/// The main entry point for the migration utility.
///
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    let subscriber = telemetry::get_subscriber(Level::INFO, std::io::stderr);
    telemetry::init_subscriber(subscriber)?;
    tracing::info!("Logger ready.");

    let cli = Cli::parse();
    tracing::debug!(?cli, "Cli arguments parsed.");

    let config = Config::load(&cli.overrides)?;
    let target = PgTarget::connect(&config.target_url).await?;

    match cli.command {
        Command::Start => {
            let source = DocumentSource::new(&config.source_dir);
            let repository = PgJobRepository::new(target.pool().clone());
            let mut orchestrator = Orchestrator::new(
                Arc::new(source),
                Arc::new(target),
                Arc::new(repository),
                config.job_settings(),
            )?;

            let result = orchestrator.run().await;
            println!("{result}");
            result.into_result()?;
        }
        Command::Show { kind } => {
            for row in target.fetch_rows(kind).await? {
                println!("{row}");
            }
        }
    }

    Ok(())
}
