use crate::cli::Overrides;
use crate::etl::job::JobSettings;
use crate::prelude::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Settings of the migration utility.
///
/// Sources, from lowest to highest precedence: built-in defaults, an
/// optional `migration.toml` in the working directory, `MIGRATION_*`
/// environment variables (a `.env` file is loaded first), command-line
/// overrides.
///
#[derive(Debug, Deserialize)]
pub struct Config {
    pub chunk_size: usize,
    pub page_size: usize,
    pub source_dir: PathBuf,
    pub target_url: String,
}

impl Config {
    pub fn load(overrides: &Overrides) -> Result<Self> {
        match dotenv::dotenv() {
            Ok(path) => tracing::info!(target: ">> config", ?path, ".env loaded."),
            Err(error) => tracing::debug!(target: ">> config", %error, ".env skipped."),
        }

        let config = config::Config::builder()
            .set_default("chunk_size", 5)?
            .set_default("page_size", 10)?
            .set_default("source_dir", "data")?
            .add_source(config::File::with_name("migration").required(false))
            .add_source(config::Environment::with_prefix("MIGRATION").try_parsing(true))
            .add_source(config::Config::try_from(overrides)?)
            .build()?
            .try_deserialize::<Config>()?;
        config.validate()?;
        tracing::info!(
            target: ">> config",
            chunk_size = config.chunk_size,
            page_size = config.page_size,
            source_dir = ?config.source_dir,
            "Loaded."
        );

        Ok(config)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            chunk_size: self.chunk_size,
            page_size: self.page_size,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::NotSupported("chunk size of 0".to_owned()));
        }
        if self.page_size == 0 {
            return Err(Error::NotSupported("page size of 0".to_owned()));
        }
        Ok(())
    }
}
