use crate::etl::types::EntityKind;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(
    name = "Library Migration",
    version = "0.1.0",
    about = "Command-line tool for document-store-to-PostgreSQL library migration"
)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,
    #[command(subcommand)]
    pub command: Command,
}

/// Settings given on the command line, taking precedence over `migration.toml`
/// and `MIGRATION_*` environment variables.
///
#[derive(Debug, Default, Serialize, clap::Args)]
pub struct Overrides {
    #[arg(
        short,
        long,
        global = true,
        help = "Sets the number of entities committed per chunk"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[arg(
        short,
        long,
        global = true,
        help = "Sets the number of documents fetched per source page"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[arg(
        short,
        long,
        global = true,
        help = "Directory holding the `<collection>.jsonl` exports"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Target database URL (PostgreSQL)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Runs the whole migration job and prints its result.
    #[command(alias = "sm")]
    Start,
    /// Prints the migrated rows of one target table.
    Show {
        #[arg(value_enum)]
        kind: EntityKind,
    },
}
