mod commands;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "firstprompt",
    version,
    about = "Generate study topics and suggested first messages per country"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding firstprompt.yml / firstprompt.toml and .env
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the reference tables from the warehouse into CSV files
    DownloadData,

    /// Write one combination file per country from the reference tables
    MakeCombinations,

    /// Generate topics for every combination of a country
    GenerateTopics {
        /// Country name, as listed in the country table
        #[arg(long)]
        country: String,

        /// Maximum concurrent generation calls (at least 1)
        #[arg(long)]
        concurrency: Option<NonZeroUsize>,

        /// Keep the existing topic checkpoint and skip finished combinations
        #[arg(long)]
        resume: bool,
    },

    /// Generate suggested prompts for every topic of a country
    GeneratePrompts {
        /// Country name, as listed in the country table
        #[arg(long)]
        country: String,

        /// Maximum concurrent generation calls (at least 1)
        #[arg(long)]
        concurrency: Option<NonZeroUsize>,

        /// Upload the generated messages to the database afterwards
        #[arg(long)]
        upload: bool,
    },

    /// Upload a message checkpoint file to the database
    Upload {
        /// Message checkpoint to upload
        #[arg(long)]
        file: PathBuf,

        /// Rows per transaction
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Check that the database can be opened and queried
    CheckDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = firstprompt_config::ConfigLoader::with_dir(&cli.config_dir);
    let config = config_loader.load()?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    config_loader.ensure_dirs(&config)?;

    match cli.command {
        Commands::DownloadData => commands::download_data(&config).await?,
        Commands::MakeCombinations => commands::make_combinations(&config)?,
        Commands::GenerateTopics {
            country,
            concurrency,
            resume,
        } => {
            let concurrency = concurrency.map(NonZeroUsize::get);
            commands::generate_topics(&config, &country, concurrency, resume).await?
        }
        Commands::GeneratePrompts {
            country,
            concurrency,
            upload,
        } => {
            let concurrency = concurrency.map(NonZeroUsize::get);
            commands::generate_prompts(&config, &country, concurrency, upload).await?
        }
        Commands::Upload { file, batch_size } => commands::upload(&config, &file, batch_size)?,
        Commands::CheckDb => commands::check_db(&config)?,
    }

    Ok(())
}
