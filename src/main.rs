use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use partflow::{
    config::Config,
    database::Database,
    database::repositories::{AuditRepository, HistoryRepository, RawFileRepository},
    ingestor::{self, SnapshotIngestor},
    models::RawFileDescriptor,
    pipeline::PipelineRunner,
    utils::filenames,
};

#[derive(Parser)]
#[command(name = "partflow")]
#[command(version)]
#[command(about = "Product media pipeline and versioned data store")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the media pipeline over everything currently in the inbox
    Run {
        /// Stop after this stage instead of running the full pipeline
        #[arg(long, value_name = "STAGE")]
        through: Option<String>,
    },
    /// Ingest a data dump into the version store
    Ingest {
        /// Dump file: CSV with a header row, a JSON array of row objects,
        /// or one object per line
        file: std::path::PathBuf,

        /// File date override; defaults to the `YYYY-MM-DD_` filename prefix
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,
    },
    /// Run pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("partflow={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting partflow v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    let database = Database::new(&config.database).await?;
    database.migrate().await?;

    match cli.command {
        Command::Run { through } => run_pipeline(&config, &database, through.as_deref()).await,
        Command::Ingest { file, date } => ingest_dump(&config, &database, &file, date).await,
        Command::Migrate => Ok(()),
    }
}

async fn run_pipeline(
    config: &Config,
    database: &Database,
    through: Option<&str>,
) -> Result<()> {
    let runner = PipelineRunner::from_config(config, database, through)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, draining in-flight items");
            signal_token.cancel();
        }
    });

    let stats = runner.run(&cancel).await?;
    println!("{stats}");
    Ok(())
}

async fn ingest_dump(
    config: &Config,
    database: &Database,
    file: &std::path::Path,
    date: Option<NaiveDate>,
) -> Result<()> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("dump path has no file name")?;
    let file_date = match date {
        Some(date) => date,
        None => filenames::parse_dump_date(&file_name).with_context(|| {
            format!("cannot derive a file date from '{file_name}'; pass --date")
        })?,
    };

    let rows = ingestor::load_rows(file, std::slice::from_ref(&config.ingest.entity_field))?;

    let connection = database.connection();
    let ingestor = SnapshotIngestor::new(
        config.ingest.clone(),
        RawFileRepository::new(connection.clone()),
        HistoryRepository::new(connection.clone(), database.backend()),
        AuditRepository::new(connection),
    );

    let descriptor = RawFileDescriptor {
        file_name,
        file_date,
    };
    let stats = ingestor.ingest(&descriptor, &rows).await?;
    println!("{stats}");
    Ok(())
}
