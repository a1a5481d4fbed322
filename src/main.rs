use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use trapcam_harvester::harvest::{MailHarvester, UploadHarvester};
use trapcam_harvester::imap::ImapConnector;
use trapcam_harvester::s3::{build_client, S3Storage};
use trapcam_harvester::{logging, AppConfig, RunExecutor, Stage};

#[derive(Parser)]
#[command(name = "trapcam-harvester", version)]
struct Cli {
    /// Read configuration variables from this file instead of ./.env
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Which stages to run
    #[arg(long, value_enum, default_value_t = Stage::All)]
    stage: Stage,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)
                .with_context(|| format!("Cannot read env file '{}'", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    let config = AppConfig::from_env()?;
    let _guard = logging::init(&config.log)?;

    info!("** trapcam-harvester {} starting a run.", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.work_dir).with_context(|| {
        format!(
            "Cannot create working directory '{}'",
            config.work_dir.display()
        )
    })?;

    let client = build_client(&config.storage).await?;
    let store = S3Storage::new(client, config.storage.bucket.clone());

    let executor = RunExecutor::new(
        MailHarvester::new(ImapConnector, &config),
        UploadHarvester::new(store, &config),
    );
    let report = executor.execute(cli.stage).await;

    for stage in &report.stages {
        match &stage.result {
            Ok(stats) => info!(
                stage = stage.name,
                harvested = stats.harvested,
                skipped = stats.skipped,
                duration_ms = stage.duration_ms,
                "Stage done"
            ),
            Err(_) => warn!(stage = stage.name, "Stage did not complete; it is retried next run"),
        }
    }

    Ok(())
}
