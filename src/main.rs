use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bcra_etl::api::BcraClient;
use bcra_etl::config::Config;
use bcra_etl::database::{self, LoadMode};
use bcra_etl::error::ConfigError;
use bcra_etl::models::{find_endpoint, ENDPOINTS};
use bcra_etl::pipeline::{self, RunOptions};

/// Load the trailing window of BCRA series into the warehouse
#[derive(Parser, Debug)]
#[command(name = "bcra-etl", version, about)]
struct Cli {
    /// Key-value config file (defaults to .env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// How rows replace existing table contents
    #[arg(long)]
    mode: Option<LoadMode>,

    /// Fetch and print, but do not touch the warehouse
    #[arg(long)]
    dry_run: bool,

    /// Only fetch these endpoint paths (repeatable), e.g. --endpoint /usd
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,

    /// Rows per INSERT statement
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: Option<u64>,

    /// Days the window looks back from today
    #[arg(long, value_parser = clap::value_parser!(u32).range(2..))]
    lookback_days: Option<u32>,
}

impl Cli {
    fn run_options(&self, config: &Config) -> Result<RunOptions, ConfigError> {
        let endpoints = if self.endpoints.is_empty() {
            ENDPOINTS.to_vec()
        } else {
            self.endpoints
                .iter()
                .map(|path| {
                    find_endpoint(path).ok_or_else(|| ConfigError::UnknownEndpoint(path.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(RunOptions {
            endpoints,
            lookback_days: self.lookback_days.unwrap_or(config.lookback_days),
            load_mode: self.mode.unwrap_or(config.load_mode),
            dry_run: self.dry_run,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bcra_etl=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();

    let config = match Config::load(cli.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Make sure your config file defines API_BCRA_API_TOKEN and the REDSHIFT_* settings.");
            std::process::exit(1);
        }
    };

    let options = match cli.run_options(&config) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    let batch_size = cli
        .batch_size
        .map(|n| n as usize)
        .unwrap_or(config.batch_size);

    info!("🚀 Starting BCRA load ({} mode)", options.load_mode);
    let client = BcraClient::new(&config.api)?;

    let report = pipeline::run(
        &client,
        || database::connect(&config.warehouse, batch_size),
        &options,
        Utc::now(),
    )
    .await;

    report.log_summary();
    std::process::exit(report.status().exit_code());
}
