//! Command line utilities for supplying piece data to a Filecoin storage
//! provider: the input file is hashed into its piece commitment, validated
//! against the provider's sector size and handed over together with a deal
//! descriptor.

mod api;
mod pipeline;
mod schedule;

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    api::{client::MinerApiClient, ApiError, MinerApiInfo},
    pipeline::PipelineError,
    schedule::DealScheduleParams,
};

/// Environment variable carrying `<token>:<url>` for the provider API.
const MINER_API_INFO_ENVVAR: &str = "MINER_API_INFO";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("environment variable {MINER_API_INFO_ENVVAR} must be set to continue")]
    MissingApiInfo,

    #[error("invalid {MINER_API_INFO_ENVVAR}: {0}")]
    InvalidApiInfo(&'static str),

    #[error("FromEnv error: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::FromEnvError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Assorted utilities for storage provider sector and piece manipulation.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
enum Cli {
    /// Supply input data to the provider's SectorAddPieceToAny, without a
    /// staking voucher
    AddPiece {
        /// Path to the data to be injected
        input_path: PathBuf,

        /// Unix timestamp of the chain's genesis block, used to place the
        /// deal window
        #[arg(long, default_value_t = schedule::DEFAULT_GENESIS_TIMESTAMP)]
        genesis_timestamp: i64,

        /// Epochs between now and the start of the deal window
        #[arg(long, default_value_t = schedule::DEFAULT_START_BUFFER_EPOCHS)]
        deal_start_buffer: i64,

        /// Length of the deal window in epochs
        #[arg(long, default_value_t = schedule::DEFAULT_DURATION_EPOCHS)]
        deal_duration: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Logger initialization.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .init();

    let cli_arguments = Cli::parse();

    let api_info: MinerApiInfo = std::env::var(MINER_API_INFO_ENVVAR)
        .map_err(|_| CliError::MissingApiInfo)?
        .parse()
        .map_err(CliError::InvalidApiInfo)?;

    match cli_arguments {
        Cli::AddPiece {
            input_path,
            genesis_timestamp,
            deal_start_buffer,
            deal_duration,
        } => {
            let client = MinerApiClient::new(&api_info).await?;
            let schedule_params = DealScheduleParams {
                genesis_timestamp,
                start_buffer_epochs: deal_start_buffer,
                duration_epochs: deal_duration,
            };

            let token = CancellationToken::new();
            let receipt = tokio::select! {
                receipt = pipeline::add_piece(&client, &input_path, schedule_params, token.clone()) => receipt?,
                _ = tokio::signal::ctrl_c() => {
                    token.cancel();
                    tracing::warn!("interrupt received, aborting");
                    return Err(PipelineError::Cancelled.into());
                }
            };

            println!(
                "{}",
                serde_json::to_string_pretty(&receipt)
                    .expect("the receipt is serializable, so this should never fail")
            );
        }
    }

    Ok(())
}
