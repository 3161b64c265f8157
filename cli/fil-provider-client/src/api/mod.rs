pub mod client;

use std::str::FromStr;

use cid::Cid;
use primitives_commitment::piece::UnpaddedPieceSize;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use url::Url;

/// Reader handed to the submission call, aligned to the start of the raw
/// piece data.
pub type PieceReader = Box<dyn AsyncRead + Send + Unpin>;

/// On-chain actor address of the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorAddress(String);

impl ActorAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl std::fmt::Display for ActorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receipt returned by the provider for an accepted piece: the sector the
/// piece landed in and its offset within that sector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorOffset {
    pub sector: u64,
    pub offset: u64,
}

/// Validity window of a deal, in chain epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealSchedule {
    pub start_epoch: i64,
    pub end_epoch: i64,
}

/// Piece commitment and padded size as activated on the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PieceActivationManifest {
    pub cid: Cid,
    pub size: u64,
}

/// Deal descriptor submitted together with the piece data. Built once per
/// ingestion run and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PieceDealInfo {
    pub deal_schedule: DealSchedule,
    pub keep_unsealed: bool,
    pub piece_activation_manifest: PieceActivationManifest,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("provider RPC transport failed: {0}")]
    Network(#[from] jsonrpsee::core::ClientError),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("piece upload failed: {0}")]
    Upload(#[from] reqwest::Error),

    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("API token is not usable in an authorization header")]
    InvalidToken,
}

/// The narrow view of the storage provider's API used by the ingestion
/// pipeline. Production code talks JSON-RPC through
/// [`client::MinerApiClient`]; tests substitute an in-memory provider.
#[async_trait::async_trait]
pub trait StorageProviderApi {
    /// Address of the provider's on-chain actor.
    async fn actor_address(&self) -> Result<ActorAddress, ApiError>;

    /// Size in bytes of the sectors the actor commits.
    async fn actor_sector_size(&self, actor: &ActorAddress) -> Result<u64, ApiError>;

    /// Hands the piece over for sector inclusion. `data` must produce
    /// exactly `size` bytes. Failures are surfaced as-is, retrying is the
    /// caller's decision.
    async fn sector_add_piece_to_any(
        &self,
        size: UnpaddedPieceSize,
        data: PieceReader,
        deal: PieceDealInfo,
    ) -> Result<SectorOffset, ApiError>;
}

/// Connection details for the provider API, in the `<token>:<url>` format
/// carried by the `MINER_API_INFO` environment variable.
#[derive(Debug, Clone)]
pub struct MinerApiInfo {
    pub token: String,
    pub url: Url,
}

impl FromStr for MinerApiInfo {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, url) = s
            .split_once(':')
            .ok_or("expected an API info of the form <token>:<url>")?;

        if token.is_empty() {
            return Err("the API token must not be empty");
        }

        let url = Url::parse(url).map_err(|_| "the API endpoint is not a valid URL")?;

        Ok(Self {
            token: token.to_string(),
            url,
        })
    }
}
