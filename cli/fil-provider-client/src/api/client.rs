use jsonrpsee::{
    core::{client::Error as ClientError, RpcResult},
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
    proc_macros::rpc,
    ws_client::{WsClient, WsClientBuilder},
};
use primitives_commitment::piece::UnpaddedPieceSize;
use tokio_util::io::ReaderStream;
use url::Url;

use super::{
    ActorAddress, ApiError, MinerApiInfo, PieceDealInfo, PieceReader, SectorOffset,
    StorageProviderApi,
};

/// Subset of the provider's miner API consumed by this client.
#[rpc(client, namespace = "Filecoin")]
trait MinerRpc {
    /// Fetch the address of the provider's on-chain actor.
    #[method(name = "ActorAddress")]
    async fn actor_address(&self) -> RpcResult<ActorAddress>;

    /// Fetch the sector size committed by the given actor.
    #[method(name = "ActorSectorSize")]
    async fn actor_sector_size(&self, actor: ActorAddress) -> RpcResult<u64>;

    /// Schedule an uploaded piece for inclusion in any fitting sector.
    #[method(name = "SectorAddPieceToAny")]
    async fn sector_add_piece_to_any(
        &self,
        size: u64,
        deal: PieceDealInfo,
    ) -> RpcResult<SectorOffset>;
}

/// The transport is picked from the URL scheme, everything past construction
/// is transport-agnostic.
enum RpcTransport {
    Ws(WsClient),
    Http(HttpClient),
}

/// JSON-RPC implementation of [`StorageProviderApi`].
///
/// Piece bytes cannot travel inside a JSON-RPC call, so submission is split
/// the way the provider expects it: the body is streamed to the provider's
/// piece endpoint first and the scheduling call then references it by its
/// commitment CID.
pub struct MinerApiClient {
    rpc: RpcTransport,
    upload: reqwest::Client,
    base_url: Url,
    token: String,
}

impl MinerApiClient {
    pub async fn new(info: &MinerApiInfo) -> Result<Self, ApiError> {
        let rpc_url = info.url.join("rpc/v0")?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", info.token))
            .map_err(|_| ApiError::InvalidToken)?;
        headers.insert("authorization", bearer);

        let rpc = match rpc_url.scheme() {
            "ws" | "wss" => RpcTransport::Ws(
                WsClientBuilder::default()
                    .set_headers(headers)
                    .build(rpc_url.as_str())
                    .await?,
            ),
            "http" | "https" => RpcTransport::Http(
                HttpClientBuilder::default()
                    .set_headers(headers)
                    .build(rpc_url.as_str())?,
            ),
            other => {
                return Err(ApiError::Network(ClientError::Custom(format!(
                    "unsupported URL scheme: {}",
                    other
                ))))
            }
        };

        Ok(Self {
            rpc,
            upload: reqwest::Client::new(),
            base_url: info.url.clone(),
            token: info.token.clone(),
        })
    }

    /// HTTP endpoint receiving the bytes of the given piece.
    fn upload_url(&self, piece_cid: &cid::Cid) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(&format!("piece/{}", piece_cid))?;
        if matches!(url.scheme(), "ws" | "wss") {
            let scheme = if url.scheme() == "ws" { "http" } else { "https" };
            url.set_scheme(scheme)
                .expect("ws and http scheme families are interchangeable");
        }
        Ok(url)
    }
}

/// Call failures carry the provider's verdict, anything else is transport.
fn classify(err: ClientError) -> ApiError {
    match err {
        ClientError::Call(object) => ApiError::Rejected(object.to_string()),
        other => ApiError::Network(other),
    }
}

#[async_trait::async_trait]
impl StorageProviderApi for MinerApiClient {
    async fn actor_address(&self) -> Result<ActorAddress, ApiError> {
        match &self.rpc {
            RpcTransport::Ws(client) => client.actor_address().await,
            RpcTransport::Http(client) => client.actor_address().await,
        }
        .map_err(classify)
    }

    async fn actor_sector_size(&self, actor: &ActorAddress) -> Result<u64, ApiError> {
        match &self.rpc {
            RpcTransport::Ws(client) => client.actor_sector_size(actor.clone()).await,
            RpcTransport::Http(client) => client.actor_sector_size(actor.clone()).await,
        }
        .map_err(classify)
    }

    async fn sector_add_piece_to_any(
        &self,
        size: UnpaddedPieceSize,
        data: PieceReader,
        deal: PieceDealInfo,
    ) -> Result<SectorOffset, ApiError> {
        let url = self.upload_url(&deal.piece_activation_manifest.cid)?;

        tracing::debug!(%url, "uploading piece data");
        let response = self
            .upload
            .put(url)
            .bearer_auth(&self.token)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(data)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Rejected(format!(
                "piece upload answered with status {}",
                status
            )));
        }

        match &self.rpc {
            RpcTransport::Ws(client) => client.sector_add_piece_to_any(*size, deal).await,
            RpcTransport::Http(client) => client.sector_add_piece_to_any(*size, deal).await,
        }
        .map_err(classify)
    }
}
