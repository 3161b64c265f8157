use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use fil_commp::{Calc, CommPError, Fr32Reader, OUT_BYTES_PER_QUAD};
use primitives_commitment::{
    piece::{PaddedPieceSize, PaddedPieceSizeError},
    Commitment, CommitmentKind, RawCommitment, NODE_SIZE,
};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{
        ActorAddress, ApiError, PieceActivationManifest, PieceDealInfo, SectorOffset,
        StorageProviderApi,
    },
    schedule::{self, DealScheduleParams},
};

/// Expanded-stream bytes hashed between two cancellation and payload checks.
/// A whole number of quads, so chunking never splits a leaf.
const HASHING_CHUNK_SIZE: usize = 512 * OUT_BYTES_PER_QUAD;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("only regular files are supported, {} is not one", .0.display())]
    NotRegularFile(PathBuf),

    #[error("supplied source file {} appears to be empty", .0.display())]
    EmptyInput(PathBuf),

    #[error(
        "data supplied via {} is at least {size} bytes long, which is over the maximum sector payload of {max_payload} bytes supported by provider {actor}",
        .path.display()
    )]
    SizeExceeded {
        path: PathBuf,
        size: u64,
        max_payload: u64,
        actor: ActorAddress,
    },

    #[error("provider reported an invalid sector size: {0}")]
    InvalidSectorSize(#[from] PaddedPieceSizeError),

    #[error("piece commitment calculation failed: {0}")]
    CommP(#[from] CommPError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("piece ingestion was cancelled")]
    Cancelled,

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Result of streaming a source through the commitment calculator.
struct HashedPiece<R> {
    source: R,
    digest: RawCommitment,
    padded_size: PaddedPieceSize,
    bytes_hashed: u64,
}

/// Prepares the file at `path` as a piece and hands it to the provider.
///
/// Queries the provider's sector capacity, validates the input against it,
/// streams the file through the Fr32 expander and the commitment calculator,
/// derives the deal window and submits the piece together with its deal
/// descriptor. Steps run strictly in order and the first failure aborts the
/// run; retrying is left to the operator.
///
/// Each call owns its file handle and calculator, so independent ingestions
/// may run concurrently.
#[tracing::instrument(skip(api, schedule_params, token), fields(path = %path.display()))]
pub async fn add_piece<A: StorageProviderApi>(
    api: &A,
    path: &Path,
    schedule_params: DealScheduleParams,
    token: CancellationToken,
) -> Result<SectorOffset, PipelineError> {
    let actor = api.actor_address().await?;
    let sector_size = api.actor_sector_size(&actor).await?;
    let max_payload = *PaddedPieceSize::new(sector_size)?.unpadded();

    let file = File::open(path)?;
    let metadata = file.metadata()?;

    // easy pre-checks if we can help it
    if !metadata.is_file() {
        return Err(PipelineError::NotRegularFile(path.to_path_buf()));
    }
    if metadata.len() == 0 {
        return Err(PipelineError::EmptyInput(path.to_path_buf()));
    }
    if metadata.len() > max_payload {
        return Err(PipelineError::SizeExceeded {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_payload,
            actor,
        });
    }

    // Hashing is read and CPU bound, keep it off the async workers.
    let hashed = {
        let token = token.clone();
        let actor = actor.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || hash_source(file, path, actor, max_payload, token))
            .await??
    };

    let piece_cid = Commitment::new(hashed.digest, CommitmentKind::Piece).cid();
    tracing::info!(
        "hashed {} bytes to {}, padded size {}",
        hashed.bytes_hashed,
        piece_cid,
        hashed.padded_size
    );

    // the same handle travels again for the actual transfer
    let mut file = hashed.source;
    file.seek(SeekFrom::Start(0))?;

    let deal_schedule = schedule::deal_schedule(&schedule_params, chrono::Utc::now().timestamp());
    let deal = PieceDealInfo {
        deal_schedule,
        keep_unsealed: false,
        piece_activation_manifest: PieceActivationManifest {
            cid: piece_cid,
            size: *hashed.padded_size,
        },
    };
    tracing::debug!(?deal, "assembled deal descriptor");

    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // the provider expects exactly the unpadded piece size, the file is
    // zero-extended up to it
    let unpadded_size = hashed.padded_size.unpadded();
    let piece_data = tokio::fs::File::from_std(file)
        .chain(tokio::io::repeat(0))
        .take(*unpadded_size);

    let receipt = api
        .sector_add_piece_to_any(unpadded_size, Box::new(piece_data), deal)
        .await?;

    Ok(receipt)
}

/// Streams the whole source through the expander and the calculator.
///
/// The cancellation signal and the payload ceiling are checked at every
/// chunk boundary; the ceiling check is a safety net for sources whose
/// reported size was wrong or changed mid-read.
fn hash_source<R: Read>(
    source: R,
    path: PathBuf,
    actor: ActorAddress,
    max_payload: u64,
    token: CancellationToken,
) -> Result<HashedPiece<R>, PipelineError> {
    let mut expander = Fr32Reader::new(source);
    let mut calc = Calc::new();
    let mut chunk = vec![0u8; HASHING_CHUNK_SIZE];

    loop {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let filled = read_chunk(&mut expander, &mut chunk)?;
        if filled == 0 {
            break;
        }

        for leaf in chunk[..filled].chunks_exact(NODE_SIZE) {
            calc.absorb(leaf.try_into().expect("chunks_exact yields 32-byte slices"))?;
        }

        if expander.bytes_read() > max_payload {
            return Err(PipelineError::SizeExceeded {
                path,
                size: expander.bytes_read(),
                max_payload,
                actor,
            });
        }
    }

    let (digest, padded_size) = calc.finalize()?;

    Ok(HashedPiece {
        bytes_hashed: expander.bytes_read(),
        source: expander.into_inner(),
        digest,
        padded_size,
    })
}

/// Fills `buf` from `reader` until it is full or the stream ends.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Cursor, Write},
        sync::Mutex,
    };

    use primitives_commitment::{Commitment, CommitmentKind};
    use tokio::io::AsyncReadExt;
    use tokio_util::sync::CancellationToken;

    use super::{add_piece, hash_source, PipelineError};
    use crate::{
        api::{
            ActorAddress, ApiError, PieceDealInfo, PieceReader, SectorOffset, StorageProviderApi,
        },
        schedule::DealScheduleParams,
    };

    /// In-memory provider with a 2 KiB sector, the smallest piece playground.
    struct FakeProvider {
        sector_size: u64,
        submissions: Mutex<Vec<(u64, PieceDealInfo, Vec<u8>)>>,
    }

    impl FakeProvider {
        fn new(sector_size: u64) -> Self {
            Self {
                sector_size,
                submissions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl StorageProviderApi for FakeProvider {
        async fn actor_address(&self) -> Result<ActorAddress, ApiError> {
            Ok(ActorAddress::new("f01000"))
        }

        async fn actor_sector_size(&self, _actor: &ActorAddress) -> Result<u64, ApiError> {
            Ok(self.sector_size)
        }

        async fn sector_add_piece_to_any(
            &self,
            size: primitives_commitment::piece::UnpaddedPieceSize,
            mut data: PieceReader,
            deal: PieceDealInfo,
        ) -> Result<SectorOffset, ApiError> {
            let mut bytes = Vec::new();
            data.read_to_end(&mut bytes)
                .await
                .map_err(|err| ApiError::Rejected(err.to_string()))?;

            self.submissions
                .lock()
                .unwrap()
                .push((*size, deal, bytes));

            Ok(SectorOffset {
                sector: 1,
                offset: 0,
            })
        }
    }

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let provider = FakeProvider::new(2048);
        let file = temp_file(&[]);

        let result = add_piece(
            &provider,
            file.path(),
            DealScheduleParams::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(PipelineError::EmptyInput(_))));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let provider = FakeProvider::new(2048);
        // one byte over the 2032 byte payload of a 2 KiB sector
        let file = temp_file(&vec![1u8; 2033]);

        let result = add_piece(
            &provider,
            file.path(),
            DealScheduleParams::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::SizeExceeded {
                size: 2033,
                max_payload: 2032,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn full_sector_payload_is_accepted() {
        let provider = FakeProvider::new(2048);
        let content = vec![3u8; 2032];
        let file = temp_file(&content);

        let receipt = add_piece(
            &provider,
            file.path(),
            DealScheduleParams::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(receipt.sector, 1);

        let submissions = provider.submissions.lock().unwrap();
        let (size, deal, bytes) = &submissions[0];
        // 2032 bytes fill the piece exactly, no transfer padding needed
        assert_eq!(*size, 2032);
        assert_eq!(deal.piece_activation_manifest.size, 2048);
        assert_eq!(*bytes, content);
    }

    #[tokio::test]
    async fn deal_descriptor_matches_known_commitment() {
        let provider = FakeProvider::new(2048);
        let content = vec![2u8; 200];
        let file = temp_file(&content);

        let params = DealScheduleParams {
            genesis_timestamp: 0,
            start_buffer_epochs: 10,
            duration_epochs: 100,
        };
        add_piece(&provider, file.path(), params, CancellationToken::new())
            .await
            .unwrap();

        let submissions = provider.submissions.lock().unwrap();
        let (size, deal, bytes) = &submissions[0];

        let expected = Commitment::new(
            [
                152, 58, 157, 235, 187, 58, 81, 61, 113, 252, 178, 149, 158, 13, 242, 24, 54, 98,
                148, 15, 250, 217, 3, 24, 152, 110, 93, 173, 117, 209, 251, 37,
            ],
            CommitmentKind::Piece,
        );
        assert_eq!(deal.piece_activation_manifest.cid, expected.cid());
        assert_eq!(deal.piece_activation_manifest.size, 256);
        assert!(!deal.keep_unsealed);
        assert_eq!(
            deal.deal_schedule.end_epoch - deal.deal_schedule.start_epoch,
            100
        );

        // the transferred stream is the file, zero-extended to the unpadded
        // piece size
        assert_eq!(*size, 254);
        assert_eq!(bytes.len(), 254);
        assert_eq!(&bytes[..200], &content[..]);
        assert!(bytes[200..].iter().all(|byte| *byte == 0));
    }

    #[tokio::test]
    async fn invalid_sector_size_is_rejected() {
        // 100 is not a valid power-of-two sector size
        let provider = FakeProvider::new(100);
        let file = temp_file(&[1, 2, 3]);

        let result = add_piece(
            &provider,
            file.path(),
            DealScheduleParams::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(PipelineError::InvalidSectorSize(_))));
    }

    #[test]
    fn midstream_ceiling_aborts_hashing() {
        let source = Cursor::new(vec![0u8; 300]);

        let result = hash_source(
            source,
            "oversized".into(),
            ActorAddress::new("f01000"),
            200,
            CancellationToken::new(),
        );

        assert!(matches!(
            result,
            Err(PipelineError::SizeExceeded {
                max_payload: 200,
                ..
            })
        ));
    }

    #[test]
    fn cancellation_stops_hashing() {
        let token = CancellationToken::new();
        token.cancel();

        let result = hash_source(
            Cursor::new(vec![0u8; 300]),
            "cancelled".into(),
            ActorAddress::new("f01000"),
            2032,
            token,
        );

        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
