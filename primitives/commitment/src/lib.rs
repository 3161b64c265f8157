pub mod piece;
mod zero;

use cid::{multihash::Multihash, Cid};
use sha2::{Digest, Sha256};

pub use crate::zero::{zero_node, zero_piece_commitment};

/// Merkle tree node size in bytes.
pub const NODE_SIZE: usize = 32;

/// Raw 32-byte commitment digest, the root of a piece's merkle tree.
pub type RawCommitment = [u8; NODE_SIZE];

/// Filecoin piece or sector data commitment merkle node/root (CommP & CommD)
///
/// https://github.com/multiformats/multicodec/blob/badcfe56bb7e0bbb06b60d57565186cd6be1f932/table.csv#L554
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;

/// SHA2-256 with the two most significant bits from the last byte zeroed (as
/// via a mask with 0b00111111) - used for proving trees as in Filecoin.
///
/// https://github.com/multiformats/multicodec/blob/badcfe56bb7e0bbb06b60d57565186cd6be1f932/table.csv#L153
pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentKind {
    // CommP - Piece commitment
    Piece,
    // CommD - Data commitment
    Data,
}

impl CommitmentKind {
    /// Returns the [Multicodec](https://github.com/multiformats/multicodec/blob/master/table.csv) code for the commitment kind.
    fn multicodec(&self) -> u64 {
        match self {
            CommitmentKind::Piece | CommitmentKind::Data => FIL_COMMITMENT_UNSEALED,
        }
    }

    /// Returns the [Multihash](https://github.com/multiformats/multicodec/blob/master/table.csv) code for the commitment kind.
    fn multihash(&self) -> u64 {
        match self {
            CommitmentKind::Piece | CommitmentKind::Data => SHA2_256_TRUNC254_PADDED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commitment {
    commitment: RawCommitment,
    kind: CommitmentKind,
}

impl Commitment {
    pub fn new(commitment: RawCommitment, kind: CommitmentKind) -> Self {
        Self { commitment, kind }
    }

    /// Creates a new `Commitment` from a CID. Returns an error if the CID
    /// passed does not represent a commitment of the given kind.
    pub fn from_cid(cid: &Cid, kind: CommitmentKind) -> Result<Self, &'static str> {
        let digest = cid.hash().digest();
        if digest.len() != NODE_SIZE {
            return Err("invalid digest length for a commitment");
        }

        let mut commitment = [0; NODE_SIZE];
        commitment.copy_from_slice(digest);

        if cid.codec() != kind.multicodec() {
            return Err("invalid multicodec for commitment");
        }

        if cid.hash().code() != kind.multihash() {
            return Err("invalid multihash for commitment");
        }

        Ok(Self { commitment, kind })
    }

    /// Returns the raw commitment bytes.
    pub fn raw(&self) -> RawCommitment {
        self.commitment
    }

    /// Converts the commitment to a CID.
    pub fn cid(&self) -> Cid {
        let multihash = self.kind.multihash();
        let multicodec = self.kind.multicodec();
        let hash = Multihash::wrap(multihash, &self.commitment)
            .expect("multihash is large enough so it can wrap the commitment");
        Cid::new_v1(multicodec, hash)
    }
}

/// Calculate the hash of two raw commitments, the parent node of both in the
/// piece's merkle tree.
pub fn piece_hash(left: &RawCommitment, right: &RawCommitment) -> RawCommitment {
    let mut buf = [0u8; NODE_SIZE * 2];
    buf[..NODE_SIZE].copy_from_slice(left);
    buf[NODE_SIZE..].copy_from_slice(right);

    let mut hashed = Sha256::digest(buf);

    // strip last two bits, to ensure result is in Fr.
    hashed[31] &= 0b0011_1111;

    hashed.into()
}
