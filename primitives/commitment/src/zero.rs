use std::sync::OnceLock;

use crate::{piece::PaddedPieceSize, piece_hash, Commitment, CommitmentKind, RawCommitment};

/// Number of precomputed zero-subtree nodes. Level 58 covers a 2^63-byte
/// piece, far above any sector a provider can offer.
const MAX_LEVEL: usize = 59;

/// Merkle node of a subtree of the given height whose leaves are all zero.
///
/// Level 0 is the zero leaf itself; every following level is the hash of two
/// copies of the previous one. Used to complete the right-hand side of a
/// partially filled tree.
pub fn zero_node(level: usize) -> RawCommitment {
    static ZERO_NODES: OnceLock<[RawCommitment; MAX_LEVEL]> = OnceLock::new();

    ZERO_NODES.get_or_init(|| {
        let mut nodes = [[0u8; 32]; MAX_LEVEL];
        for level in 1..MAX_LEVEL {
            let child = nodes[level - 1];
            nodes[level] = piece_hash(&child, &child);
        }
        nodes
    })[level]
}

/// Returns a zero-piece commitment for a given piece size.
pub fn zero_piece_commitment(size: PaddedPieceSize) -> Commitment {
    // a piece of 32 << n bytes is a zero subtree of height n
    let level = (*size / crate::NODE_SIZE as u64).trailing_zeros() as usize;
    Commitment::new(zero_node(level), CommitmentKind::Piece)
}
