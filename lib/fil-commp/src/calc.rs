use primitives_commitment::{piece::PaddedPieceSize, piece_hash, zero_node, RawCommitment, NODE_SIZE};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommPError {
    /// The calculator was used again after [`Calc::finalize`].
    #[error("piece commitment calculator already finalized")]
    AlreadyFinalized,
    /// [`Calc::finalize`] was called before any leaf was absorbed.
    #[error("cannot finalize a piece commitment over an empty stream")]
    EmptyStream,
}

/// Streaming piece commitment calculator.
///
/// Consumes the 32-byte leaves of the Fr32-expanded stream in order and folds
/// them into a binary merkle tree. Instead of materializing the tree, the
/// calculator keeps a stack of carries, at most one completed-but-unpaired
/// subtree per tree level: a new node either fills the empty slot at its
/// level or combines with the carry waiting there and propagates upwards.
/// Memory use is one node per level regardless of the input size.
pub struct Calc {
    /// Completed subtrees awaiting a right-hand sibling, indexed by height.
    carries: Vec<Option<RawCommitment>>,
    leaf_count: u64,
    finalized: bool,
}

impl Calc {
    pub fn new() -> Self {
        Self {
            carries: Vec::new(),
            leaf_count: 0,
            finalized: false,
        }
    }

    /// Feed one 32-byte leaf of the expanded stream.
    ///
    /// Triggers zero or more carry combinations. Fails only when called
    /// after [`Calc::finalize`].
    pub fn absorb(&mut self, leaf: RawCommitment) -> Result<(), CommPError> {
        if self.finalized {
            return Err(CommPError::AlreadyFinalized);
        }

        self.leaf_count += 1;

        let mut node = leaf;
        let mut level = 0;
        loop {
            if self.carries.len() == level {
                self.carries.push(None);
            }

            match self.carries[level].take() {
                // no left sibling yet, park the node at this level
                None => {
                    self.carries[level] = Some(node);
                    break;
                }
                // the carry predates the new node, so it is the left sibling
                Some(left) => {
                    node = piece_hash(&left, &node);
                    level += 1;
                }
            }
        }

        Ok(())
    }

    /// Completes the tree and returns the root digest together with the
    /// padded size of the piece.
    ///
    /// The leaf count is grown to the next power of two (at least the four
    /// leaves of one quad) by pairing every unmatched carry with a zero
    /// subtree of its own height on its right. Must be called exactly once.
    pub fn finalize(&mut self) -> Result<(RawCommitment, PaddedPieceSize), CommPError> {
        if self.finalized {
            return Err(CommPError::AlreadyFinalized);
        }
        if self.leaf_count == 0 {
            return Err(CommPError::EmptyStream);
        }
        self.finalized = true;

        let padded_leaves = self.leaf_count.next_power_of_two().max(4);
        let height = padded_leaves.trailing_zeros() as usize;

        let mut rising: Option<RawCommitment> = None;
        for level in 0..height {
            let carry = self.carries.get_mut(level).and_then(Option::take);
            rising = match (carry, rising) {
                (None, None) => None,
                // anything real at this level sits left of the zero padding
                (Some(left), None) | (None, Some(left)) => {
                    Some(piece_hash(&left, &zero_node(level)))
                }
                (Some(left), Some(right)) => Some(piece_hash(&left, &right)),
            };
        }

        let top = self.carries.get_mut(height).and_then(Option::take);
        let root = top
            .xor(rising)
            .expect("exactly one node remains once the tree is folded to its top level");

        let padded_size = PaddedPieceSize::new(padded_leaves * NODE_SIZE as u64)
            .expect("a power of two leaf count of at least four is a valid padded size");

        Ok((root, padded_size))
    }
}

impl Default for Calc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use primitives_commitment::{piece::PaddedPieceSize, zero_piece_commitment, RawCommitment};
    use rstest::rstest;

    use crate::{Calc, CommPError, Fr32Reader};

    /// Expands and folds a full byte stream, the way the ingestion pipeline
    /// drives the calculator.
    fn digest(data: &[u8]) -> (RawCommitment, PaddedPieceSize) {
        let mut expanded = Vec::new();
        Fr32Reader::new(Cursor::new(data.to_vec()))
            .read_to_end(&mut expanded)
            .unwrap();

        let mut calc = Calc::new();
        for leaf in expanded.chunks_exact(32) {
            calc.absorb(leaf.try_into().unwrap()).unwrap();
        }
        calc.finalize().unwrap()
    }

    #[rstest]
    // power-of-two leaf counts, no zero padding involved
    #[case(127, "ea94b28b4c72336a925aa555376cbca087b9aae7cf16bc69eb19e913106f6f0c", 128)]
    #[case(254, "3f3019433e31133007948d56fe896fdbb42b6ecfe430e22728b49ca9355af30b", 256)]
    #[case(508, "004f6f290bdcc62e84ed8f2c88a3fa713709a5382f70d79ae473c0cdcca7d131", 512)]
    // leaf counts completed with zero subtrees
    #[case(381, "967973c08aa3536fd80f4e4d9b5fa80d1c5152370a4fee45d10d7d6b91063926", 512)]
    #[case(635, "41b56a1128bf6c1e6ce307f7f2630ab53548fa85a12f176c590cb21aa158f01e", 1024)]
    #[case(762, "978a7244b8a81fb61081444fa4fa51a73b33fb546471548de2a74f667da68f01", 1024)]
    fn known_digests(#[case] size: usize, #[case] expected: &str, #[case] padded: u64) {
        let (root, padded_size) = digest(&vec![0x42; size]);
        assert_eq!(hex::encode(root), expected);
        assert_eq!(*padded_size, padded);
    }

    #[test]
    fn known_piece_commitment() {
        let (root, padded_size) = digest(&vec![2u8; 200]);
        assert_eq!(
            root,
            [
                152, 58, 157, 235, 187, 58, 81, 61, 113, 252, 178, 149, 158, 13, 242, 24, 54, 98,
                148, 15, 250, 217, 3, 24, 152, 110, 93, 173, 117, 209, 251, 37,
            ]
        );
        assert_eq!(*padded_size, 256);
    }

    #[test]
    fn single_zero_quad_matches_minimum_zero_piece() {
        let (root, padded_size) = digest(&vec![0u8; 127]);
        assert_eq!(*padded_size, 128);
        assert_eq!(root, zero_piece_commitment(padded_size).raw());
    }

    #[test]
    fn zero_stream_matches_zero_piece_commitment() {
        // 16 zeroed quads fill a 2 KiB piece
        let (root, padded_size) = digest(&vec![0u8; 2032]);
        assert_eq!(*padded_size, 2048);
        assert_eq!(root, zero_piece_commitment(padded_size).raw());
        assert_eq!(
            root,
            [
                252, 126, 146, 130, 150, 229, 22, 250, 173, 233, 134, 178, 143, 146, 212, 74, 79,
                36, 185, 53, 72, 82, 35, 55, 106, 121, 144, 39, 188, 24, 248, 51
            ]
        );
    }

    #[test]
    fn deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        assert_eq!(digest(&data), digest(&data));
    }

    #[test]
    fn short_inputs_match_their_padded_form() {
        let mut padded = vec![0u8; 127];
        padded[..3].copy_from_slice(&[7, 7, 7]);
        assert_eq!(digest(&[7, 7, 7]), digest(&padded));
    }

    #[test]
    fn padded_size_is_a_power_of_two() {
        for size in [1usize, 126, 127, 128, 500, 1016, 1017, 5000] {
            let (_, padded_size) = digest(&vec![1u8; size]);
            assert_eq!(padded_size.count_ones(), 1, "input of {size} bytes");
            assert!(*padded_size >= 128);
        }
    }

    #[test]
    fn digest_stays_in_field() {
        let (root, _) = digest(&vec![0xFF; 10_000]);
        assert_eq!(root[31] & 0b1100_0000, 0);
    }

    #[test]
    fn absorb_after_finalize_is_rejected() {
        let mut calc = Calc::new();
        calc.absorb([1u8; 32]).unwrap();
        calc.finalize().unwrap();

        assert_eq!(calc.absorb([1u8; 32]), Err(CommPError::AlreadyFinalized));
    }

    #[test]
    fn finalize_twice_is_rejected() {
        let mut calc = Calc::new();
        calc.absorb([1u8; 32]).unwrap();
        calc.finalize().unwrap();

        assert_eq!(calc.finalize(), Err(CommPError::AlreadyFinalized));
    }

    #[test]
    fn finalize_without_leaves_is_rejected() {
        let mut calc = Calc::new();
        assert_eq!(calc.finalize(), Err(CommPError::EmptyStream));
    }
}
