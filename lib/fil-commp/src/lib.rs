//! Streaming calculation of Filecoin piece commitments (CommP).
//!
//! The raw byte stream is first grown by [`Fr32Reader`], which turns every
//! 254 bits into a 256-bit field element, and the expanded stream is then
//! folded leaf by leaf into a binary merkle tree by [`Calc`]. The fold keeps
//! at most one incomplete subtree per tree level, so pieces of any size are
//! hashed in a single pass with memory logarithmic in the input length.
//!
//! Reference — <https://spec.filecoin.io/systems/filecoin_files/piece/#section-systems.filecoin_files.piece.data-representation>

mod calc;
mod fr32;

pub use calc::{Calc, CommPError};
pub use fr32::{Fr32Reader, IN_BYTES_PER_QUAD, OUT_BYTES_PER_QUAD};
