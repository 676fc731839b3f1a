use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Smallest piece the commitment is defined for.
pub const MIN_PADDED_PIECE_SIZE: u64 = 128;

/// Size of a piece after Fr32 expansion. Always a power of two >= 128.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaddedPieceSize(u64);

/// Payload capacity of a padded piece: 127 of every 128 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnpaddedPieceSize(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PieceSizeError {
    #[error("padded piece size {0} is not a power of two >= 128")]
    InvalidPadded(u64),
}

impl PaddedPieceSize {
    pub fn new(size: u64) -> Result<Self, PieceSizeError> {
        if size < MIN_PADDED_PIECE_SIZE || !size.is_power_of_two() {
            return Err(PieceSizeError::InvalidPadded(size));
        }
        Ok(Self(size))
    }

    /// The smallest padded piece able to hold `payload_len` bytes.
    pub fn for_payload(payload_len: u64) -> Self {
        let quads = payload_len.div_ceil(127).max(1);
        Self((quads * 128).next_power_of_two())
    }

    pub fn unpadded(&self) -> UnpaddedPieceSize {
        UnpaddedPieceSize(self.0 - self.0 / 128)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Number of 32-byte leaves in the commitment tree.
    pub fn leaf_count(&self) -> u64 {
        self.0 / 32
    }
}

impl UnpaddedPieceSize {
    pub fn padded(&self) -> PaddedPieceSize {
        PaddedPieceSize(self.0 + self.0 / 127)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PaddedPieceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
