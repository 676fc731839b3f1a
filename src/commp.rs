//! Piece commitment (commP) over the bytes of a sealed archive.
//!
//! Payload bytes are zero-filled to whole 127-byte quads, each quad is Fr32
//! expanded into four 32-byte leaves, and the leaves are merged pairwise with
//! SHA-256 (top two bits of every node cleared). The tree is padded to the
//! power-of-two leaf count of the padded piece with zero-subtree commitments.
//! Leaves are merged as they arrive so memory stays bounded by the tree height.

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;

use sha2::Digest;
use sha2::Sha256;
use tracing::debug;
use tracing::instrument;

use crate::models::cid;
use crate::models::cid::Cid;
use crate::models::cid::FIL_COMMITMENT_UNSEALED;
use crate::models::cid::SHA2_256_TRUNC254_PADDED;
use crate::models::piece::PaddedPieceSize;

/// Payloads shorter than this have no defined commitment.
pub const MIN_PAYLOAD_SIZE: u64 = 65;

/// Read buffer used by [`commp`]: the unpadded size of a 64 MiB piece.
pub const BUFFER_SIZE: usize = (64 << 20) - (64 << 20) / 128;

const QUAD_SIZE: usize = 127;
const NODE_SIZE: usize = 32;

type Node = [u8; NODE_SIZE];

#[derive(Debug, thiserror::Error)]
pub enum CommpError {
    #[error("invalid commitment input: {0}")]
    Input(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Commitment to an archive, consumed by the proposal builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceCommitment {
    pub piece_cid: Cid,
    pub piece_size: PaddedPieceSize,
    /// Size of the archive file.
    pub payload_size: u64,
}

/// Streaming commP calculator.
#[derive(Debug, Default)]
pub struct CommpWriter {
    // bytes of an incomplete quad
    carry: Vec<u8>,
    payload_size: u64,
    // layers[k] holds a finished left subtree of 2^k leaves awaiting its sibling
    layers: Vec<Option<Node>>,
}

impl CommpWriter {
    pub fn new() -> Self {
        Self {
            carry: Vec::with_capacity(QUAD_SIZE),
            ..Self::default()
        }
    }

    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }

    /// Finish the tree and return the piece cid and padded size.
    pub fn sum(mut self) -> Result<(Cid, PaddedPieceSize), CommpError> {
        if self.payload_size < MIN_PAYLOAD_SIZE {
            return Err(CommpError::Input(format!(
                "payload of {} bytes is below the minimum of {}",
                self.payload_size, MIN_PAYLOAD_SIZE
            )));
        }

        if !self.carry.is_empty() {
            let mut quad = [0u8; QUAD_SIZE];
            quad[..self.carry.len()].copy_from_slice(&self.carry);
            self.carry.clear();
            self.push_quad(&quad);
        }

        let piece_size = PaddedPieceSize::for_payload(self.payload_size);
        let height = piece_size.leaf_count().trailing_zeros() as usize;
        if self.layers.len() <= height {
            self.layers.resize(height + 1, None);
        }

        let mut zero = [0u8; NODE_SIZE];
        for level in 0..height {
            if let Some(left) = self.layers[level].take() {
                self.push_node(level + 1, hash_pair(&left, &zero));
            }
            zero = hash_pair(&zero, &zero);
        }

        let root = self.layers[height].ok_or_else(|| {
            CommpError::Input("commitment tree has no root".to_string())
        })?;
        let cid = cid::from_digest(FIL_COMMITMENT_UNSEALED, SHA2_256_TRUNC254_PADDED, &root)
            .map_err(|e| CommpError::Input(e.to_string()))?;
        Ok((cid, piece_size))
    }

    fn push_quad(&mut self, quad: &[u8; QUAD_SIZE]) {
        for leaf in fr32_expand(quad) {
            self.push_node(0, leaf);
        }
    }

    fn push_node(&mut self, mut level: usize, mut node: Node) {
        loop {
            if self.layers.len() <= level {
                self.layers.resize(level + 1, None);
            }
            match self.layers[level].take() {
                Some(left) => {
                    node = hash_pair(&left, &node);
                    level += 1;
                }
                None => {
                    self.layers[level] = Some(node);
                    return;
                }
            }
        }
    }
}

impl Write for CommpWriter {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        let written = buf.len();
        self.payload_size += written as u64;

        if !self.carry.is_empty() {
            let take = (QUAD_SIZE - self.carry.len()).min(buf.len());
            self.carry.extend_from_slice(&buf[..take]);
            buf = &buf[take..];
            if self.carry.len() < QUAD_SIZE {
                return Ok(written);
            }
            let mut quad = [0u8; QUAD_SIZE];
            quad.copy_from_slice(&self.carry);
            self.carry.clear();
            self.push_quad(&quad);
        }

        let mut quads = buf.chunks_exact(QUAD_SIZE);
        for chunk in &mut quads {
            let mut quad = [0u8; QUAD_SIZE];
            quad.copy_from_slice(chunk);
            self.push_quad(&quad);
        }
        self.carry.extend_from_slice(quads.remainder());

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compute the piece commitment of the file at `path` in one forward pass.
#[instrument(level = "debug")]
pub fn commp(path: &Path) -> Result<PieceCommitment, CommpError> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut writer = CommpWriter::new();
    io::copy(&mut reader, &mut writer)?;

    let payload_size = writer.payload_size();
    let (piece_cid, piece_size) = writer.sum()?;
    debug!(
        path = %path.display(),
        payload_size,
        piece_size = piece_size.bytes(),
        capacity = piece_size.unpadded().bytes(),
        %piece_cid,
        "computed piece commitment"
    );

    Ok(PieceCommitment {
        piece_cid,
        piece_size,
        payload_size,
    })
}

/// Spread 127 bytes (1016 bits) over four 254-bit field elements.
fn fr32_expand(input: &[u8; QUAD_SIZE]) -> [Node; 4] {
    let mut out = [[0u8; NODE_SIZE]; 4];

    out[0].copy_from_slice(&input[..32]);
    out[0][31] &= 0x3f;

    for i in 32..64 {
        out[1][i - 32] = (input[i] << 2) | (input[i - 1] >> 6);
    }
    out[1][31] &= 0x3f;

    for i in 64..96 {
        out[2][i - 64] = (input[i] << 4) | (input[i - 1] >> 4);
    }
    out[2][31] &= 0x3f;

    for i in 96..127 {
        out[3][i - 96] = (input[i] << 6) | (input[i - 1] >> 2);
    }
    out[3][31] = input[126] >> 2;

    out
}

fn hash_pair(left: &Node, right: &Node) -> Node {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out: Node = hasher.finalize().into();
    out[31] &= 0x3f;
    out
}
