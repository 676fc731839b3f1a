//! Minimal peer-to-peer host used to reach storage providers.
//!
//! A host identifies peers once per `connect`, remembering which stream
//! protocols they advertise, and then opens one stream per protocol exchange.

pub mod peer_message;
pub mod tcp_host;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_util::codec::LengthDelimitedCodec;

use crate::models::chain::PeerAddrInfo;
use crate::models::chain::PeerId;

/// Magic string sent by the side asking to be identified.
pub const MAGIC_STRING_REQUEST: &[u8; 16] = b"pledge-identify\n";
/// Magic string sent back by an identifying peer.
pub const MAGIC_STRING_RESPONSE: &[u8; 16] = b"pledge-provider\n";

/// Version of the identify exchange itself. Peers must agree on its major
/// version; what software either side runs is irrelevant.
pub const IDENTIFY_PROTOCOL_VERSION: &str = "1.0.0";

/// Largest control or protocol frame either side accepts.
pub const MAX_FRAME_LENGTH_IN_BYTES: usize = 8 * 1024 * 1024;

/// Use this function to ensure that the same rules apply for both
/// ingoing and outgoing connections.
pub fn get_codec_rules() -> LengthDelimitedCodec {
    let mut codec_rules = LengthDelimitedCodec::new();
    codec_rules.set_max_frame_length(MAX_FRAME_LENGTH_IN_BYTES);
    codec_rules
}

#[async_trait]
pub trait Host: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Identify `peer` and record the protocols it supports.
    async fn connect(&self, peer: &PeerAddrInfo) -> Result<()>;

    /// The first of `protocols` that `peer` advertised when last identified.
    fn first_supported_protocol(&self, peer: &PeerId, protocols: &[&str]) -> Option<String>;

    /// Open a fresh bidirectional stream to `peer` speaking `protocol`.
    async fn new_stream(&self, peer: &PeerId, protocol: &str) -> Result<Self::Stream>;
}
