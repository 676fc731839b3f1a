use serde::Deserialize;
use serde::Serialize;

use crate::models::chain::PeerId;

/// What a peer tells about itself when identified.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeData {
    pub peer_id: PeerId,
    /// Identify protocol version the peer speaks.
    pub version: String,
    /// Stream protocols the peer is willing to open, e.g. `/fil/storage/mk/1.2.0`.
    pub protocols: Vec<String>,
}

/// Control messages exchanged before a connection is handed to a protocol.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
pub enum PeerMessage {
    Handshake {
        magic_value: [u8; 16],
        data: Box<HandshakeData>,
    },
    OpenStream {
        protocol: String,
    },
    StreamAccepted,
    StreamRefused(String),
    Bye,
}

/// Returns true iff version numbers are compatible: same major version, and
/// for 0.x versions also the same minor version.
pub fn versions_are_compatible(own_version: &str, other_version: &str) -> bool {
    let (Ok(own), Ok(other)) = (
        semver::Version::parse(own_version),
        semver::Version::parse(other_version),
    ) else {
        return false;
    };

    if own.major == 0 || other.major == 0 {
        return own.major == other.major && own.minor == other.minor;
    }
    own.major == other.major
}
