//! Chain account addresses.
//!
//! Two protocols are understood: numeric actor ids (`f0<id>`, used for
//! providers and system actors such as the storage market) and public-key
//! addresses (`f1<base32(payload || checksum)>`) derived from a local
//! signing key. Key storage is not handled here.

use std::fmt;
use std::str::FromStr;

use multibase::Base;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use sha2::Digest;
use sha2::Sha256;

use crate::config_models::network::Network;

const KEY_PAYLOAD_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;

/// The built-in storage market actor.
pub const STORAGE_MARKET_ACTOR_ID: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is too short")]
    TooShort,

    #[error("unknown network prefix {0:?}")]
    UnknownNetwork(char),

    #[error("unknown address protocol {0:?}")]
    UnknownProtocol(char),

    #[error("invalid actor id: {0}")]
    InvalidId(String),

    #[error("invalid key payload")]
    InvalidPayload,

    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Payload {
    Id(u64),
    Key([u8; KEY_PAYLOAD_LEN]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    network: Network,
    payload: Payload,
}

impl Address {
    pub fn new_id(network: Network, id: u64) -> Self {
        Self {
            network,
            payload: Payload::Id(id),
        }
    }

    /// Address controlled by the holder of `public_key`.
    pub fn new_key(network: Network, public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut payload = [0u8; KEY_PAYLOAD_LEN];
        payload.copy_from_slice(&digest[..KEY_PAYLOAD_LEN]);
        Self {
            network,
            payload: Payload::Key(payload),
        }
    }

    pub fn storage_market_actor(network: Network) -> Self {
        Self::new_id(network, STORAGE_MARKET_ACTOR_ID)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    fn protocol_char(&self) -> char {
        match self.payload {
            Payload::Id(_) => '0',
            Payload::Key(_) => '1',
        }
    }

    fn checksum(protocol: char, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        hasher.update([protocol as u8]);
        hasher.update(payload);
        let digest = hasher.finalize();
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.network.address_prefix();
        match &self.payload {
            Payload::Id(id) => write!(f, "{}0{}", prefix, id),
            Payload::Key(key) => {
                let mut bytes = key.to_vec();
                bytes.extend_from_slice(&Self::checksum(self.protocol_char(), key));
                write!(f, "{}1{}", prefix, Base::Base32Lower.encode(&bytes))
            }
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(prefix), Some(protocol)) = (chars.next(), chars.next()) else {
            return Err(AddressError::TooShort);
        };
        let network =
            Network::from_address_prefix(prefix).ok_or(AddressError::UnknownNetwork(prefix))?;
        let rest = chars.as_str();

        let payload = match protocol {
            '0' => Payload::Id(
                rest.parse()
                    .map_err(|_| AddressError::InvalidId(rest.to_owned()))?,
            ),
            '1' => {
                let bytes = Base::Base32Lower.decode(rest).map_err(|_| AddressError::InvalidPayload)?;
                if bytes.len() != KEY_PAYLOAD_LEN + CHECKSUM_LEN {
                    return Err(AddressError::InvalidPayload);
                }
                let (key, checksum) = bytes.split_at(KEY_PAYLOAD_LEN);
                if checksum != Self::checksum(protocol, key) {
                    return Err(AddressError::ChecksumMismatch);
                }
                let mut payload = [0u8; KEY_PAYLOAD_LEN];
                payload.copy_from_slice(key);
                Payload::Key(payload)
            }
            other => return Err(AddressError::UnknownProtocol(other)),
        };

        Ok(Self { network, payload })
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_address_round_trips_through_string() {
        let provider: Address = "f01234".parse().unwrap();
        assert_eq!(Address::new_id(Network::Mainnet, 1234), provider);
        assert_eq!("f01234", provider.to_string());
        assert_eq!("t05", Address::storage_market_actor(Network::Calibnet).to_string());
    }

    #[test]
    fn key_address_checksum_is_verified() {
        let address = Address::new_key(Network::Mainnet, &[7u8; 32]);
        let text = address.to_string();
        assert!(text.starts_with("f1"));
        assert_eq!(address, text.parse().unwrap());

        // alter the first payload character to break the checksum
        let first = text.chars().nth(2).unwrap();
        let replacement = if first == 'a' { 'b' } else { 'a' };
        let broken = format!("f1{}{}", replacement, &text[3..]);
        assert_eq!(Err(AddressError::ChecksumMismatch), broken.parse::<Address>());
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert_eq!(Err(AddressError::TooShort), "f".parse::<Address>());
        assert_eq!(Err(AddressError::UnknownNetwork('x')), "x0123".parse::<Address>());
        assert_eq!(Err(AddressError::UnknownProtocol('9')), "f9abc".parse::<Address>());
        assert_eq!(Err(AddressError::InvalidPayload), "f1!!!!".parse::<Address>());
        assert_eq!(Err(AddressError::InvalidPayload), "f1aaaa".parse::<Address>());
        assert!(matches!(
            "f0abc".parse::<Address>(),
            Err(AddressError::InvalidId(_))
        ));
    }

    #[test]
    fn addresses_sort_by_network_then_payload() {
        let mut addresses = vec![
            Address::new_id(Network::Calibnet, 1),
            Address::new_id(Network::Mainnet, 9),
            Address::new_id(Network::Mainnet, 2),
        ];
        addresses.sort();
        assert_eq!(
            vec![
                Address::new_id(Network::Mainnet, 2),
                Address::new_id(Network::Mainnet, 9),
                Address::new_id(Network::Calibnet, 1),
            ],
            addresses
        );
        let unique: std::collections::BTreeSet<Address> = addresses.into_iter().collect();
        assert_eq!(3, unique.len());
    }
}
