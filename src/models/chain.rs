//! Chain-side records exchanged with the node API.

use std::fmt;
use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use super::address::Address;
use super::cid::Cid;
use super::cid::CidError;
use super::signature::Signature;
use super::token_amount::TokenAmount;

/// Discrete unit of chain time.
pub type ChainEpoch = i64;

/// Number of epochs in one day at 30s block time.
pub const EPOCHS_IN_DAY: ChainEpoch = 2880;

/// The current head of the chain, as far as fees and scheduling care.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipsetHead {
    pub height: ChainEpoch,
    pub parent_base_fee: TokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Sequence number of the last message applied from this account.
    pub nonce: u64,
    pub balance: TokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketBalance {
    pub escrow: TokenAmount,
    pub locked: TokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralBounds {
    pub min: TokenAmount,
    pub max: TokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a storage provider can be reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddrInfo {
    pub id: PeerId,
    pub addrs: Vec<SocketAddr>,
}

/// Method number of the storage market actor's AddBalance.
pub const MARKET_METHOD_ADD_BALANCE: u64 = 2;

/// A chain message before signing. Gas fields are filled in by estimation and
/// `nonce` by the submitter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub to: Address,
    pub from: Address,
    pub nonce: u64,
    pub value: TokenAmount,
    pub gas_limit: i64,
    pub gas_fee_cap: TokenAmount,
    pub gas_premium: TokenAmount,
    pub method: u64,
    pub params: Vec<u8>,
}

impl Message {
    /// A message with empty gas fields and nonce, ready for estimation.
    pub fn new(to: Address, from: Address, value: TokenAmount, method: u64, params: Vec<u8>) -> Self {
        Self {
            to,
            from,
            nonce: 0,
            value,
            gas_limit: 0,
            gas_fee_cap: TokenAmount::zero(),
            gas_premium: TokenAmount::zero(),
            method,
            params,
        }
    }

    /// The canonical bytes that get signed.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message: Message,
    pub signature: Signature,
}

impl SignedMessage {
    pub fn cid(&self) -> Result<Cid, CidError> {
        super::cid::of_cbor(self)
    }
}

/// Bounds handed to gas estimation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSendSpec {
    pub max_fee: TokenAmount,
}
