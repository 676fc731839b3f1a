use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    Ed25519,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub kind: SignatureType,
    pub data: Vec<u8>,
}

/// What is being signed. Key-holders may refuse or treat purposes differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum MsgType {
    #[strum(serialize = "dealproposal")]
    DealProposal,
    #[strum(serialize = "message")]
    ChainMsg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMeta {
    pub kind: MsgType,
}

impl MsgMeta {
    pub fn deal_proposal() -> Self {
        Self {
            kind: MsgType::DealProposal,
        }
    }

    pub fn chain_message() -> Self {
        Self {
            kind: MsgType::ChainMsg,
        }
    }
}
