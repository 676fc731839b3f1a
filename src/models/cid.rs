//! Content identifiers.
//!
//! CIDs are `cid` crate CIDv1 values. Their digest capacity is large enough
//! for identity hashes of inlined blocks. This module holds the multicodec
//! and multihash codes we use and the helpers that hash data into a CID.

use blake2::digest::consts::U32;
use blake2::Blake2b;
use sha2::Digest;
use sha2::Sha256;

/// Largest digest a [`Cid`] can carry; bounds identity-inlined blocks.
pub const MAX_DIGEST_SIZE: usize = 128;

pub type Cid = cid::CidGeneric<MAX_DIGEST_SIZE>;
pub type Multihash = multihash::Multihash<MAX_DIGEST_SIZE>;

/// multicodec: raw binary
pub const RAW: u64 = 0x55;
/// multicodec: merkledag protobuf
pub const DAG_PB: u64 = 0x70;
/// multicodec: merkledag cbor
pub const DAG_CBOR: u64 = 0x71;
/// multicodec: unsealed piece commitment
pub const FIL_COMMITMENT_UNSEALED: u64 = 0xf101;

/// multihash: identity (digest is the content itself)
pub const IDENTITY: u64 = 0x00;
/// multihash: sha2-256
pub const SHA2_256: u64 = 0x12;
/// multihash: blake2b with a 256 bit digest
pub const BLAKE2B_256: u64 = 0xb220;
/// multihash: sha2-256 with the two most significant bits of the last byte cleared
pub const SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

type Blake2b256 = Blake2b<U32>;

/// Failure to derive the CID of a serialized record.
#[derive(Debug, thiserror::Error)]
pub enum CidError {
    #[error("could not encode record: {0}")]
    Encode(#[from] serde_cbor::Error),

    #[error(transparent)]
    Multihash(#[from] multihash::Error),
}

/// The dag-cbor CID of `record`'s canonical CBOR encoding.
pub fn of_cbor<T: serde::Serialize>(record: &T) -> Result<Cid, CidError> {
    Ok(sha2_256(DAG_CBOR, &serde_cbor::to_vec(record)?)?)
}

/// Wrap an already computed `digest` of multihash type `code`.
pub fn from_digest(codec: u64, code: u64, digest: &[u8]) -> Result<Cid, multihash::Error> {
    Ok(Cid::new_v1(codec, Multihash::wrap(code, digest)?))
}

/// Embed `data` itself in the identifier. Fails if `data` exceeds
/// [`MAX_DIGEST_SIZE`].
pub fn identity(codec: u64, data: &[u8]) -> Result<Cid, multihash::Error> {
    from_digest(codec, IDENTITY, data)
}

pub fn sha2_256(codec: u64, data: &[u8]) -> Result<Cid, multihash::Error> {
    from_digest(codec, SHA2_256, &Sha256::digest(data))
}

pub fn blake2b_256(codec: u64, data: &[u8]) -> Result<Cid, multihash::Error> {
    from_digest(codec, BLAKE2B_256, &Blake2b256::digest(data))
}

/// True when the content is embedded in the identifier itself.
pub fn is_inline(cid: &Cid) -> bool {
    cid.hash().code() == IDENTITY
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn empty_raw_sha256_cid_has_well_known_string_form() {
        // sha256("") under the raw codec
        let cid = sha2_256(RAW, b"").unwrap();
        assert_eq!(
            "bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku",
            cid.to_string()
        );
        assert_eq!(cid, Cid::from_str(&cid.to_string()).unwrap());
    }

    #[test]
    fn blake2b_cids_carry_their_multihash_code() {
        let cid = blake2b_256(DAG_PB, b"node").unwrap();
        assert_eq!(DAG_PB, cid.codec());
        assert_eq!(BLAKE2B_256, cid.hash().code());
        assert_eq!(32, cid.hash().digest().len());
        assert_ne!(sha2_256(DAG_PB, b"node").unwrap(), cid);
    }

    #[test]
    fn identity_cid_is_inline() {
        let cid = identity(RAW, b"tiny").unwrap();
        assert!(is_inline(&cid));
        assert_eq!(b"tiny", cid.hash().digest());
        assert!(!is_inline(&sha2_256(RAW, b"tiny").unwrap()));
    }

    #[test]
    fn oversized_identity_is_refused() {
        assert!(identity(RAW, &[0u8; MAX_DIGEST_SIZE]).is_ok());
        assert!(identity(RAW, &[0u8; MAX_DIGEST_SIZE + 1]).is_err());
    }

    #[test]
    fn serde_round_trips_through_every_wire_format() {
        let cid = sha2_256(DAG_CBOR, b"message").unwrap();

        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(cid, serde_json::from_str::<Cid>(&json).unwrap());

        let cbor = serde_cbor::to_vec(&cid).unwrap();
        assert_eq!(cid, serde_cbor::from_slice::<Cid>(&cbor).unwrap());

        let bin = bincode::serialize(&cid).unwrap();
        assert_eq!(cid, bincode::deserialize::<Cid>(&bin).unwrap());
    }
}
