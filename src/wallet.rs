//! Key-holders able to sign proposals and chain messages.
//!
//! Only the signing contract matters to the deal pipeline; [`LocalWallet`] is
//! a minimal ed25519 key-holder backed by a hex key file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use ed25519_dalek::Signer as _;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier as _;
use tracing::debug;
use tracing::info;

use crate::config_models::network::Network;
use crate::models::address::Address;
use crate::models::signature::MsgMeta;
use crate::models::signature::Signature;
use crate::models::signature::SignatureType;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SignError {
    #[error("address {0} is not controlled by this wallet")]
    UnknownAddress(Address),

    #[error("key-holder refused to sign: {0}")]
    Refused(String),
}

/// Produces signatures for addresses it controls.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn wallet_sign(
        &self,
        address: &Address,
        data: &[u8],
        meta: MsgMeta,
    ) -> Result<Signature, SignError>;
}

pub struct LocalWallet {
    network: Network,
    keys: BTreeMap<Address, SigningKey>,
    // first key loaded or generated
    default_address: Option<Address>,
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("network", &self.network)
            .field("addresses", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalWallet {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            keys: BTreeMap::new(),
            default_address: None,
        }
    }

    pub fn import(&mut self, secret: [u8; 32]) -> Address {
        let key = SigningKey::from_bytes(&secret);
        let address = Address::new_key(self.network, key.verifying_key().as_bytes());
        self.keys.insert(address, key);
        self.default_address.get_or_insert(address);
        address
    }

    pub fn generate_key(&mut self) -> Address {
        self.import(rand::random())
    }

    pub fn default_address(&self) -> Option<Address> {
        self.default_address
    }

    pub fn has(&self, address: &Address) -> bool {
        self.keys.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.keys.keys()
    }

    /// Check `signature` over `data` against the key behind `address`.
    pub fn verify(&self, address: &Address, data: &[u8], signature: &Signature) -> bool {
        let Some(key) = self.keys.get(address) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(signature.data.as_slice()) else {
            return false;
        };
        key.verifying_key()
            .verify(data, &ed25519_dalek::Signature::from_bytes(&bytes))
            .is_ok()
    }

    /// Read hex-encoded secret keys, one per line. Blank lines and lines
    /// starting with `#` are skipped.
    pub fn load(path: &Path, network: Network) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?;

        let mut wallet = Self::new(network);
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bytes = hex::decode(line)
                .with_context(|| format!("{}:{}: not hex", path.display(), number + 1))?;
            let Ok(secret) = <[u8; 32]>::try_from(bytes.as_slice()) else {
                bail!(
                    "{}:{}: expected a 32-byte key, got {} bytes",
                    path.display(),
                    number + 1,
                    bytes.len()
                );
            };
            wallet.import(secret);
        }

        debug!(keys = wallet.keys.len(), path = %path.display(), "loaded key file");
        Ok(wallet)
    }

    /// Load the key file, creating it with one fresh key if it does not exist.
    pub fn load_or_create(path: &Path, network: Network) -> Result<Self> {
        if path.exists() {
            return Self::load(path, network);
        }

        let secret: [u8; 32] = rand::random();
        let mut wallet = Self::new(network);
        let address = wallet.import(secret);
        std::fs::write(path, format!("{}\n", hex::encode(secret)))
            .with_context(|| format!("Failed to write key file {}", path.display()))?;
        info!(%address, path = %path.display(), "created new key file");
        Ok(wallet)
    }
}

#[async_trait]
impl Signer for LocalWallet {
    async fn wallet_sign(
        &self,
        address: &Address,
        data: &[u8],
        meta: MsgMeta,
    ) -> Result<Signature, SignError> {
        let key = self
            .keys
            .get(address)
            .ok_or(SignError::UnknownAddress(*address))?;
        debug!(%address, purpose = %meta.kind, len = data.len(), "signing");
        Ok(Signature {
            kind: SignatureType::Ed25519,
            data: key.sign(data).to_bytes().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signs_for_own_addresses_only() {
        let mut wallet = LocalWallet::new(Network::Mainnet);
        let address = wallet.generate_key();
        assert_eq!(Some(address), wallet.default_address());

        let signature = wallet
            .wallet_sign(&address, b"payload", MsgMeta::deal_proposal())
            .await
            .unwrap();
        assert_eq!(SignatureType::Ed25519, signature.kind);
        assert!(wallet.verify(&address, b"payload", &signature));
        assert!(!wallet.verify(&address, b"other", &signature));

        let stranger = Address::new_id(Network::Mainnet, 1000);
        let result = wallet
            .wallet_sign(&stranger, b"payload", MsgMeta::chain_message())
            .await;
        assert!(matches!(result, Err(SignError::UnknownAddress(a)) if a == stranger));
    }

    #[test]
    fn key_file_round_trips_through_load_or_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.hex");

        let created = LocalWallet::load_or_create(&path, Network::Calibnet).unwrap();
        let loaded = LocalWallet::load_or_create(&path, Network::Calibnet).unwrap();
        assert_eq!(created.default_address(), loaded.default_address());
        assert!(loaded
            .default_address()
            .unwrap()
            .to_string()
            .starts_with("t1"));
    }

    #[test]
    fn load_skips_comments_and_rejects_short_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.hex");
        std::fs::write(
            &path,
            format!("# wallet\n\n{}\n{}\n", "11".repeat(32), "22".repeat(32)),
        )
        .unwrap();
        let wallet = LocalWallet::load(&path, Network::Mainnet).unwrap();
        assert_eq!(2, wallet.addresses().count());

        std::fs::write(&path, "abcd\n").unwrap();
        assert!(LocalWallet::load(&path, Network::Mainnet).is_err());
    }
}
