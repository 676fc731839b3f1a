//! Nonce assignment, gas estimation with a fee-cap floor, signing and
//! mempool push for a single chain message.
//!
//! No step is retried here. A failure is returned with the stage it happened
//! in, and retry policy belongs to whoever drives the submission.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use super::error::SubmitError;
use super::error::SubmitStage;
use super::nonce::ChainNonces;
use super::nonce::NonceSource;
use crate::models::chain::Message;
use crate::models::chain::MessageSendSpec;
use crate::models::chain::SignedMessage;
use crate::models::cid::Cid;
use crate::models::signature::MsgMeta;
use crate::models::token_amount::TokenAmount;
use crate::rpc::chain_api::ChainApi;
use crate::wallet::Signer;

/// Default bound handed to gas estimation: 1 nanoFIL.
pub const DEFAULT_MAX_FEE_ATTO: u64 = 1_000_000_000;

/// Decides, after signing, whether a message should really be pushed.
pub type MessageValidator = dyn Fn(&SignedMessage) -> bool + Send + Sync;

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub cid: Cid,
    /// False when the validator declined and nothing was pushed.
    pub sent: bool,
}

/// The fee cap a message must at least carry at `base_fee`: 20% headroom.
pub fn fee_cap_floor(base_fee: &TokenAmount) -> TokenAmount {
    &(base_fee * 6) / 5
}

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainApi>,
    signer: Arc<dyn Signer>,
    nonces: Arc<dyn NonceSource>,
    max_fee: TokenAmount,
}

impl fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("max_fee", &self.max_fee)
            .finish_non_exhaustive()
    }
}

impl TransactionSubmitter {
    /// Nonces come from chain state unless replaced with
    /// [`Self::with_nonce_source`].
    pub fn new(chain: Arc<dyn ChainApi>, signer: Arc<dyn Signer>) -> Self {
        Self {
            nonces: Arc::new(ChainNonces(chain.clone())),
            chain,
            signer,
            max_fee: TokenAmount::from(DEFAULT_MAX_FEE_ATTO),
        }
    }

    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn with_max_fee(mut self, max_fee: TokenAmount) -> Self {
        self.max_fee = max_fee;
        self
    }

    /// Assign nonce and gas to `message`, sign it and push it to the mempool.
    ///
    /// The nonce comes from the installed [`NonceSource`], chain state by
    /// default.
    pub async fn submit(
        &self,
        mut message: Message,
        validate: Option<&MessageValidator>,
    ) -> Result<Submitted, SubmitError> {
        let head = self
            .chain
            .chain_head()
            .await
            .map_err(SubmitError::at(SubmitStage::ChainHead))?;

        message.nonce = self
            .nonces
            .next_nonce(&message.from)
            .await
            .map_err(SubmitError::at(SubmitStage::NonceLookup))?;

        let spec = MessageSendSpec {
            max_fee: self.max_fee.clone(),
        };
        let mut estimated = self
            .chain
            .gas_estimate_message_gas(&message, &spec)
            .await
            .map_err(SubmitError::at(SubmitStage::GasEstimation))?;
        estimated.nonce = message.nonce;

        let floor = fee_cap_floor(&head.parent_base_fee);
        if estimated.gas_fee_cap < floor {
            debug!(
                estimated = %estimated.gas_fee_cap,
                %floor,
                "raising fee cap to base fee headroom"
            );
            estimated.gas_fee_cap = floor;
        }

        let bytes = estimated
            .signing_bytes()
            .map_err(|e| SubmitError::Encode(e.to_string()))?;
        let signature = self
            .signer
            .wallet_sign(&estimated.from, &bytes, MsgMeta::chain_message())
            .await?;
        let signed = SignedMessage {
            message: estimated,
            signature,
        };

        if let Some(validate) = validate {
            if !validate(&signed) {
                let cid = signed.cid().map_err(|e| SubmitError::Encode(e.to_string()))?;
                info!(%cid, "message declined by validator, not sent");
                return Ok(Submitted { cid, sent: false });
            }
        }

        let cid = self
            .chain
            .mpool_push(&signed)
            .await
            .map_err(SubmitError::at(SubmitStage::MpoolPush))?;
        info!(
            %cid,
            from = %signed.message.from,
            to = %signed.message.to,
            nonce = signed.message.nonce,
            fee_cap = %signed.message.gas_fee_cap,
            "pushed message"
        );

        Ok(Submitted { cid, sent: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_models::network::Network;
    use crate::models::address::Address;
    use crate::models::chain::MARKET_METHOD_ADD_BALANCE;
    use crate::tests::shared::ChainStage;
    use crate::tests::shared::FakeChain;
    use crate::wallet::LocalWallet;
    use crate::wallet::SignError;

    struct Setup {
        chain: Arc<FakeChain>,
        wallet: Arc<LocalWallet>,
        from: Address,
    }

    fn setup(actor_nonce: u64, estimated_fee_cap: u64) -> Setup {
        let mut wallet = LocalWallet::new(Network::Mainnet);
        let from = wallet.generate_key();
        let chain = FakeChain::default().with_actor(from, actor_nonce, TokenAmount::from_whole(10));
        chain.lock().estimated_fee_cap = TokenAmount::from(estimated_fee_cap);
        Setup {
            chain: Arc::new(chain),
            wallet: Arc::new(wallet),
            from,
        }
    }

    fn submitter(setup: &Setup) -> TransactionSubmitter {
        TransactionSubmitter::new(setup.chain.clone(), setup.wallet.clone())
    }

    fn message(from: Address) -> Message {
        let to = Address::storage_market_actor(Network::Mainnet);
        Message::new(to, from, TokenAmount::from(5u64), MARKET_METHOD_ADD_BALANCE, vec![])
    }

    #[test]
    fn floor_is_base_fee_plus_twenty_percent() {
        assert_eq!(TokenAmount::from(120u64), fee_cap_floor(&TokenAmount::from(100u64)));
    }

    #[tokio::test]
    async fn low_estimate_is_raised_to_the_floor() {
        let setup = setup(7, 50);
        let submitted = submitter(&setup)
            .submit(message(setup.from), None)
            .await
            .unwrap();
        assert!(submitted.sent);

        let pushed = setup.chain.pushed();
        assert_eq!(1, pushed.len());
        assert_eq!(TokenAmount::from(120u64), pushed[0].message.gas_fee_cap);
        assert_eq!(8, pushed[0].message.nonce);
        assert_eq!(pushed[0].cid().unwrap(), submitted.cid);
    }

    #[tokio::test]
    async fn high_estimate_is_never_lowered() {
        let setup = setup(0, 500);
        submitter(&setup)
            .submit(message(setup.from), None)
            .await
            .unwrap();
        assert_eq!(TokenAmount::from(500u64), setup.chain.pushed()[0].message.gas_fee_cap);
    }

    #[tokio::test]
    async fn estimation_is_bounded_by_max_fee() {
        let setup = setup(0, 500);
        submitter(&setup)
            .with_max_fee(TokenAmount::from(42u64))
            .submit(message(setup.from), None)
            .await
            .unwrap();
        let specs = setup.chain.lock().estimate_specs.clone();
        assert_eq!(
            vec![MessageSendSpec {
                max_fee: TokenAmount::from(42u64)
            }],
            specs
        );
    }

    #[tokio::test]
    async fn signature_covers_the_final_message() {
        let setup = setup(3, 50);
        submitter(&setup)
            .submit(message(setup.from), None)
            .await
            .unwrap();
        let signed = &setup.chain.pushed()[0];
        let bytes = signed.message.signing_bytes().unwrap();
        assert!(setup.wallet.verify(&setup.from, &bytes, &signed.signature));
    }

    #[tokio::test]
    async fn declined_message_is_not_pushed() {
        let setup = setup(0, 500);
        let decline = |_: &SignedMessage| false;
        let submitted = submitter(&setup)
            .submit(message(setup.from), Some(&decline))
            .await
            .unwrap();
        assert!(!submitted.sent);
        assert!(setup.chain.pushed().is_empty());
    }

    #[tokio::test]
    async fn failures_name_their_stage() {
        for stage in [
            ChainStage::ChainHead,
            ChainStage::GetActor,
            ChainStage::GasEstimate,
            ChainStage::MpoolPush,
        ] {
            let setup = setup(0, 500);
            setup.chain.lock().failing_stage = Some(stage);

            let result = submitter(&setup).submit(message(setup.from), None).await;
            let expected = match stage {
                ChainStage::ChainHead => SubmitStage::ChainHead,
                ChainStage::GetActor => SubmitStage::NonceLookup,
                ChainStage::GasEstimate => SubmitStage::GasEstimation,
                ChainStage::MpoolPush => SubmitStage::MpoolPush,
            };
            assert!(
                matches!(result, Err(SubmitError::ChainApi { stage, .. }) if stage == expected),
                "stage {stage:?}"
            );
            assert!(setup.chain.pushed().is_empty());
        }
    }

    /// Hands out consecutive nonces starting at a fixed value.
    struct Reserving(std::sync::atomic::AtomicU64);

    #[async_trait::async_trait]
    impl NonceSource for Reserving {
        async fn next_nonce(&self, _address: &Address) -> Result<u64, crate::rpc::ApiError> {
            Ok(self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn installed_nonce_source_replaces_chain_lookup() {
        let setup = setup(7, 500);
        // chain state would fail, so only the installed source can answer
        setup.chain.lock().failing_stage = Some(ChainStage::GetActor);
        let submitter = submitter(&setup)
            .with_nonce_source(Arc::new(Reserving(std::sync::atomic::AtomicU64::new(100))));

        submitter.submit(message(setup.from), None).await.unwrap();
        submitter.submit(message(setup.from), None).await.unwrap();

        let nonces: Vec<u64> = setup.chain.pushed().iter().map(|m| m.message.nonce).collect();
        assert_eq!(vec![100, 101], nonces);
    }

    #[tokio::test]
    async fn foreign_sender_is_a_signing_error() {
        let setup = setup(0, 500);
        let stranger = Address::new_id(Network::Mainnet, 1234);
        setup
            .chain
            .lock()
            .actors
            .insert(stranger, crate::models::chain::Actor {
                nonce: 0,
                balance: TokenAmount::zero(),
            });

        let result = submitter(&setup).submit(message(stranger), None).await;
        assert!(matches!(
            result,
            Err(SubmitError::Signing(SignError::UnknownAddress(_)))
        ));
    }
}
