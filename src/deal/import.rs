//! Hand-off of archive data for offline deals to the deal-market backend.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;
use uuid::Uuid;

use crate::models::cid::Cid;
use crate::rpc::market_api::MarketApi;
use crate::rpc::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("{0:?} is neither a deal uuid nor a proposal cid")]
    InvalidReference(String),

    #[error("archive {} is not accessible: {source}", .path.display())]
    MissingArchive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("market api failed while {stage}: {source}")]
    MarketApi {
        stage: &'static str,
        source: ApiError,
    },

    #[error("market declined the data import: {0}")]
    Rejected(String),
}

/// A deal as the user refers to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DealRef {
    Uuid(Uuid),
    ProposalCid(Cid),
}

impl FromStr for DealRef {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(uuid) = Uuid::parse_str(s) {
            return Ok(Self::Uuid(uuid));
        }
        Cid::from_str(s)
            .map(Self::ProposalCid)
            .map_err(|_| ImportError::InvalidReference(s.to_string()))
    }
}

impl fmt::Display for DealRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(f, "{uuid}"),
            Self::ProposalCid(cid) => write!(f, "{cid}"),
        }
    }
}

/// Tell the market backend that the data for `deal` is at `path`.
///
/// Returns the deal uuid the data was attached to.
pub async fn import_offline_data(
    market: &dyn MarketApi,
    deal: &DealRef,
    path: &Path,
    delete_after_import: bool,
) -> Result<Uuid, ImportError> {
    let path = std::fs::canonicalize(path).map_err(|source| ImportError::MissingArchive {
        path: path.to_path_buf(),
        source,
    })?;

    let deal_uuid = match deal {
        DealRef::Uuid(uuid) => *uuid,
        DealRef::ProposalCid(cid) => {
            market
                .deal_by_signed_proposal_cid(cid)
                .await
                .map_err(|source| ImportError::MarketApi {
                    stage: "looking up deal by proposal cid",
                    source,
                })?
                .deal_uuid
        }
    };

    let rejection = market
        .offline_deal_with_data(deal_uuid, &path, delete_after_import)
        .await
        .map_err(|source| ImportError::MarketApi {
            stage: "importing offline deal data",
            source,
        })?;
    // an empty reason is an acceptance
    if let Some(rejection) = rejection.filter(|r| !r.reason.is_empty()) {
        return Err(ImportError::Rejected(rejection.reason));
    }

    info!(%deal_uuid, path = %path.display(), "offline deal data handed to market");
    Ok(deal_uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cid::sha2_256;
    use crate::models::cid::DAG_CBOR;
    use crate::models::deal::MarketDeal;
    use crate::tests::shared::FakeMarket;

    #[test]
    fn deal_refs_parse_from_uuid_or_cid() {
        let uuid = Uuid::new_v4();
        assert_eq!(DealRef::Uuid(uuid), uuid.to_string().parse().unwrap());

        let cid = sha2_256(DAG_CBOR, b"proposal").unwrap();
        assert_eq!(DealRef::ProposalCid(cid), cid.to_string().parse().unwrap());

        assert!(matches!(
            "neither".parse::<DealRef>(),
            Err(ImportError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn proposal_cid_is_resolved_to_its_deal() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("root.car");
        std::fs::write(&archive, b"car").unwrap();

        let market = FakeMarket::default();
        let proposal_cid = sha2_256(DAG_CBOR, b"proposal").unwrap();
        let deal_uuid = Uuid::new_v4();
        market.deals.lock().unwrap().push(MarketDeal {
            deal_uuid,
            signed_proposal_cid: proposal_cid,
        });

        let imported = import_offline_data(&market, &DealRef::ProposalCid(proposal_cid), &archive, true)
            .await
            .unwrap();
        assert_eq!(deal_uuid, imported);

        let imports = market.imports();
        assert_eq!(1, imports.len());
        assert_eq!(deal_uuid, imports[0].deal_uuid);
        assert!(imports[0].path.is_absolute());
        assert!(imports[0].delete_after_import);
    }

    #[tokio::test]
    async fn declined_import_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("root.car");
        std::fs::write(&archive, b"car").unwrap();

        let market = FakeMarket::default();
        *market.rejection.lock().unwrap() = Some("deal not found".to_string());

        let result = import_offline_data(&market, &DealRef::Uuid(Uuid::new_v4()), &archive, true).await;
        assert!(matches!(result, Err(ImportError::Rejected(reason)) if reason == "deal not found"));
    }

    #[tokio::test]
    async fn rejection_without_reason_is_an_acceptance() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("root.car");
        std::fs::write(&archive, b"car").unwrap();

        let market = FakeMarket::default();
        *market.rejection.lock().unwrap() = Some(String::new());

        let deal_uuid = Uuid::new_v4();
        let imported = import_offline_data(&market, &DealRef::Uuid(deal_uuid), &archive, false)
            .await
            .unwrap();
        assert_eq!(deal_uuid, imported);
        assert_eq!(1, market.imports().len());
    }

    #[tokio::test]
    async fn missing_archive_is_reported_before_calling_the_market() {
        let dir = tempfile::tempdir().unwrap();
        let market = FakeMarket::default();

        let result = import_offline_data(
            &market,
            &DealRef::Uuid(Uuid::new_v4()),
            &dir.path().join("gone.car"),
            true,
        )
        .await;
        assert!(matches!(result, Err(ImportError::MissingArchive { .. })));
        assert!(market.imports().is_empty());
    }

    #[tokio::test]
    async fn unknown_proposal_names_the_lookup_stage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("root.car");
        std::fs::write(&archive, b"car").unwrap();
        let market = FakeMarket::default();

        let result = import_offline_data(
            &market,
            &DealRef::ProposalCid(sha2_256(DAG_CBOR, b"unknown").unwrap()),
            &archive,
            true,
        )
        .await;
        assert!(matches!(
            result,
            Err(ImportError::MarketApi { stage, .. }) if stage == "looking up deal by proposal cid"
        ));
    }
}
