//! The mint-authorization state machine (C7): `issue`, `status`, `update`,
//! `finalize`, `revoke` (spec §4.7).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use prov_crypto::VerifierSigner;
use prov_storage::{CasOutcome, Storage};
use prov_types::error::{PriorLicenseDetails, PriorMintDetails, SimilarityDenial};
use prov_types::model::{AssetType, LicenseType, MintAuthorization, MintDetails, MintStatus};
use prov_types::{CoreError, Result, MINT_AUTHORIZATION_TTL_SECS};

use prov_similarity::SimilarityEngine;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub creator_address: String,
    pub content_hash: String,
    pub ip_metadata_uri: String,
    pub nft_metadata_uri: String,
    pub asset_type: AssetType,
    pub session_id: Option<String>,
    pub fingerprint_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssueResponse {
    pub signature: [u8; 65],
    pub nonce: u64,
    pub expires_at: u64,
    pub expires_in: u64,
    pub similarity: Option<prov_types::model::SimilarityResult>,
}

#[derive(Debug, Clone)]
pub struct StatusResponse {
    pub nonce: u64,
    pub status: MintStatus,
    pub is_expired: bool,
    pub expires_at: u64,
    pub created_at: u64,
    pub remaining_seconds: Option<u64>,
    pub mint_details: Option<MintDetails>,
}

#[derive(Debug, Clone)]
pub struct UpdateResponse {
    pub nonce: u64,
    pub status: MintStatus,
    pub used_at: u64,
}

#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub license_terms_id: String,
    pub license_type: LicenseType,
    pub royalty_percent: u8,
    pub allow_derivatives: bool,
    pub commercial_use: bool,
    pub license_tx_hash: String,
}

#[derive(Debug, Clone)]
pub struct FinalizeResponse {
    pub nonce: u64,
    pub status: MintStatus,
    pub ip_id: String,
    pub license_terms_id: String,
    pub license_type: LicenseType,
    pub royalty_percent: u8,
}

#[derive(Debug, Clone)]
pub struct RevokeResponse {
    pub nonce: u64,
    pub revoked_at: u64,
    pub reason: String,
}

/// Drives the mint-authorization lifecycle. Holds no in-process mutable
/// state of its own — every transition is linearized by the storage
/// layer's atomic row operations (spec §5).
pub struct MintService {
    storage: Storage,
    signer: VerifierSigner,
    similarity: Arc<SimilarityEngine>,
}

impl MintService {
    pub fn new(storage: Storage, signer: VerifierSigner, similarity: Arc<SimilarityEngine>) -> Self {
        Self {
            storage,
            signer,
            similarity,
        }
    }

    /// Preconditions, similarity gate, nonce allocation, and signing (spec
    /// §4.7 `issue`).
    pub async fn issue(&self, req: IssueRequest) -> Result<IssueResponse> {
        if req.creator_address.is_empty()
            || req.content_hash.is_empty()
            || req.ip_metadata_uri.is_empty()
            || req.nft_metadata_uri.is_empty()
        {
            return Err(CoreError::InvalidInput(
                "creatorAddress, contentHash, ipMetadataURI, and nftMetadataURI are required"
                    .to_string(),
            ));
        }

        if let Some(existing) = self.storage.find_used_by_content_hash(&req.content_hash)? {
            return Err(CoreError::DuplicateContent(PriorMintDetails {
                ip_id: existing.mint.ip_id,
                token_id: existing.mint.token_id,
                tx_hash: existing.mint.tx_hash,
            }));
        }

        let similarity_result = self
            .similarity
            .check_and_admit(
                &req.ip_metadata_uri,
                &req.nft_metadata_uri,
                req.asset_type,
                &req.creator_address,
            )
            .await?;

        if similarity_result.status == prov_types::model::SimilarityVerdict::Blocked {
            return Err(CoreError::SimilarityBlocked(SimilarityDenial {
                similarity_score: similarity_result.similarity_score.clamp(0, 100) as u8,
                top_match_content_hash: similarity_result
                    .top_match
                    .as_ref()
                    .map(|m| m.metadata.content_hash.clone()),
                top_match_story_ip_id: similarity_result
                    .top_match
                    .as_ref()
                    .and_then(|m| m.metadata.story_ip_id.clone()),
                message: similarity_result.message,
            }));
        }

        let nonce = self.storage.allocate_nonce()?;
        let now = now_secs();
        let expires_at = now + MINT_AUTHORIZATION_TTL_SECS;

        let (message, signature) = self
            .signer
            .sign(
                &req.creator_address,
                &req.content_hash,
                &req.ip_metadata_uri,
                &req.nft_metadata_uri,
                nonce,
                expires_at,
            )
            .await?;

        let auth = MintAuthorization {
            nonce,
            creator_address: req.creator_address,
            content_hash: req.content_hash,
            ip_metadata_uri: req.ip_metadata_uri,
            nft_metadata_uri: req.nft_metadata_uri,
            asset_type: req.asset_type,
            message,
            signature,
            issued_at: now,
            expires_at,
            status: MintStatus::Pending,
            session_id: req.session_id.unwrap_or_else(|| "no-session".to_string()),
            fingerprint_id: req
                .fingerprint_id
                .unwrap_or_else(|| "no-fingerprint".to_string()),
            mint: MintDetails::default(),
            license: Default::default(),
            revocation: Default::default(),
        };
        self.storage.insert_pending(&auth)?;
        prov_telemetry::mint_metrics().inc_issued(req.asset_type.as_str());

        Ok(IssueResponse {
            signature,
            nonce,
            expires_at,
            expires_in: MINT_AUTHORIZATION_TTL_SECS,
            similarity: Some(similarity_result),
        })
    }

    /// Lazily expires the record on read if its TTL has lapsed (spec §4.7
    /// `status`).
    pub fn status(&self, nonce: u64) -> Result<StatusResponse> {
        let mut auth = self
            .storage
            .get_mint(nonce)?
            .ok_or(CoreError::TokenNotFound(nonce))?;
        let now = now_secs();

        if auth.is_expired(now) {
            match self
                .storage
                .compare_and_update(nonce, MintStatus::Pending, |r| r.status = MintStatus::Expired)?
            {
                CasOutcome::Applied(updated) => {
                    prov_telemetry::mint_metrics().inc_expired(1);
                    auth = updated;
                }
                CasOutcome::Conflict(current) => auth = current,
                CasOutcome::NotFound => return Err(CoreError::TokenNotFound(nonce)),
            }
        }

        let remaining_seconds = (auth.status == MintStatus::Pending)
            .then(|| auth.expires_at.saturating_sub(now));
        let mint_details = matches!(auth.status, MintStatus::Used | MintStatus::Registered)
            .then(|| auth.mint.clone());

        Ok(StatusResponse {
            nonce,
            status: auth.status,
            is_expired: auth.status == MintStatus::Expired,
            expires_at: auth.expires_at,
            created_at: auth.issued_at,
            remaining_seconds,
            mint_details,
        })
    }

    /// Transitions `pending -> used`; best-effort promotes the content
    /// hash into the similarity engine's `registered` namespace (spec
    /// §4.7 `update`, §7 "NonCriticalPostcondition").
    pub async fn update(
        &self,
        nonce: u64,
        ip_id: String,
        token_id: String,
        tx_hash: String,
    ) -> Result<UpdateResponse> {
        let content_hash = self
            .storage
            .get_mint(nonce)?
            .ok_or(CoreError::TokenNotFound(nonce))?
            .content_hash;
        let now = now_secs();

        let outcome = self.storage.transition_to_used(nonce, &content_hash, |r| {
            r.mint = MintDetails {
                ip_id: ip_id.clone(),
                token_id: token_id.clone(),
                tx_hash: tx_hash.clone(),
                used_at: Some(now),
            };
        })?;

        match outcome {
            CasOutcome::Applied(updated) => {
                prov_telemetry::mint_metrics().inc_used();
                if let Err(e) = self.similarity.promote(&content_hash, &ip_id).await {
                    tracing::warn!(error = %e, nonce, content_hash, "promote failed after successful update");
                }
                Ok(UpdateResponse {
                    nonce,
                    status: updated.status,
                    used_at: now,
                })
            }
            CasOutcome::Conflict(current) => {
                prov_telemetry::mint_metrics().inc_conflict("update");
                match current.status {
                    MintStatus::Used | MintStatus::Registered => {
                        Err(CoreError::TokenAlreadyUsed(PriorMintDetails {
                            ip_id: current.mint.ip_id,
                            token_id: current.mint.token_id,
                            tx_hash: current.mint.tx_hash,
                        }))
                    }
                    other => Err(CoreError::InvalidStatus(format!(
                        "update requires status pending, found {}",
                        other.as_str()
                    ))),
                }
            }
            CasOutcome::NotFound => Err(CoreError::TokenNotFound(nonce)),
        }
    }

    /// Transitions `used -> registered`, attaching license terms (spec
    /// §4.7 `finalize`).
    pub fn finalize(&self, nonce: u64, req: FinalizeRequest) -> Result<FinalizeResponse> {
        if req.royalty_percent > 100 {
            return Err(CoreError::Validation(
                "royaltyPercent must be in [0, 100]".to_string(),
            ));
        }
        if req.license_type == LicenseType::NonCommercial && req.royalty_percent != 0 {
            return Err(CoreError::Validation(
                "non_commercial licenses must have royaltyPercent = 0".to_string(),
            ));
        }

        let now = now_secs();
        let outcome = self.storage.compare_and_update(nonce, MintStatus::Used, |r| {
            r.license = prov_types::model::LicenseDetails {
                license_terms_id: req.license_terms_id.clone(),
                license_type: Some(req.license_type),
                royalty_percent: req.royalty_percent,
                allow_derivatives: req.allow_derivatives,
                commercial_use: req.commercial_use,
                license_tx_hash: req.license_tx_hash.clone(),
                license_attached_at: Some(now),
            };
            r.status = MintStatus::Registered;
        })?;

        match outcome {
            CasOutcome::Applied(updated) => {
                prov_telemetry::mint_metrics().inc_finalized();
                Ok(FinalizeResponse {
                    nonce,
                    status: updated.status,
                    ip_id: updated.mint.ip_id,
                    license_terms_id: updated.license.license_terms_id,
                    license_type: req.license_type,
                    royalty_percent: updated.license.royalty_percent,
                })
            }
            CasOutcome::Conflict(current) => {
                prov_telemetry::mint_metrics().inc_conflict("finalize");
                if current.status == MintStatus::Registered {
                    Err(CoreError::AlreadyFinalized(PriorLicenseDetails {
                        license_terms_id: current.license.license_terms_id,
                        license_type: current
                            .license
                            .license_type
                            .map(|t| t.as_str().to_string())
                            .unwrap_or_default(),
                        royalty_percent: current.license.royalty_percent,
                    }))
                } else {
                    Err(CoreError::InvalidStatus(format!(
                        "finalize requires status used, found {}",
                        current.status.as_str()
                    )))
                }
            }
            CasOutcome::NotFound => Err(CoreError::TokenNotFound(nonce)),
        }
    }

    /// Transitions `pending -> revoked` (spec §4.7 `revoke`).
    pub fn revoke(&self, nonce: u64, reason: Option<String>) -> Result<RevokeResponse> {
        let now = now_secs();
        let reason_text = reason
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No reason provided.".to_string());
        let reason_for_closure = reason_text.clone();

        let outcome = self.storage.compare_and_update(nonce, MintStatus::Pending, |r| {
            r.revocation.revoked_at = Some(now);
            r.revocation.revoked_reason = Some(reason_for_closure.clone());
            r.status = MintStatus::Revoked;
        })?;

        match outcome {
            CasOutcome::Applied(_) => {
                prov_telemetry::mint_metrics().inc_revoked();
                Ok(RevokeResponse {
                    nonce,
                    revoked_at: now,
                    reason: reason_text,
                })
            }
            CasOutcome::Conflict(current) => {
                prov_telemetry::mint_metrics().inc_conflict("revoke");
                Err(CoreError::InvalidStatus(format!(
                    "revoke requires status pending, found {}",
                    current.status.as_str()
                )))
            }
            CasOutcome::NotFound => Err(CoreError::TokenNotFound(nonce)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_similarity::{InMemoryVectorIndex, MockEmbeddingProvider, SimilarityConfig};
    use std::sync::Arc;

    const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    fn service(dir: &std::path::Path) -> MintService {
        let storage = Storage::open(dir.join("core.redb")).unwrap();
        let similarity_storage = Storage::open(dir.join("similarity.redb")).unwrap();
        let signer = VerifierSigner::from_private_key_hex(TEST_KEY).unwrap();
        let similarity = Arc::new(
            SimilarityEngine::new(
                similarity_storage,
                Arc::new(MockEmbeddingProvider { dimension: 32 }),
                Arc::new(InMemoryVectorIndex::new()),
                None,
                SimilarityConfig {
                    t_clean: 40,
                    t_warn: 75,
                    top_k: 10,
                    enable_llm: false,
                    recent_blocked_limit: 10,
                },
            )
            .unwrap(),
        );
        MintService::new(storage, signer, similarity)
    }

    fn issue_req(content_hash: &str) -> IssueRequest {
        IssueRequest {
            creator_address: "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            content_hash: content_hash.to_string(),
            ip_metadata_uri: format!("ipfs://{content_hash}"),
            nft_metadata_uri: "ipfs://nft".to_string(),
            asset_type: AssetType::Text,
            session_id: None,
            fingerprint_id: None,
        }
    }

    #[tokio::test]
    async fn happy_path_issue_update_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let issued = svc.issue(issue_req("0xaa")).await.unwrap();
        assert_eq!(issued.nonce, 1);
        assert_eq!(issued.expires_in, 900);

        let updated = svc
            .update(1, "ip-1".to_string(), "42".to_string(), "0xtx1".to_string())
            .await
            .unwrap();
        assert_eq!(updated.status, MintStatus::Used);

        let finalized = svc
            .finalize(
                1,
                FinalizeRequest {
                    license_terms_id: "10".to_string(),
                    license_type: LicenseType::CommercialRemix,
                    royalty_percent: 10,
                    allow_derivatives: true,
                    commercial_use: true,
                    license_tx_hash: "0xlic1".to_string(),
                },
            )
            .unwrap();
        assert_eq!(finalized.status, MintStatus::Registered);

        let reissue = svc.issue(issue_req("0xaa")).await;
        assert!(matches!(reissue, Err(CoreError::DuplicateContent(_))));
    }

    #[tokio::test]
    async fn revoke_requires_pending() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        svc.issue(issue_req("0xcc")).await.unwrap();
        svc.update(1, "ip-1".to_string(), "1".to_string(), "0xtx".to_string())
            .await
            .unwrap();
        let result = svc.revoke(1, None);
        assert!(matches!(result, Err(CoreError::InvalidStatus(_))));
    }

    #[tokio::test]
    async fn second_update_observes_winner() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        svc.issue(issue_req("0xdd")).await.unwrap();
        svc.update(1, "ip-1".to_string(), "1".to_string(), "0xtx1".to_string())
            .await
            .unwrap();
        let second = svc
            .update(1, "ip-2".to_string(), "2".to_string(), "0xtx2".to_string())
            .await;
        match second {
            Err(CoreError::TokenAlreadyUsed(prior)) => assert_eq!(prior.ip_id, "ip-1"),
            other => panic!("expected TokenAlreadyUsed, got {other:?}"),
        }
    }

    /// A pending record whose `expiresAt` has already lapsed is reported
    /// as expired by `status` (the lazy `pending -> expired` transition),
    /// and a subsequent `update` against it is rejected as an invalid
    /// state rather than a normal conflict.
    #[tokio::test]
    async fn lapsed_pending_record_reports_expired_and_rejects_update() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.join("core.redb")).unwrap();
        let similarity_storage = Storage::open(dir.join("similarity.redb")).unwrap();
        let signer = VerifierSigner::from_private_key_hex(TEST_KEY).unwrap();
        let similarity = Arc::new(
            SimilarityEngine::new(
                similarity_storage,
                Arc::new(MockEmbeddingProvider { dimension: 32 }),
                Arc::new(InMemoryVectorIndex::new()),
                None,
                SimilarityConfig {
                    t_clean: 40,
                    t_warn: 75,
                    top_k: 10,
                    enable_llm: false,
                    recent_blocked_limit: 10,
                },
            )
            .unwrap(),
        );

        let nonce = storage.allocate_nonce().unwrap();
        storage
            .insert_pending(&MintAuthorization {
                nonce,
                creator_address: "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
                content_hash: "0xee".to_string(),
                ip_metadata_uri: "ipfs://0xee".to_string(),
                nft_metadata_uri: "ipfs://nft".to_string(),
                asset_type: AssetType::Text,
                message: [0u8; 32],
                signature: [0u8; 65],
                issued_at: 0,
                expires_at: 900,
                status: MintStatus::Pending,
                session_id: "no-session".to_string(),
                fingerprint_id: "no-fingerprint".to_string(),
                mint: MintDetails::default(),
                license: prov_types::model::LicenseDetails::default(),
                revocation: prov_types::model::RevocationDetails::default(),
            })
            .unwrap();

        let svc = MintService::new(storage, signer, similarity);

        let status = svc.status(nonce).unwrap();
        assert_eq!(status.status, MintStatus::Expired);
        assert!(status.is_expired);

        let update = svc
            .update(nonce, "ip-1".to_string(), "1".to_string(), "0xtx".to_string())
            .await;
        assert!(matches!(update, Err(CoreError::InvalidStatus(_))));
    }
}
