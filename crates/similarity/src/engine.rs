//! The similarity engine (C6): orchestrates C3-C5, applies thresholds,
//! and owns `EmbeddingRecord`/`VectorEntry` lifecycle (spec §4.6).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use prov_crypto::{content_hash, to_hex32};
use prov_storage::Storage;
use prov_types::model::{
    AssetType, EmbeddingRecord, EmbeddingStatus, SimilarityResult, SimilarityStatistics,
    SimilarityVerdict, VectorEntry, VectorMatch, VectorMetadata, VectorNamespace,
};
use prov_types::{CoreError, Result};

use crate::embedding::EmbeddingProvider;
use crate::llm::LlmAdjudicator;
use crate::vector_index::VectorIndexClient;

/// Tunables for threshold classification and query breadth (spec §4.6,
/// §6.4). Construction enforces the threshold invariant `0 ≤ t_clean <
/// t_warn ≤ 100` as a startup-time configuration error.
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub t_clean: u8,
    pub t_warn: u8,
    pub top_k: u32,
    pub enable_llm: bool,
    pub recent_blocked_limit: usize,
}

impl SimilarityConfig {
    pub fn validated(self) -> Result<Self> {
        if self.t_clean >= self.t_warn || self.t_warn > 100 {
            return Err(CoreError::Fatal(format!(
                "invalid similarity thresholds: t_clean={} t_warn={}",
                self.t_clean, self.t_warn
            )));
        }
        Ok(self)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct SimilarityEngine {
    storage: Storage,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<dyn VectorIndexClient>,
    llm_adjudicator: Option<Arc<dyn LlmAdjudicator>>,
    config: SimilarityConfig,
}

impl SimilarityEngine {
    pub fn new(
        storage: Storage,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<dyn VectorIndexClient>,
        llm_adjudicator: Option<Arc<dyn LlmAdjudicator>>,
        config: SimilarityConfig,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            embedding_provider,
            vector_index,
            llm_adjudicator,
            config: config.validated()?,
        })
    }

    /// `contentHash = keccak(packed(ipURI, nftURI))`, hex-encoded (spec
    /// §4.6 step 1). Exposed so C7 can compute the same hash to key its
    /// own dedup check before calling into this engine.
    pub fn compute_content_hash(ip_metadata_uri: &str, nft_metadata_uri: &str) -> String {
        to_hex32(&content_hash(ip_metadata_uri, nft_metadata_uri))
    }

    pub async fn check_and_admit(
        &self,
        ip_metadata_uri: &str,
        nft_metadata_uri: &str,
        asset_type: AssetType,
        creator_address: &str,
    ) -> Result<SimilarityResult> {
        let _timer = prov_telemetry::time::CheckTimer::new(
            prov_telemetry::similarity_metrics(),
            asset_type.as_str(),
        );

        let hash = Self::compute_content_hash(ip_metadata_uri, nft_metadata_uri);

        if self.storage.get_embedding(&hash)?.is_some() {
            prov_telemetry::similarity_metrics().inc_check(asset_type.as_str(), "blocked");
            return Ok(SimilarityResult {
                status: SimilarityVerdict::Blocked,
                similarity_score: 100,
                top_match: None,
                matches: Vec::new(),
                message: "already registered".to_string(),
                llm_analysis: None,
            });
        }

        let embedded = self
            .embedding_provider
            .embed(ip_metadata_uri, asset_type)
            .await?;

        let matches = self
            .vector_index
            .query(VectorNamespace::Registered, &embedded.vector, self.config.top_k)
            .await?;

        let top_match = matches.first().cloned();
        let percent = top_match
            .as_ref()
            .map(|m| (m.score * 100.0).round() as i32)
            .unwrap_or(0);

        let status = SimilarityVerdict::classify(percent, self.config.t_clean, self.config.t_warn);

        let llm_analysis = if self.config.enable_llm && percent > self.config.t_clean as i32 {
            match (&self.llm_adjudicator, &top_match) {
                (Some(adjudicator), Some(m)) => {
                    Some(adjudicator.analyze(ip_metadata_uri, m, percent).await)
                }
                _ => None,
            }
        } else {
            None
        };

        let record = EmbeddingRecord {
            content_hash: hash.clone(),
            vector_id: hash.clone(),
            embedding_vector: embedded.vector.clone(),
            asset_type,
            creator_address: creator_address.to_string(),
            ip_metadata_uri: ip_metadata_uri.to_string(),
            nft_metadata_uri: nft_metadata_uri.to_string(),
            embedding_model: embedded.model,
            frames_extracted: embedded.frames_extracted,
            similarity_status: EmbeddingStatus::from_verdict(status),
            top_match_score: Some(percent.clamp(0, 100) as u8),
            top_match_content_hash: top_match.as_ref().map(|m| m.metadata.content_hash.clone()),
            story_ip_id: None,
            review_notes: None,
            created_at: now_secs(),
        };
        self.storage.put_embedding(&record)?;

        if status != SimilarityVerdict::Blocked {
            let entry = VectorEntry {
                id: hash.clone(),
                vector: embedded.vector,
                metadata: VectorMetadata {
                    content_hash: hash,
                    asset_type,
                    creator_address: creator_address.to_string(),
                    story_ip_id: None,
                    ip_metadata_uri: ip_metadata_uri.to_string(),
                    nft_metadata_uri: nft_metadata_uri.to_string(),
                    timestamp: now_secs(),
                },
            };
            self.vector_index
                .upsert(VectorNamespace::Pending, vec![entry])
                .await?;
        }

        prov_telemetry::similarity_metrics().inc_check(asset_type.as_str(), status.as_lowercase());

        let message = match status {
            SimilarityVerdict::Clean => "no significant similarity found".to_string(),
            SimilarityVerdict::Warning => format!("similarity score {percent} is within the warning band"),
            SimilarityVerdict::Blocked => format!("similarity score {percent} exceeds the blocking threshold"),
        };

        Ok(SimilarityResult {
            status,
            similarity_score: percent,
            top_match,
            matches,
            message,
            llm_analysis,
        })
    }

    /// Called after an on-chain mint succeeds (spec §4.6 `promote`). Both
    /// the `pending` deletion and the `registered` upsert are attempted;
    /// only the `registered` upsert failing is propagated, matching the
    /// "best-effort pending cleanup" contract.
    pub async fn promote(&self, content_hash: &str, story_ip_id: &str) -> Result<()> {
        let mut record = match self.storage.get_embedding(content_hash)? {
            Some(r) => r,
            None => {
                return Err(CoreError::Internal(format!(
                    "promote called for unknown content hash {content_hash}"
                )))
            }
        };
        record.story_ip_id = Some(story_ip_id.to_string());
        record.similarity_status = EmbeddingStatus::Clean;
        self.storage.put_embedding(&record)?;

        if let Err(e) = self
            .vector_index
            .delete_one(VectorNamespace::Pending, content_hash)
            .await
        {
            tracing::warn!(error = %e, content_hash, "failed to remove pending vector entry during promote");
        }

        let entry = VectorEntry {
            id: content_hash.to_string(),
            vector: record.embedding_vector.clone(),
            metadata: VectorMetadata {
                content_hash: content_hash.to_string(),
                asset_type: record.asset_type,
                creator_address: record.creator_address.clone(),
                story_ip_id: Some(story_ip_id.to_string()),
                ip_metadata_uri: record.ip_metadata_uri.clone(),
                nft_metadata_uri: record.nft_metadata_uri.clone(),
                timestamp: now_secs(),
            },
        };
        self.vector_index
            .upsert(VectorNamespace::Registered, vec![entry])
            .await
    }

    pub fn statistics(&self) -> Result<SimilarityStatistics> {
        self.storage
            .embedding_statistics(self.config.recent_blocked_limit)
    }
}
