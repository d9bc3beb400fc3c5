use serde::{Deserialize, Serialize};

use super::AssetType;

/// The classification verdict for a queried asset (spec §4.6 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimilarityVerdict {
    Clean,
    Warning,
    Blocked,
}

impl SimilarityVerdict {
    /// Classify a similarity percentage against the configured thresholds
    /// (spec §4.6 step 6, I5). Pure function of `(percent, t_clean, t_warn)`.
    pub fn classify(percent: i32, t_clean: u8, t_warn: u8) -> Self {
        if percent <= t_clean as i32 {
            SimilarityVerdict::Clean
        } else if percent <= t_warn as i32 {
            SimilarityVerdict::Warning
        } else {
            SimilarityVerdict::Blocked
        }
    }

    pub fn as_lowercase(&self) -> &'static str {
        match self {
            SimilarityVerdict::Clean => "clean",
            SimilarityVerdict::Warning => "warning",
            SimilarityVerdict::Blocked => "blocked",
        }
    }
}

/// The lifecycle status stamped on an [`EmbeddingRecord`] (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingStatus {
    Clean,
    Warning,
    Blocked,
    PendingReview,
}

impl EmbeddingStatus {
    pub fn from_verdict(v: SimilarityVerdict) -> Self {
        match v {
            SimilarityVerdict::Clean => EmbeddingStatus::Clean,
            SimilarityVerdict::Warning => EmbeddingStatus::Warning,
            SimilarityVerdict::Blocked => EmbeddingStatus::Blocked,
        }
    }
}

/// One admitted content fingerprint (spec §3). Owned exclusively by the
/// similarity engine; never destroyed once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub content_hash: String,
    pub vector_id: String,
    pub embedding_vector: Vec<f32>,
    pub asset_type: AssetType,
    pub creator_address: String,
    pub ip_metadata_uri: String,
    pub nft_metadata_uri: String,
    pub embedding_model: String,
    pub frames_extracted: Option<u32>,
    pub similarity_status: EmbeddingStatus,
    pub top_match_score: Option<u8>,
    pub top_match_content_hash: Option<String>,
    pub story_ip_id: Option<String>,
    pub review_notes: Option<String>,
    pub created_at: u64,
}

/// The vector-index namespace an entry currently lives in (spec §3, glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorNamespace {
    Pending,
    Registered,
}

impl VectorNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorNamespace::Pending => "pending",
            VectorNamespace::Registered => "registered",
        }
    }
}

/// Metadata carried alongside a vector in the index (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub content_hash: String,
    pub asset_type: AssetType,
    pub creator_address: String,
    pub story_ip_id: Option<String>,
    pub ip_metadata_uri: String,
    pub nft_metadata_uri: String,
    pub timestamp: u64,
}

/// A single vector index entry (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A single query result returned from the vector index (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// The advisory output of the LLM adjudicator (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub summary: String,
    pub similarity_reasoning: String,
    pub is_derivative: bool,
    pub confidence_score: u8,
    pub recommendation: LlmRecommendation,
    pub detailed_comparison: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRecommendation {
    Approve,
    Warn,
    Block,
}

impl LlmAnalysis {
    /// Deterministic fallback used whenever the LLM call fails (network,
    /// parse, or model error) — the core never fails because the LLM
    /// failed (spec §4.5).
    pub fn fallback(similarity_percent: i32) -> Self {
        let recommendation = if similarity_percent >= 75 {
            LlmRecommendation::Block
        } else if similarity_percent >= 40 {
            LlmRecommendation::Warn
        } else {
            LlmRecommendation::Approve
        };
        LlmAnalysis {
            summary: "LLM analysis unavailable; falling back to numeric score.".to_string(),
            similarity_reasoning: format!(
                "fallback classification from similarity score {similarity_percent}"
            ),
            is_derivative: matches!(recommendation, LlmRecommendation::Block),
            confidence_score: 50,
            recommendation,
            detailed_comparison: String::new(),
        }
    }
}

/// The full response to a `checkAndAdmit` call (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub status: SimilarityVerdict,
    pub similarity_score: i32,
    pub top_match: Option<VectorMatch>,
    pub matches: Vec<VectorMatch>,
    pub message: String,
    pub llm_analysis: Option<LlmAnalysis>,
}

/// Aggregate counts by status plus recent blocked records (spec §4.6
/// `statistics()`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimilarityStatistics {
    pub clean: u64,
    pub warning: u64,
    pub blocked: u64,
    pub pending_review: u64,
    pub recent_blocked: Vec<EmbeddingRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries_match_spec() {
        assert_eq!(SimilarityVerdict::classify(40, 40, 75), SimilarityVerdict::Clean);
        assert_eq!(SimilarityVerdict::classify(41, 40, 75), SimilarityVerdict::Warning);
        assert_eq!(SimilarityVerdict::classify(76, 40, 75), SimilarityVerdict::Blocked);
        assert_eq!(SimilarityVerdict::classify(75, 40, 75), SimilarityVerdict::Warning);
    }

    #[test]
    fn fallback_matches_documented_bands() {
        assert_eq!(LlmAnalysis::fallback(80).recommendation, LlmRecommendation::Block);
        assert_eq!(LlmAnalysis::fallback(50).recommendation, LlmRecommendation::Warn);
        assert_eq!(LlmAnalysis::fallback(10).recommendation, LlmRecommendation::Approve);
    }
}
