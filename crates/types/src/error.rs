//! Error taxonomy for the content-admission and mint-authorization core.
//!
//! Variants are grouped by the kinds described in spec §7
//! (ClientValidation, StateConflict, PolicyDenial, UpstreamTimeout /
//! UpstreamError, NonCriticalPostcondition, Fatal). Each variant carries a
//! stable machine-readable code via [`ErrorCode`] so the HTTP surface can
//! map it to a wire error without re-deriving the taxonomy.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// The similarity verdict returned alongside a `SIMILARITY_BLOCKED` denial.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SimilarityDenial {
    pub similarity_score: u8,
    pub top_match_content_hash: Option<String>,
    pub top_match_story_ip_id: Option<String>,
    pub message: String,
}

/// The prior mint details returned alongside an idempotency conflict.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PriorMintDetails {
    pub ip_id: String,
    pub token_id: String,
    pub tx_hash: String,
}

/// The prior license snapshot returned alongside `ALREADY_FINALIZED`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PriorLicenseDetails {
    pub license_terms_id: String,
    pub license_type: String,
    pub royalty_percent: u8,
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or malformed request fields.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Semantically well-formed but out-of-range/enum-invalid fields.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A `used`/`registered` authorization already exists for this content hash.
    #[error("duplicate content")]
    DuplicateContent(PriorMintDetails),

    /// Mint token already moved past `pending` for a conflicting update.
    #[error("token already used")]
    TokenAlreadyUsed(PriorMintDetails),

    /// Operation attempted against a record in the wrong state.
    #[error("invalid status transition: {0}")]
    InvalidStatus(String),

    /// `finalize` called on an already-`registered` authorization.
    #[error("already finalized")]
    AlreadyFinalized(PriorLicenseDetails),

    /// Content was classified BLOCKED by the similarity engine.
    #[error("similarity blocked")]
    SimilarityBlocked(SimilarityDenial),

    /// Requested nonce has no corresponding record.
    #[error("token not found: {0}")]
    TokenNotFound(u64),

    /// An outbound call (embedding, LLM, vector index, persistence) timed out.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// An outbound call failed for a reason other than timeout.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// A startup-time configuration invariant was violated, or the
    /// persistence layer / verifier key is unavailable at startup.
    #[error("fatal: {0}")]
    Fatal(String),

    /// An unexpected internal condition; always a bug if observed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::DuplicateContent(_) => "DUPLICATE_CONTENT",
            CoreError::TokenAlreadyUsed(_) => "TOKEN_ALREADY_USED",
            CoreError::InvalidStatus(_) => "INVALID_STATUS",
            CoreError::AlreadyFinalized(_) => "ALREADY_FINALIZED",
            CoreError::SimilarityBlocked(_) => "SIMILARITY_BLOCKED",
            CoreError::TokenNotFound(_) => "TOKEN_NOT_FOUND",
            CoreError::UpstreamTimeout(_) => "SERVER_ERROR",
            CoreError::UpstreamError(_) => "SERVER_ERROR",
            CoreError::Fatal(_) => "SERVER_ERROR",
            CoreError::Internal(_) => "SERVER_ERROR",
        }
    }
}

impl CoreError {
    /// The HTTP status code this error maps to on the `prov-api` surface.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::InvalidInput(_) => 400,
            CoreError::Validation(_) => 422,
            CoreError::DuplicateContent(_) => 409,
            CoreError::TokenAlreadyUsed(_) => 409,
            CoreError::InvalidStatus(_) => 409,
            CoreError::AlreadyFinalized(_) => 409,
            CoreError::SimilarityBlocked(_) => 403,
            CoreError::TokenNotFound(_) => 404,
            CoreError::UpstreamTimeout(_) => 500,
            CoreError::UpstreamError(_) => 500,
            CoreError::Fatal(_) => 500,
            CoreError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CoreError::InvalidInput("x".into()).code(), "INVALID_INPUT");
        assert_eq!(
            CoreError::SimilarityBlocked(SimilarityDenial {
                similarity_score: 92,
                top_match_content_hash: None,
                top_match_story_ip_id: None,
                message: "blocked".into(),
            })
            .code(),
            "SIMILARITY_BLOCKED"
        );
    }

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(CoreError::Validation("x".into()).status_code(), 422);
        assert_eq!(
            CoreError::TokenNotFound(1).status_code(),
            404
        );
    }
}
