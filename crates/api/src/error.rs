//! Maps [`CoreError`] onto the HTTP error envelope (spec §6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use prov_types::{CoreError, ErrorCode};
use serde_json::{json, Value};

pub struct AppError(pub CoreError);

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.0.code();

        let mut body: Value = json!({
            "success": false,
            "error": code,
            "message": self.0.to_string(),
        });

        match &self.0 {
            CoreError::DuplicateContent(prior) | CoreError::TokenAlreadyUsed(prior) => {
                body["ipId"] = json!(prior.ip_id);
                body["tokenId"] = json!(prior.token_id);
                body["txHash"] = json!(prior.tx_hash);
            }
            CoreError::AlreadyFinalized(prior) => {
                body["licenseTermsId"] = json!(prior.license_terms_id);
                body["licenseType"] = json!(prior.license_type);
                body["royaltyPercent"] = json!(prior.royalty_percent);
            }
            CoreError::SimilarityBlocked(denial) => {
                body["similarityScore"] = json!(denial.similarity_score);
                body["topMatch"] = json!({
                    "contentHash": denial.top_match_content_hash,
                    "storyIpId": denial.top_match_story_ip_id,
                });
            }
            CoreError::UpstreamTimeout(detail) | CoreError::UpstreamError(detail) => {
                tracing::warn!(detail, code, "upstream failure surfaced to client");
            }
            CoreError::Fatal(detail) | CoreError::Internal(detail) => {
                tracing::error!(detail, code, "internal error surfaced to client");
                body["message"] = json!("internal server error");
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
