//! The LLM adjudicator (C5): an optional semantic second opinion on the
//! top similarity match (spec §4.5). The core never fails because the LLM
//! failed — every error path resolves to [`LlmAnalysis::fallback`].

use async_trait::async_trait;
use prov_types::model::{LlmAnalysis, LlmRecommendation, VectorMatch};
use prov_types::{CoreError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[async_trait]
pub trait LlmAdjudicator: Send + Sync {
    async fn analyze(
        &self,
        query_uri: &str,
        top_match: &VectorMatch,
        similarity_percent: i32,
    ) -> LlmAnalysis;
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct LlmAnalysisPayload {
    summary: String,
    similarity_reasoning: String,
    is_derivative: bool,
    confidence_score: u8,
    recommendation: LlmRecommendation,
    detailed_comparison: String,
}

/// Drives an OpenAI-compatible chat-completion endpoint, instructed to
/// respond with strict JSON matching [`LlmAnalysisPayload`].
pub struct HttpLlmAdjudicator {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpLlmAdjudicator {
    pub fn new(api_url: String, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| CoreError::Fatal(format!("failed to build llm http client: {e}")))?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
        })
    }

    async fn call(
        &self,
        query_uri: &str,
        top_match: &VectorMatch,
        similarity_percent: i32,
    ) -> Result<LlmAnalysis> {
        let prompt = format!(
            "You are adjudicating content similarity for an IP-registration system. \
             The query asset is at {query_uri}. The closest registered match is content \
             hash {} with a numeric similarity score of {similarity_percent} out of 100. \
             Respond with strict JSON only, matching this shape: {{\"summary\": string, \
             \"similarity_reasoning\": string, \"is_derivative\": bool, \"confidence_score\": \
             int (0-100), \"recommendation\": \"approve\"|\"warn\"|\"block\", \
             \"detailed_comparison\": string}}.",
            top_match.metadata.content_hash
        );
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamTimeout(format!("llm request failed: {e}")))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::UpstreamError(format!("llm api error: {text}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("invalid llm response: {e}")))?;
        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| CoreError::UpstreamError("llm returned no content".to_string()))?;
        let payload: LlmAnalysisPayload = serde_json::from_str(&content)
            .map_err(|e| CoreError::UpstreamError(format!("llm response was not strict json: {e}")))?;

        Ok(LlmAnalysis {
            summary: payload.summary,
            similarity_reasoning: payload.similarity_reasoning,
            is_derivative: payload.is_derivative,
            confidence_score: payload.confidence_score,
            recommendation: payload.recommendation,
            detailed_comparison: payload.detailed_comparison,
        })
    }
}

#[async_trait]
impl LlmAdjudicator for HttpLlmAdjudicator {
    async fn analyze(
        &self,
        query_uri: &str,
        top_match: &VectorMatch,
        similarity_percent: i32,
    ) -> LlmAnalysis {
        match self.call(query_uri, top_match, similarity_percent).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "llm adjudicator failed, falling back to deterministic classification");
                prov_telemetry::similarity_metrics().inc_llm_fallback();
                LlmAnalysis::fallback(similarity_percent)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_types::model::{AssetType, VectorMetadata};

    struct FailingAdjudicator;

    #[async_trait]
    impl LlmAdjudicator for FailingAdjudicator {
        async fn analyze(
            &self,
            _query_uri: &str,
            _top_match: &VectorMatch,
            similarity_percent: i32,
        ) -> LlmAnalysis {
            LlmAnalysis::fallback(similarity_percent)
        }
    }

    #[tokio::test]
    async fn fallback_path_never_panics_and_matches_bands() {
        let adjudicator = FailingAdjudicator;
        let top_match = VectorMatch {
            id: "v1".to_string(),
            score: 0.8,
            metadata: VectorMetadata {
                content_hash: "0xabc".to_string(),
                asset_type: AssetType::Text,
                creator_address: "0xcreator".to_string(),
                story_ip_id: None,
                ip_metadata_uri: "ipfs://ip".to_string(),
                nft_metadata_uri: "ipfs://nft".to_string(),
                timestamp: 0,
            },
        };
        let analysis = adjudicator.analyze("ipfs://ip", &top_match, 80).await;
        assert_eq!(analysis.recommendation, LlmRecommendation::Block);
    }
}
