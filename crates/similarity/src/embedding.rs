//! The embedding provider (C3): turns a content URI into a vector,
//! dispatching on asset type (spec §4.3).

use async_trait::async_trait;
use base64::Engine;
use prov_types::model::AssetType;
use prov_types::{CoreError, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::frames::extract_video_frames;

/// The outcome of an `embed` call: the vector, the model that produced
/// it, and, for video, how many frames were sampled to produce it.
pub struct EmbedOutput {
    pub vector: Vec<f32>,
    pub model: String,
    pub frames_extracted: Option<u32>,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, uri: &str, asset_type: AssetType) -> Result<EmbedOutput>;
}

/// Rewrites an `ipfs://` URI to an HTTP gateway URL; passes other schemes
/// through unchanged.
fn to_gateway_url(uri: &str, gateway_base: &str) -> String {
    match uri.strip_prefix("ipfs://") {
        Some(cid_path) => format!("{}/{}", gateway_base.trim_end_matches('/'), cid_path),
        None => uri.to_string(),
    }
}

/// A generic HTTP adapter over an OpenAI-compatible embeddings endpoint,
/// driving external multimodal embedding models the same way the core's
/// inference runtimes drive external chat models.
pub struct HttpEmbeddingProvider {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    gateway_base: String,
    max_video_frames: u32,
}

impl HttpEmbeddingProvider {
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        gateway_base: String,
        max_video_frames: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CoreError::Fatal(format!("failed to build embedding http client: {e}")))?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
            gateway_base,
            max_video_frames,
        })
    }

    async fn embed_input(&self, input: serde_json::Value) -> Result<Vec<f32>> {
        let body = json!({ "input": input, "model": self.model });
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamTimeout(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::UpstreamError(format!(
                "embedding api error: {text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("invalid embedding response: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CoreError::UpstreamError("embedding api returned no data".to_string()))
    }

    async fn fetch_bytes(&self, uri: &str) -> Result<Vec<u8>> {
        let url = to_gateway_url(uri, &self.gateway_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamTimeout(format!("content fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::UpstreamError(format!(
                "content fetch returned status {}",
                response.status()
            )));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CoreError::UpstreamError(format!("failed to read content body: {e}")))
    }
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(serde::Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, uri: &str, asset_type: AssetType) -> Result<EmbedOutput> {
        match asset_type {
            AssetType::Text | AssetType::Audio => {
                let bytes = self.fetch_bytes(uri).await?;
                let text = String::from_utf8(bytes).map_err(|e| {
                    CoreError::UpstreamError(format!("content is not valid utf-8: {e}"))
                })?;
                let vector = self.embed_input(json!(text)).await?;
                Ok(EmbedOutput {
                    vector,
                    model: self.model.clone(),
                    frames_extracted: None,
                })
            }
            AssetType::Image => {
                let bytes = self.fetch_bytes(uri).await?;
                let data_uri = format!(
                    "data:image/jpeg;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(&bytes)
                );
                let vector = self.embed_input(json!(data_uri)).await?;
                Ok(EmbedOutput {
                    vector,
                    model: self.model.clone(),
                    frames_extracted: None,
                })
            }
            AssetType::Video => {
                let bytes = self.fetch_bytes(uri).await?;
                let frames = extract_video_frames(&bytes, self.max_video_frames).await?;
                let mut sum: Vec<f32> = Vec::new();
                for frame in &frames {
                    let data_uri = format!(
                        "data:image/jpeg;base64,{}",
                        base64::engine::general_purpose::STANDARD.encode(frame)
                    );
                    let vector = self.embed_input(json!(data_uri)).await?;
                    if sum.is_empty() {
                        sum = vec![0.0; vector.len()];
                    }
                    for (acc, v) in sum.iter_mut().zip(vector.iter()) {
                        *acc += v;
                    }
                }
                if sum.is_empty() {
                    return Err(CoreError::UpstreamError(
                        "video yielded no extractable frames".to_string(),
                    ));
                }
                let n = frames.len() as f32;
                for v in &mut sum {
                    *v /= n;
                }
                Ok(EmbedOutput {
                    vector: sum,
                    model: self.model.clone(),
                    frames_extracted: Some(frames.len() as u32),
                })
            }
        }
    }
}

/// A deterministic, network-free embedding provider for tests: hashes the
/// URI and expands the digest into a unit vector. Mirrors the teacher's
/// mock inference runtime's deterministic-hash-to-vector approach.
#[derive(Debug, Default, Clone)]
pub struct MockEmbeddingProvider {
    pub dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, uri: &str, asset_type: AssetType) -> Result<EmbedOutput> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(uri.as_bytes());
        let seed = digest.as_slice();
        let dim = if self.dimension == 0 { 1024 } else { self.dimension };
        let mut vector = Vec::with_capacity(dim);
        for i in 0..dim {
            let byte = seed[i % seed.len()];
            let modifier = (i * 7) as u8;
            let val = byte.wrapping_add(modifier);
            vector.push((val as f32 / 255.0) * 2.0 - 1.0);
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        let frames_extracted = matches!(asset_type, AssetType::Video).then_some(1);
        Ok(EmbedOutput {
            vector,
            model: "mock-embedding-v1".to_string(),
            frames_extracted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider { dimension: 32 };
        let a = provider.embed("ipfs://x", AssetType::Text).await.unwrap();
        let b = provider.embed("ipfs://x", AssetType::Text).await.unwrap();
        assert_eq!(a.vector, b.vector);
        let c = provider.embed("ipfs://y", AssetType::Text).await.unwrap();
        assert_ne!(a.vector, c.vector);
    }

    #[test]
    fn gateway_rewrite_only_applies_to_ipfs_uris() {
        assert_eq!(
            to_gateway_url("ipfs://cid/path", "https://gw.example"),
            "https://gw.example/cid/path"
        );
        assert_eq!(
            to_gateway_url("https://already.example/x", "https://gw.example"),
            "https://already.example/x"
        );
    }
}
