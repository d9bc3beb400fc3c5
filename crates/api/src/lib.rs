#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! The public HTTP surface (spec §6): verification and license-terms
//! routes, layered with rate limiting, request tracing, and a panic
//! catcher (ported from the teacher's `http-rpc-gateway`).

pub mod dto;
pub mod error;
mod handlers;
pub mod rate_limit;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, patch, post};
use axum::Router;
use ipnetwork::IpNetwork;
use tower::{limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use prov_mint::{LicenseCache, MintService};
use rate_limit::IpLimiter;

pub struct AppState {
    pub mint: MintService,
    pub license: LicenseCache,
}

/// Tunables for the HTTP surface (spec §6.4 configuration section).
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_addr: String,
    pub rps: u32,
    pub burst: u32,
    pub body_limit_kb: usize,
    pub trusted_proxies: Vec<String>,
}

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "success": false, "error": "TIMEOUT", "message": "request timed out"
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false, "error": "SERVER_ERROR", "message": err.to_string()
            })),
        )
    }
}

pub fn build_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let cidrs: Vec<IpNetwork> = config
        .trusted_proxies
        .iter()
        .filter_map(|s| IpNetwork::from_str(s).ok())
        .collect();
    let limiter = IpLimiter::new(config.rps, config.burst, cidrs);

    Router::new()
        .route("/api/verification/generate-mint-token", post(handlers::generate_mint_token))
        .route("/api/verification/token/:nonce/status", get(handlers::token_status))
        .route("/api/verification/token/:nonce/update", patch(handlers::update_token))
        .route("/api/verification/token/:nonce/finalize", patch(handlers::finalize_token))
        .route("/api/verification/revoke-token", post(handlers::revoke_token))
        .route("/api/license-terms/find", get(handlers::find_license))
        .route("/api/license-terms/cache", post(handlers::cache_license))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit::rate_limit_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(256))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
}

pub async fn run_server(router: Router, config: &ApiConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.listen_addr.parse()?;
    tracing::info!(%addr, "prov-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("prov-api shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use prov_crypto::VerifierSigner;
    use prov_mint::LicenseCache;
    use prov_similarity::{InMemoryVectorIndex, MockEmbeddingProvider, SimilarityConfig, SimilarityEngine};
    use prov_storage::Storage;
    use tower::ServiceExt;

    const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
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
        Arc::new(AppState {
            mint: MintService::new(storage.clone(), signer, similarity),
            license: LicenseCache::new(storage),
        })
    }

    fn test_config() -> ApiConfig {
        ApiConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            rps: 1000,
            burst: 1000,
            body_limit_kb: 64,
            trusted_proxies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn generate_mint_token_returns_signature_and_nonce() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let router = build_router(state, &test_config());

        let body = serde_json::json!({
            "creatorAddress": "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "contentHash": "0xaa",
            "ipMetadataURI": "ipfs://ip",
            "nftMetadataURI": "ipfs://nft",
            "assetType": "text",
        });
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/verification/generate-mint-token")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_of_unknown_nonce_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let router = build_router(state, &test_config());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/verification/token/999/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
