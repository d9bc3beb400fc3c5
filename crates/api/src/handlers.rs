//! Route handlers for the public HTTP surface (spec §6).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use prov_mint::{FinalizeRequest, IssueRequest};

use crate::dto::*;
use crate::error::AppError;
use crate::AppState;

fn record(route: &str, status: u16, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    prov_telemetry::api_metrics().inc_requests_total(route, status);
    prov_telemetry::api_metrics().observe_request_duration(route, status, elapsed);
}

pub async fn generate_mint_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateMintTokenRequest>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/verification/generate-mint-token";
    let result = state
        .mint
        .issue(IssueRequest {
            creator_address: body.creator_address,
            content_hash: body.content_hash,
            ip_metadata_uri: body.ip_metadata_uri,
            nft_metadata_uri: body.nft_metadata_uri,
            asset_type: body.asset_type,
            session_id: body.session_id,
            fingerprint_id: body.fingerprint_id,
        })
        .await;

    match result {
        Ok(issued) => {
            record(route, 200, started);
            Ok((StatusCode::OK, Json(Envelope::ok(GenerateMintTokenResponse::from(issued)))).into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}

pub async fn token_status(
    State(state): State<Arc<AppState>>,
    Path(nonce): Path<u64>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/verification/token/:nonce/status";
    match state.mint.status(nonce) {
        Ok(status) => {
            record(route, 200, started);
            Ok((StatusCode::OK, Json(Envelope::ok(TokenStatusResponse::from(status)))).into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}

pub async fn update_token(
    State(state): State<Arc<AppState>>,
    Path(nonce): Path<u64>,
    Json(body): Json<UpdateTokenRequest>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/verification/token/:nonce/update";
    let result = state.mint.update(nonce, body.ip_id, body.token_id, body.tx_hash).await;
    match result {
        Ok(updated) => {
            record(route, 200, started);
            Ok((StatusCode::OK, Json(Envelope::ok(UpdateTokenResponse::from(updated)))).into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}

pub async fn finalize_token(
    State(state): State<Arc<AppState>>,
    Path(nonce): Path<u64>,
    Json(body): Json<FinalizeTokenRequest>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/verification/token/:nonce/finalize";
    let result = state.mint.finalize(
        nonce,
        FinalizeRequest {
            license_terms_id: body.license_terms_id,
            license_type: body.license_type,
            royalty_percent: body.royalty_percent,
            allow_derivatives: body.allow_derivatives,
            commercial_use: body.commercial_use,
            license_tx_hash: body.license_tx_hash,
        },
    );
    match result {
        Ok(finalized) => {
            record(route, 200, started);
            Ok((StatusCode::OK, Json(Envelope::ok(FinalizeTokenResponse::from(finalized)))).into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}

pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RevokeTokenRequest>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/verification/revoke-token";
    match state.mint.revoke(body.nonce, body.reason) {
        Ok(revoked) => {
            record(route, 200, started);
            Ok((StatusCode::OK, Json(Envelope::ok(RevokeTokenResponse::from(revoked)))).into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}

pub async fn find_license(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FindLicenseQuery>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/license-terms/find";
    match state.license.find(query.license_type, query.royalty) {
        Ok(Some(entry)) => {
            record(route, 200, started);
            Ok((
                StatusCode::OK,
                Json(Envelope::ok(FindLicenseResponse {
                    cached: true,
                    license_terms_id: Some(entry.license_terms_id),
                })),
            )
                .into_response())
        }
        Ok(None) => {
            record(route, 200, started);
            Ok((
                StatusCode::OK,
                Json(Envelope::ok(FindLicenseResponse {
                    cached: false,
                    license_terms_id: None,
                })),
            )
                .into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}

pub async fn cache_license(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CacheLicenseRequestBody>,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let route = "/api/license-terms/cache";
    let result = state.license.cache(prov_mint::license::CacheLicenseRequest {
        license_type: body.license_type,
        royalty_percent: body.royalty_percent,
        license_terms_id: body.license_terms_id,
        transaction_hash: body.transaction_hash,
    });
    match result {
        Ok(cached) => {
            let status = if cached.created { StatusCode::CREATED } else { StatusCode::OK };
            record(route, status.as_u16(), started);
            Ok((
                status,
                Json(Envelope::ok(CacheLicenseResponseBody {
                    license_terms_id: cached.license_terms_id,
                    created: cached.created,
                })),
            )
                .into_response())
        }
        Err(e) => {
            record(route, e.status_code(), started);
            Err(e.into())
        }
    }
}
