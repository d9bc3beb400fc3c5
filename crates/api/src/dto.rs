//! Wire-format request/response bodies for the public HTTP surface (spec
//! §6). Field names are camelCase to match the documented JSON shape.

use serde::{Deserialize, Serialize};

use prov_types::model::{AssetType, LicenseType, SimilarityResult};

fn hex65(bytes: &[u8; 65]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Wraps every successful response body in the `success:true` envelope
/// (spec §6 "Responses are JSON with a `success:bool` envelope").
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMintTokenRequest {
    pub creator_address: String,
    pub content_hash: String,
    pub ip_metadata_uri: String,
    pub nft_metadata_uri: String,
    pub asset_type: AssetType,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub fingerprint_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMintTokenResponse {
    pub signature: String,
    pub nonce: u64,
    pub expires_at: u64,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<SimilarityResult>,
}

impl From<prov_mint::IssueResponse> for GenerateMintTokenResponse {
    fn from(r: prov_mint::IssueResponse) -> Self {
        Self {
            signature: hex65(&r.signature),
            nonce: r.nonce,
            expires_at: r.expires_at,
            expires_in: r.expires_in,
            similarity: r.similarity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintDetailsDto {
    pub ip_id: String,
    pub token_id: String,
    pub tx_hash: String,
    pub used_at: Option<u64>,
}

impl From<prov_types::model::MintDetails> for MintDetailsDto {
    fn from(m: prov_types::model::MintDetails) -> Self {
        Self {
            ip_id: m.ip_id,
            token_id: m.token_id,
            tx_hash: m.tx_hash,
            used_at: m.used_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatusResponse {
    pub nonce: u64,
    pub status: &'static str,
    pub is_expired: bool,
    pub expires_at: u64,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_details: Option<MintDetailsDto>,
}

impl From<prov_mint::StatusResponse> for TokenStatusResponse {
    fn from(r: prov_mint::StatusResponse) -> Self {
        Self {
            nonce: r.nonce,
            status: r.status.as_str(),
            is_expired: r.is_expired,
            expires_at: r.expires_at,
            created_at: r.created_at,
            remaining_seconds: r.remaining_seconds,
            mint_details: r.mint_details.map(MintDetailsDto::from),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenRequest {
    pub ip_id: String,
    pub token_id: String,
    pub tx_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenResponse {
    pub nonce: u64,
    pub status: &'static str,
    pub used_at: u64,
}

impl From<prov_mint::UpdateResponse> for UpdateTokenResponse {
    fn from(r: prov_mint::UpdateResponse) -> Self {
        Self {
            nonce: r.nonce,
            status: r.status.as_str(),
            used_at: r.used_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeTokenRequest {
    pub license_terms_id: String,
    pub license_type: LicenseType,
    pub royalty_percent: u8,
    pub allow_derivatives: bool,
    pub commercial_use: bool,
    pub license_tx_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSnapshotDto {
    pub license_terms_id: String,
    pub license_type: &'static str,
    pub royalty_percent: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeTokenResponse {
    pub nonce: u64,
    pub status: &'static str,
    pub ip_id: String,
    pub license: LicenseSnapshotDto,
}

impl From<prov_mint::FinalizeResponse> for FinalizeTokenResponse {
    fn from(r: prov_mint::FinalizeResponse) -> Self {
        Self {
            nonce: r.nonce,
            status: r.status.as_str(),
            ip_id: r.ip_id,
            license: LicenseSnapshotDto {
                license_terms_id: r.license_terms_id,
                license_type: r.license_type.as_str(),
                royalty_percent: r.royalty_percent,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenRequest {
    pub nonce: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenResponse {
    pub nonce: u64,
    pub revoked_at: u64,
    pub reason: String,
}

impl From<prov_mint::RevokeResponse> for RevokeTokenResponse {
    fn from(r: prov_mint::RevokeResponse) -> Self {
        Self {
            nonce: r.nonce,
            revoked_at: r.revoked_at,
            reason: r.reason,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FindLicenseQuery {
    #[serde(rename = "type")]
    pub license_type: LicenseType,
    pub royalty: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindLicenseResponse {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_terms_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLicenseRequestBody {
    pub license_type: LicenseType,
    pub royalty_percent: u8,
    pub license_terms_id: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheLicenseResponseBody {
    pub license_terms_id: String,
    pub created: bool,
}
