use serde::{Deserialize, Serialize};

/// The media modality of a registered asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Video,
    Image,
    Audio,
    Text,
}

impl AssetType {
    pub const ALL: [AssetType; 4] = [
        AssetType::Video,
        AssetType::Image,
        AssetType::Audio,
        AssetType::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Video => "video",
            AssetType::Image => "image",
            AssetType::Audio => "audio",
            AssetType::Text => "text",
        }
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(AssetType::Video),
            "image" => Ok(AssetType::Image),
            "audio" => Ok(AssetType::Audio),
            "text" => Ok(AssetType::Text),
            other => Err(format!("unknown asset type: {other}")),
        }
    }
}

/// The state-machine state of a [`MintAuthorization`] (spec §4.7).
///
/// The only forward edges are `pending -> used|expired|revoked` and
/// `used -> registered`. No other transition exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MintStatus {
    Pending,
    Used,
    Registered,
    Expired,
    Revoked,
}

impl MintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MintStatus::Pending => "pending",
            MintStatus::Used => "used",
            MintStatus::Registered => "registered",
            MintStatus::Expired => "expired",
            MintStatus::Revoked => "revoked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MintStatus::Registered | MintStatus::Expired | MintStatus::Revoked
        )
    }
}

/// License type attached at finalize-time (spec §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    CommercialRemix,
    NonCommercial,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::CommercialRemix => "commercial_remix",
            LicenseType::NonCommercial => "non_commercial",
        }
    }
}

impl std::str::FromStr for LicenseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commercial_remix" => Ok(LicenseType::CommercialRemix),
            "non_commercial" => Ok(LicenseType::NonCommercial),
            other => Err(format!("unknown license type: {other}")),
        }
    }
}

/// Fields recorded when a pending authorization transitions to `used`
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MintDetails {
    pub ip_id: String,
    pub token_id: String,
    pub tx_hash: String,
    pub used_at: Option<u64>,
}

/// Fields recorded when a `used` authorization transitions to
/// `registered` via [`finalize`](crate) (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LicenseDetails {
    pub license_terms_id: String,
    pub license_type: Option<LicenseType>,
    pub royalty_percent: u8,
    pub allow_derivatives: bool,
    pub commercial_use: bool,
    pub license_tx_hash: String,
    pub license_attached_at: Option<u64>,
}

/// Revocation metadata, set only when state is `revoked`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RevocationDetails {
    pub revoked_at: Option<u64>,
    pub revoked_reason: Option<String>,
}

/// The central record of the mint-authorization state machine (spec §3).
///
/// Invariants (spec I1-I3):
/// - `nonce` is globally unique and monotonically allocated.
/// - at most one `used`/`registered` record exists per `content_hash`
///   (enforced by the caller via the storage layer's unique index, not by
///   this type itself).
/// - `expires_at - issued_at == 900`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintAuthorization {
    pub nonce: u64,
    pub creator_address: String,
    pub content_hash: String,
    pub ip_metadata_uri: String,
    pub nft_metadata_uri: String,
    pub asset_type: AssetType,

    pub message: [u8; 32],
    pub signature: [u8; 65],

    pub issued_at: u64,
    pub expires_at: u64,

    pub status: MintStatus,

    pub session_id: String,
    pub fingerprint_id: String,

    pub mint: MintDetails,
    pub license: LicenseDetails,
    pub revocation: RevocationDetails,
}

impl MintAuthorization {
    pub fn is_expired(&self, now: u64) -> bool {
        self.status == MintStatus::Pending && now >= self.expires_at
    }
}

/// The single keyed nonce counter (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub id: String,
    pub seq: u64,
}

impl Counter {
    pub const MINT_TOKEN_NONCE_ID: &'static str = "mint_token_nonce";
}

/// Composite-unique `(license_type, royalty_percent) -> license_terms_id`
/// row (spec §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseTermsCacheEntry {
    pub license_type: LicenseType,
    pub royalty_percent: u8,
    pub license_terms_id: String,
    pub transaction_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn asset_type_round_trips() {
        for a in AssetType::ALL {
            assert_eq!(AssetType::from_str(a.as_str()).unwrap(), a);
        }
    }

    #[test]
    fn mint_status_terminal_set() {
        assert!(MintStatus::Registered.is_terminal());
        assert!(MintStatus::Expired.is_terminal());
        assert!(MintStatus::Revoked.is_terminal());
        assert!(!MintStatus::Pending.is_terminal());
        assert!(!MintStatus::Used.is_terminal());
    }

    #[test]
    fn license_type_round_trips() {
        assert_eq!(
            LicenseType::from_str("commercial_remix").unwrap(),
            LicenseType::CommercialRemix
        );
        assert!(LicenseType::from_str("bogus").is_err());
    }
}
