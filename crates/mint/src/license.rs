//! The license-terms cache (C8): `find`/`cache` over the
//! `(license_type, royalty_percent) -> license_terms_id` mapping (spec
//! §4.8).

use prov_storage::Storage;
use prov_types::model::{LicenseTermsCacheEntry, LicenseType};
use prov_types::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct CacheLicenseRequest {
    pub license_type: LicenseType,
    pub royalty_percent: u8,
    pub license_terms_id: String,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheLicenseResponse {
    pub license_terms_id: String,
    pub created: bool,
}

/// A thin validating wrapper over [`Storage`]'s license table. Holds no
/// state of its own; every call is independently consistent (spec §4.8,
/// §5).
pub struct LicenseCache {
    storage: Storage,
}

impl LicenseCache {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn validate(license_type: LicenseType, royalty_percent: u8) -> Result<()> {
        if royalty_percent > 100 {
            return Err(CoreError::Validation(
                "royaltyPercent must be in [0, 100]".to_string(),
            ));
        }
        if license_type == LicenseType::NonCommercial && royalty_percent != 0 {
            return Err(CoreError::Validation(
                "non_commercial licenses must have royaltyPercent = 0".to_string(),
            ));
        }
        Ok(())
    }

    /// `GET /api/license-terms/find` (spec §6.1).
    pub fn find(
        &self,
        license_type: LicenseType,
        royalty_percent: u8,
    ) -> Result<Option<LicenseTermsCacheEntry>> {
        Self::validate(license_type, royalty_percent)?;
        self.storage.find_license(license_type, royalty_percent)
    }

    /// `POST /api/license-terms/cache` (spec §6.1). Upserts the row,
    /// reporting whether it was newly created so the caller can
    /// distinguish a fresh cache entry from an idempotent re-cache of the
    /// same terms.
    pub fn cache(&self, req: CacheLicenseRequest) -> Result<CacheLicenseResponse> {
        Self::validate(req.license_type, req.royalty_percent)?;
        if req.license_terms_id.is_empty() {
            return Err(CoreError::InvalidInput(
                "licenseTermsId is required".to_string(),
            ));
        }

        let entry = LicenseTermsCacheEntry {
            license_type: req.license_type,
            royalty_percent: req.royalty_percent,
            license_terms_id: req.license_terms_id.clone(),
            transaction_hash: req.transaction_hash,
        };
        let created = self.storage.put_license(&entry)?;
        Ok(CacheLicenseResponse {
            license_terms_id: req.license_terms_id,
            created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &std::path::Path) -> LicenseCache {
        let storage = Storage::open(dir.join("core.redb")).unwrap();
        LicenseCache::new(storage)
    }

    #[test]
    fn non_commercial_requires_zero_royalty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let result = cache.cache(CacheLicenseRequest {
            license_type: LicenseType::NonCommercial,
            royalty_percent: 5,
            license_terms_id: "1".to_string(),
            transaction_hash: None,
        });
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn cache_then_find_round_trips_and_reports_creation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let first = cache
            .cache(CacheLicenseRequest {
                license_type: LicenseType::CommercialRemix,
                royalty_percent: 15,
                license_terms_id: "99".to_string(),
                transaction_hash: Some("0xtx".to_string()),
            })
            .unwrap();
        assert!(first.created);

        let second = cache
            .cache(CacheLicenseRequest {
                license_type: LicenseType::CommercialRemix,
                royalty_percent: 15,
                license_terms_id: "99".to_string(),
                transaction_hash: Some("0xtx".to_string()),
            })
            .unwrap();
        assert!(!second.created);

        let found = cache
            .find(LicenseType::CommercialRemix, 15)
            .unwrap()
            .unwrap();
        assert_eq!(found.license_terms_id, "99");
    }

    #[test]
    fn find_rejects_out_of_range_royalty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let result = cache.find(LicenseType::CommercialRemix, 101);
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
