//! Durable persistence for the content-admission and mint-authorization
//! core, backed by `redb` single-file tables with atomic
//! `find-and-modify`-style read-modify-write transactions (spec §4.1,
//! §5, §9 "Concurrency").
//!
//! Linearization for a given nonce or content hash happens entirely
//! inside a single `redb` write transaction: `redb` serializes writers,
//! so the compare-and-update helpers below are the system's only
//! linearization point, mirroring `ioi-storage`'s
//! `begin_write`/`open_table`/`commit` pattern over its own tables.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use std::path::Path;
use std::sync::Arc;

use prov_types::model::{
    Counter, EmbeddingRecord, EmbeddingStatus, LicenseTermsCacheEntry, LicenseType,
    MintAuthorization, MintStatus,
};
use prov_types::{CoreError, Result};
use redb::{Database, ReadableTable, TableDefinition};

const MINT_BY_NONCE: TableDefinition<u64, &[u8]> = TableDefinition::new("mint_by_nonce");
/// Indexes content hashes that currently have a `used`/`registered`
/// authorization, enforcing invariant I2 across racing callers.
const CONTENT_USED_INDEX: TableDefinition<&str, u64> = TableDefinition::new("content_used_index");
const COUNTER: TableDefinition<&str, u64> = TableDefinition::new("counter");
const EMBEDDING_BY_HASH: TableDefinition<&str, &[u8]> = TableDefinition::new("embedding_by_hash");
const LICENSE_CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("license_cache");

fn backend<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Internal(format!("storage backend error: {e}"))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Internal(format!("decode error: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CoreError::Internal(format!("encode error: {e}")))
}

fn license_key(license_type: LicenseType, royalty_percent: u8) -> String {
    format!("{}:{}", license_type.as_str(), royalty_percent)
}

/// The outcome of a conditional state transition (spec §4.7). `Conflict`
/// always carries the *current* record so the caller can report the
/// prior state without a second read.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    Applied(MintAuthorization),
    Conflict(MintAuthorization),
    NotFound,
}

#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Database::create(path).map_err(backend)?;
        {
            let w = db.begin_write().map_err(backend)?;
            w.open_table(MINT_BY_NONCE).map_err(backend)?;
            w.open_table(CONTENT_USED_INDEX).map_err(backend)?;
            w.open_table(COUNTER).map_err(backend)?;
            w.open_table(EMBEDDING_BY_HASH).map_err(backend)?;
            w.open_table(LICENSE_CACHE).map_err(backend)?;
            w.commit().map_err(backend)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    // ---- C1: nonce allocator ----

    /// Strictly increasing, gap-free under concurrent calls: a single
    /// `redb` write transaction performs the read-increment-write on the
    /// counter row (spec §4.1, I6).
    pub fn allocate_nonce(&self) -> Result<u64> {
        let w = self.db.begin_write().map_err(backend)?;
        let next = {
            let mut table = w.open_table(COUNTER).map_err(backend)?;
            let current = table
                .get(Counter::MINT_TOKEN_NONCE_ID)
                .map_err(backend)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = current + 1;
            table
                .insert(Counter::MINT_TOKEN_NONCE_ID, next)
                .map_err(backend)?;
            next
        };
        w.commit().map_err(backend)?;
        Ok(next)
    }

    // ---- C7: mint-authorization state machine ----

    pub fn get_mint(&self, nonce: u64) -> Result<Option<MintAuthorization>> {
        let r = self.db.begin_read().map_err(backend)?;
        let table = r.open_table(MINT_BY_NONCE).map_err(backend)?;
        match table.get(nonce).map_err(backend)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Returns the `used`/`registered` record for `content_hash`, if any
    /// (spec §4.7 `issue` precondition, `DUPLICATE_CONTENT`).
    pub fn find_used_by_content_hash(&self, content_hash: &str) -> Result<Option<MintAuthorization>> {
        let r = self.db.begin_read().map_err(backend)?;
        let idx = r.open_table(CONTENT_USED_INDEX).map_err(backend)?;
        let nonce = match idx.get(content_hash).map_err(backend)? {
            Some(v) => v.value(),
            None => return Ok(None),
        };
        let mint = r.open_table(MINT_BY_NONCE).map_err(backend)?;
        match mint.get(nonce).map_err(backend)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Inserts a brand new `pending` authorization. The caller is
    /// responsible for having verified `find_used_by_content_hash`
    /// beforehand; insertion itself does not re-check, since a pending
    /// record never blocks a future pending issuance for the same
    /// content hash — only a `used`/`registered` one does (I2).
    pub fn insert_pending(&self, auth: &MintAuthorization) -> Result<()> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut table = w.open_table(MINT_BY_NONCE).map_err(backend)?;
            let bytes = encode(auth)?;
            table.insert(auth.nonce, bytes.as_slice()).map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        Ok(())
    }

    /// Applies `f` to the record at `nonce` iff its current status is
    /// `expected`; otherwise returns the current record as a `Conflict`.
    /// This is the linearization point for `finalize` and `revoke`, which
    /// have no cross-content-hash interaction.
    pub fn compare_and_update<F>(
        &self,
        nonce: u64,
        expected: MintStatus,
        f: F,
    ) -> Result<CasOutcome>
    where
        F: FnOnce(&mut MintAuthorization),
    {
        let w = self.db.begin_write().map_err(backend)?;
        let outcome = {
            let mut table = w.open_table(MINT_BY_NONCE).map_err(backend)?;
            let existing = table
                .get(nonce)
                .map_err(backend)?
                .map(|v| v.value().to_vec());
            match existing {
                None => CasOutcome::NotFound,
                Some(bytes) => {
                    let mut record: MintAuthorization = decode(&bytes)?;
                    if record.status != expected {
                        CasOutcome::Conflict(record)
                    } else {
                        f(&mut record);
                        let encoded = encode(&record)?;
                        table.insert(nonce, encoded.as_slice()).map_err(backend)?;
                        CasOutcome::Applied(record)
                    }
                }
            }
        };
        w.commit().map_err(backend)?;
        Ok(outcome)
    }

    /// Transitions `pending -> used`, additionally enforcing I2 via the
    /// content-hash index in the same transaction: if any record (this
    /// one or a racing sibling issued for the same content hash) already
    /// holds `used`/`registered` for `content_hash`, the call loses and
    /// observes that winner (spec §4.7 `update`, scenario 5).
    pub fn transition_to_used<F>(&self, nonce: u64, content_hash: &str, f: F) -> Result<CasOutcome>
    where
        F: FnOnce(&mut MintAuthorization),
    {
        let w = self.db.begin_write().map_err(backend)?;
        let outcome = {
            let mut mint_table = w.open_table(MINT_BY_NONCE).map_err(backend)?;
            let mut idx_table = w.open_table(CONTENT_USED_INDEX).map_err(backend)?;

            if let Some(winner_nonce) = idx_table.get(content_hash).map_err(backend)?.map(|v| v.value()) {
                let winner_bytes = mint_table
                    .get(winner_nonce)
                    .map_err(backend)?
                    .map(|v| v.value().to_vec());
                match winner_bytes {
                    Some(bytes) => CasOutcome::Conflict(decode(&bytes)?),
                    None => CasOutcome::NotFound,
                }
            } else {
                let existing = mint_table
                    .get(nonce)
                    .map_err(backend)?
                    .map(|v| v.value().to_vec());
                match existing {
                    None => CasOutcome::NotFound,
                    Some(bytes) => {
                        let mut record: MintAuthorization = decode(&bytes)?;
                        if record.status != MintStatus::Pending {
                            CasOutcome::Conflict(record)
                        } else {
                            f(&mut record);
                            record.status = MintStatus::Used;
                            let encoded = encode(&record)?;
                            mint_table.insert(nonce, encoded.as_slice()).map_err(backend)?;
                            idx_table.insert(content_hash, nonce).map_err(backend)?;
                            CasOutcome::Applied(record)
                        }
                    }
                }
            }
        };
        w.commit().map_err(backend)?;
        Ok(outcome)
    }

    /// Bulk-transitions every `pending` record whose `expires_at <= now`
    /// to `expired`, in one write transaction (spec §4.9). Crash- and
    /// re-run-idempotent: already-expired records are skipped.
    pub fn sweep_expired(&self, now: u64) -> Result<u64> {
        let w = self.db.begin_write().map_err(backend)?;
        let swept = {
            let mut table = w.open_table(MINT_BY_NONCE).map_err(backend)?;
            let mut updates: Vec<(u64, Vec<u8>)> = Vec::new();
            {
                let mut iter = table.iter().map_err(backend)?;
                while let Some(entry) = iter.next() {
                    let (k, v) = entry.map_err(backend)?;
                    let mut record: MintAuthorization = decode(v.value())?;
                    if record.status == MintStatus::Pending && now >= record.expires_at {
                        record.status = MintStatus::Expired;
                        updates.push((k.value(), encode(&record)?));
                    }
                }
            }
            for (nonce, bytes) in &updates {
                table.insert(*nonce, bytes.as_slice()).map_err(backend)?;
            }
            updates.len() as u64
        };
        w.commit().map_err(backend)?;
        Ok(swept)
    }

    // ---- C6: embedding records ----

    pub fn get_embedding(&self, content_hash: &str) -> Result<Option<EmbeddingRecord>> {
        let r = self.db.begin_read().map_err(backend)?;
        let table = r.open_table(EMBEDDING_BY_HASH).map_err(backend)?;
        match table.get(content_hash).map_err(backend)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn put_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut table = w.open_table(EMBEDDING_BY_HASH).map_err(backend)?;
            let bytes = encode(record)?;
            table
                .insert(record.content_hash.as_str(), bytes.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)?;
        Ok(())
    }

    /// Counts by status plus the `limit` most recently created `blocked`
    /// records (spec §4.6 `statistics()`).
    pub fn embedding_statistics(&self, limit: usize) -> Result<prov_types::model::SimilarityStatistics> {
        let r = self.db.begin_read().map_err(backend)?;
        let table = r.open_table(EMBEDDING_BY_HASH).map_err(backend)?;
        let mut stats = prov_types::model::SimilarityStatistics::default();
        let mut blocked: Vec<EmbeddingRecord> = Vec::new();
        let mut iter = table.iter().map_err(backend)?;
        while let Some(entry) = iter.next() {
            let (_, v) = entry.map_err(backend)?;
            let record: EmbeddingRecord = decode(v.value())?;
            match record.similarity_status {
                EmbeddingStatus::Clean => stats.clean += 1,
                EmbeddingStatus::Warning => stats.warning += 1,
                EmbeddingStatus::Blocked => {
                    stats.blocked += 1;
                    blocked.push(record);
                }
                EmbeddingStatus::PendingReview => stats.pending_review += 1,
            }
        }
        blocked.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        blocked.truncate(limit);
        stats.recent_blocked = blocked;
        Ok(stats)
    }

    // ---- C8: license-terms cache ----

    pub fn find_license(
        &self,
        license_type: LicenseType,
        royalty_percent: u8,
    ) -> Result<Option<LicenseTermsCacheEntry>> {
        let r = self.db.begin_read().map_err(backend)?;
        let table = r.open_table(LICENSE_CACHE).map_err(backend)?;
        let key = license_key(license_type, royalty_percent);
        match table.get(key.as_str()).map_err(backend)? {
            Some(v) => Ok(Some(decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// Upserts the `(license_type, royalty_percent) -> license_terms_id`
    /// mapping, returning whether a new row was created (spec §4.8).
    pub fn put_license(&self, entry: &LicenseTermsCacheEntry) -> Result<bool> {
        let w = self.db.begin_write().map_err(backend)?;
        let created = {
            let mut table = w.open_table(LICENSE_CACHE).map_err(backend)?;
            let key = license_key(entry.license_type, entry.royalty_percent);
            let created = table.get(key.as_str()).map_err(backend)?.is_none();
            let bytes = encode(entry)?;
            table.insert(key.as_str(), bytes.as_slice()).map_err(backend)?;
            created
        };
        w.commit().map_err(backend)?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_types::model::{AssetType, LicenseDetails, MintDetails, RevocationDetails};

    fn temp_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("core.redb")).unwrap();
        (storage, dir)
    }

    fn sample_auth(nonce: u64, content_hash: &str) -> MintAuthorization {
        MintAuthorization {
            nonce,
            creator_address: "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            content_hash: content_hash.to_string(),
            ip_metadata_uri: "ipfs://ip".to_string(),
            nft_metadata_uri: "ipfs://nft".to_string(),
            asset_type: AssetType::Text,
            message: [0u8; 32],
            signature: [0u8; 65],
            issued_at: 0,
            expires_at: 900,
            status: MintStatus::Pending,
            session_id: String::new(),
            fingerprint_id: String::new(),
            mint: MintDetails::default(),
            license: LicenseDetails::default(),
            revocation: RevocationDetails::default(),
        }
    }

    #[test]
    fn nonce_allocation_is_strictly_increasing() {
        let (storage, _dir) = temp_storage();
        let a = storage.allocate_nonce().unwrap();
        let b = storage.allocate_nonce().unwrap();
        let c = storage.allocate_nonce().unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn transition_to_used_is_racer_safe() {
        let (storage, _dir) = temp_storage();
        let nonce = storage.allocate_nonce().unwrap();
        let auth = sample_auth(nonce, "0xaa");
        storage.insert_pending(&auth).unwrap();

        let first = storage
            .transition_to_used(nonce, "0xaa", |r| {
                r.mint.ip_id = "ip-1".into();
                r.mint.token_id = "1".into();
                r.mint.tx_hash = "tx-1".into();
            })
            .unwrap();
        assert!(matches!(first, CasOutcome::Applied(_)));

        let second = storage
            .transition_to_used(nonce, "0xaa", |r| {
                r.mint.ip_id = "ip-2".into();
            })
            .unwrap();
        match second {
            CasOutcome::Conflict(record) => assert_eq!(record.mint.ip_id, "ip-1"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn sweep_expired_is_idempotent() {
        let (storage, _dir) = temp_storage();
        let nonce = storage.allocate_nonce().unwrap();
        let mut auth = sample_auth(nonce, "0xbb");
        auth.expires_at = 100;
        storage.insert_pending(&auth).unwrap();

        let first = storage.sweep_expired(200).unwrap();
        assert_eq!(first, 1);
        let second = storage.sweep_expired(200).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn license_cache_upsert_reports_creation() {
        let (storage, _dir) = temp_storage();
        let entry = LicenseTermsCacheEntry {
            license_type: LicenseType::CommercialRemix,
            royalty_percent: 10,
            license_terms_id: "10".to_string(),
            transaction_hash: None,
        };
        assert!(storage.put_license(&entry).unwrap());
        assert!(!storage.put_license(&entry).unwrap());
        let found = storage
            .find_license(LicenseType::CommercialRemix, 10)
            .unwrap()
            .unwrap();
        assert_eq!(found.license_terms_id, "10");
    }
}
