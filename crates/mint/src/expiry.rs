//! The background expiry worker (C9): periodically sweeps `pending`
//! authorizations whose TTL has lapsed to `expired` (spec §4.9).

use std::time::Duration;

use prov_storage::Storage;
use prov_types::EXPIRY_SWEEP_INTERVAL_SECS;
use tokio::task::JoinHandle;

fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Drives a single periodic sweep task. Crash- and restart-safe: each
/// tick performs one bulk, idempotent write (spec §4.9, "crash-idempotent").
pub struct ExpiryWorker {
    storage: Storage,
    interval: Duration,
}

impl ExpiryWorker {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            interval: Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS),
        }
    }

    #[cfg(test)]
    fn with_interval(storage: Storage, interval: Duration) -> Self {
        Self { storage, interval }
    }

    /// Runs one sweep pass immediately, returning the number of records
    /// transitioned. Exposed so callers (and tests) can drive a sweep
    /// without waiting on the ticker.
    pub fn sweep_once(&self) -> prov_types::Result<u64> {
        self.storage.sweep_expired(now_secs())
    }

    /// Spawns the worker loop on the current Tokio runtime. The returned
    /// handle is never awaited in production; it exists so callers can
    /// abort the worker during shutdown.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.sweep_once() {
                    Ok(count) if count > 0 => {
                        prov_telemetry::mint_metrics().inc_expired(count);
                        tracing::info!(count, "expiry worker swept pending authorizations");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "expiry sweep failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_types::model::{AssetType, LicenseDetails, MintAuthorization, MintDetails, MintStatus, RevocationDetails};

    fn pending_auth(nonce: u64, expires_at: u64) -> MintAuthorization {
        MintAuthorization {
            nonce,
            creator_address: "0xcreator".to_string(),
            content_hash: format!("0x{nonce}"),
            ip_metadata_uri: "ipfs://ip".to_string(),
            nft_metadata_uri: "ipfs://nft".to_string(),
            asset_type: AssetType::Text,
            message: [0u8; 32],
            signature: [0u8; 65],
            issued_at: 0,
            expires_at,
            status: MintStatus::Pending,
            session_id: String::new(),
            fingerprint_id: String::new(),
            mint: MintDetails::default(),
            license: LicenseDetails::default(),
            revocation: RevocationDetails::default(),
        }
    }

    #[test]
    fn sweep_once_expires_only_lapsed_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("core.redb")).unwrap();
        storage.insert_pending(&pending_auth(1, 0)).unwrap();
        storage.insert_pending(&pending_auth(2, u64::MAX)).unwrap();

        let worker = ExpiryWorker::with_interval(storage.clone(), Duration::from_secs(1));
        let swept = worker.sweep_once().unwrap();
        assert_eq!(swept, 1);

        assert_eq!(storage.get_mint(1).unwrap().unwrap().status, MintStatus::Expired);
        assert_eq!(storage.get_mint(2).unwrap().unwrap().status, MintStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_worker_sweeps_on_tick() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("core.redb")).unwrap();
        storage.insert_pending(&pending_auth(1, 0)).unwrap();

        let worker = ExpiryWorker::with_interval(storage.clone(), Duration::from_millis(10));
        let handle = worker.spawn();
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;

        assert_eq!(storage.get_mint(1).unwrap().unwrap().status, MintStatus::Expired);
        handle.abort();
    }
}
