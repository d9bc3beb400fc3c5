//! # prov-crypto
//!
//! Deterministic, pure-modulo-key signing for the mint-authorization core
//! (spec C2). This crate enforces a strict set of lints to ensure
//! panic-free, well-documented code outside tests.
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

pub mod error;
pub mod pack;

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use prov_types::{CoreError, Result};

pub use pack::{content_hash, packed_message, to_hex32};

/// Holds the backend verifier key, loaded once from configuration and held
/// immutable for the lifetime of the process (spec §5 "Shared-resource
/// policy"). Absence of the key at startup is fatal (spec §4.2).
#[derive(Clone)]
pub struct VerifierSigner {
    signer: PrivateKeySigner,
}

impl VerifierSigner {
    /// Loads the signer from a `0x`-prefixed or bare hex-encoded 32-byte
    /// private key. Returns [`CoreError::Fatal`] if the key is missing or
    /// malformed — the caller should treat this as a startup-time fatal
    /// error, not a per-request one.
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self> {
        let stripped = hex_key.trim().strip_prefix("0x").unwrap_or(hex_key.trim());
        if stripped.is_empty() {
            return Err(CoreError::Fatal(
                "BACKEND_VERIFIER_PRIVATE_KEY is not configured".to_string(),
            ));
        }
        let bytes = hex::decode(stripped)
            .map_err(|e| CoreError::Fatal(format!("invalid verifier private key hex: {e}")))?;
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| CoreError::Fatal(format!("invalid verifier private key: {e}")))?;
        Ok(Self { signer })
    }

    /// The address callers should expect recovered signatures to resolve
    /// to; useful for diagnostics and for tests asserting which key signed.
    pub fn address(&self) -> String {
        format!("{:#x}", self.signer.address())
    }

    /// Builds the packed-tuple digest and signs it with the standard
    /// Ethereum personal-message prefix applied, matching the on-chain
    /// verifier's expectations (spec §4.2, §6).
    ///
    /// Returns `(message, signature)` where `message` is the 32-byte
    /// pre-prefix digest (what gets stored and later replayed to the
    /// contract) and `signature` is the 65-byte `r||s||v` ECDSA signature
    /// over the EIP-191-prefixed digest.
    pub async fn sign(
        &self,
        creator: &str,
        content_hash: &str,
        ip_metadata_uri: &str,
        nft_metadata_uri: &str,
        nonce: u64,
        expires_at: u64,
    ) -> Result<([u8; 32], [u8; 65])> {
        let message = packed_message(
            creator,
            content_hash,
            ip_metadata_uri,
            nft_metadata_uri,
            nonce,
            expires_at,
        )?;

        let signature = self
            .signer
            .sign_message(&message)
            .await
            .map_err(|e| CoreError::Internal(format!("signing failed: {e}")))?;

        let mut sig_bytes = [0u8; 65];
        sig_bytes.copy_from_slice(&signature.as_bytes());
        Ok((message, sig_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[tokio::test]
    async fn sign_is_deterministic_for_same_inputs() {
        let signer = VerifierSigner::from_private_key_hex(TEST_KEY).unwrap();
        let a = signer
            .sign(
                "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
                "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "ipfs://ip",
                "ipfs://nft",
                1,
                900,
            )
            .await
            .unwrap();
        let b = signer
            .sign(
                "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
                "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "ipfs://ip",
                "ipfs://nft",
                1,
                900,
            )
            .await
            .unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }

    #[test]
    fn missing_key_is_fatal() {
        assert!(VerifierSigner::from_private_key_hex("").is_err());
    }
}
