//! Bit-exact packed-keccak message construction (spec §4.2, §6
//! "Signed message layout").
//!
//! The packed tuple is
//! `(address creator, bytes32 contentHash, bytes32 keccak(ipURI),
//!   bytes32 keccak(nftURI), uint256 nonce, uint256 expiresAt)`,
//! concatenated with no padding between fields (Solidity's
//! `abi.encodePacked`), then hashed once with keccak-256.

use alloy_primitives::{keccak256, Address};
use prov_types::{CoreError, Result};

fn parse_hex_32(s: &str) -> Result<[u8; 32]> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|e| CoreError::InvalidInput(format!("invalid hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidInput("expected 32-byte hex value".to_string()))
}

fn parse_address(s: &str) -> Result<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|e| CoreError::InvalidInput(format!("invalid address hex: {e}")))?;
    let arr: [u8; 20] = bytes
        .try_into()
        .map_err(|_| CoreError::InvalidInput("expected 20-byte address".to_string()))?;
    Ok(Address::from(arr))
}

fn u256_be(value: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[24..32].copy_from_slice(&value.to_be_bytes());
    buf
}

/// Builds the 32-byte digest that the on-chain verifier recomputes before
/// accepting a mint. Callers must pass *unhashed* URIs; this function
/// hashes them internally exactly once each, per spec §4.2.
pub fn packed_message(
    creator: &str,
    content_hash: &str,
    ip_metadata_uri: &str,
    nft_metadata_uri: &str,
    nonce: u64,
    expires_at: u64,
) -> Result<[u8; 32]> {
    let creator = parse_address(creator)?;
    let content_hash = parse_hex_32(content_hash)?;
    let ip_hash = keccak256(ip_metadata_uri.as_bytes());
    let nft_hash = keccak256(nft_metadata_uri.as_bytes());

    let mut buf = Vec::with_capacity(20 + 32 + 32 + 32 + 32 + 32);
    buf.extend_from_slice(creator.as_slice());
    buf.extend_from_slice(&content_hash);
    buf.extend_from_slice(ip_hash.as_slice());
    buf.extend_from_slice(nft_hash.as_slice());
    buf.extend_from_slice(&u256_be(nonce));
    buf.extend_from_slice(&u256_be(expires_at));

    Ok(*keccak256(&buf))
}

/// Computes the content-addressing hash used throughout the core to
/// deduplicate and look up assets: `keccak(ipMetadataURI || nftMetadataURI)`,
/// with the two URIs concatenated as raw UTF-8 bytes (spec §4.6 step 1).
pub fn content_hash(ip_metadata_uri: &str, nft_metadata_uri: &str) -> [u8; 32] {
    let mut buf = Vec::with_capacity(ip_metadata_uri.len() + nft_metadata_uri.len());
    buf.extend_from_slice(ip_metadata_uri.as_bytes());
    buf.extend_from_slice(nft_metadata_uri.as_bytes());
    *keccak256(&buf)
}

/// Renders a 32-byte digest as a `0x`-prefixed lowercase hex string, the
/// wire format used for `contentHash` everywhere in the core.
pub fn to_hex32(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic_and_order_sensitive() {
        let a = content_hash("ipfs://ip", "ipfs://nft");
        let b = content_hash("ipfs://ip", "ipfs://nft");
        assert_eq!(a, b);
        let c = content_hash("ipfs://nft", "ipfs://ip");
        assert_ne!(a, c);
    }

    #[test]
    fn packed_message_is_deterministic() {
        let a = packed_message(
            "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "ipfs://ip",
            "ipfs://nft",
            1,
            900,
        )
        .unwrap();
        let b = packed_message(
            "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "ipfs://ip",
            "ipfs://nft",
            1,
            900,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn packed_message_changes_with_nonce() {
        let base = (
            "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "ipfs://ip",
            "ipfs://nft",
        );
        let a = packed_message(base.0, base.1, base.2, base.3, 1, 900).unwrap();
        let b = packed_message(base.0, base.1, base.2, base.3, 2, 900).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_address() {
        assert!(packed_message(
            "not-an-address",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "ipfs://ip",
            "ipfs://nft",
            1,
            900,
        )
        .is_err());
    }
}
