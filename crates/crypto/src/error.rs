//! Local error alias for the `prov-crypto` crate.
// Re-export the canonical error type from the core types crate, matching
// how `ioi-crypto::error` re-exports `CryptoError` from `ioi-types`.
pub use prov_types::CoreError;
