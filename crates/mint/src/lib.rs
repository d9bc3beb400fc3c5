#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! The mint-authorization state machine (C7), license-terms cache (C8),
//! and background expiry worker (C9).

pub mod expiry;
pub mod license;
pub mod state_machine;

pub use expiry::ExpiryWorker;
pub use license::LicenseCache;
pub use state_machine::{
    FinalizeRequest, FinalizeResponse, IssueRequest, IssueResponse, MintService, RevokeResponse,
    StatusResponse, UpdateResponse,
};
