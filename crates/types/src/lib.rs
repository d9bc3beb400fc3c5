//! Core data structures and error types for the content-admission and
//! mint-authorization core.

pub mod error;
pub mod model;

pub use error::{CoreError, ErrorCode};

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Number of seconds a pending mint authorization remains valid.
pub const MINT_AUTHORIZATION_TTL_SECS: u64 = 900;

/// Interval on which the expiry worker sweeps pending authorizations.
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 300;
