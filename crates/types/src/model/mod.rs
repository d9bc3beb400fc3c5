//! The persistent data model: [`MintAuthorization`], [`Counter`],
//! [`EmbeddingRecord`], [`VectorEntry`], and [`LicenseTermsCacheEntry`],
//! as specified in spec §3.

mod mint;
mod similarity;

pub use mint::*;
pub use similarity::*;
