//! signbox HTTP layer.
//!
//! Three pieces, leaf-first:
//!   - `filename`: final/partial name derivation and sanitization
//!   - `resolve`: redirect chasing with a bounded hop count
//!   - `transfer`: resumable, retrying single-file downloads
//!   - `client`: the catalog REST surface (manifest, flags, telemetry)

pub mod client;
pub mod filename;
pub mod resolve;
pub mod transfer;

pub use client::CatalogClient;
pub use transfer::Transfer;

/// User-Agent sent on every request.
pub const USER_AGENT: &str = concat!("signbox/", env!("CARGO_PKG_VERSION"));
