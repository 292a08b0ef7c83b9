//! hubcheck version information.
//!
//! The value is taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time. Prefer this constant over
//! repeating `env!("CARGO_PKG_VERSION")` in the CLI and reporters.

/// The hubcheck version string (for example, `0.1.0`).
pub const HUBCHECK_VERSION: &str = env!("CARGO_PKG_VERSION");
