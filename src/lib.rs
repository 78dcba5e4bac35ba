//! Air-gapped seed creation and offline transaction signing
//!
//! Seeds come from dice rolls or a recorded mnemonic, optionally
//! strengthened with a password. Signing drives an external wallet program
//! against a temporary wallet protected by a per-run random credential.

pub mod cli;
pub mod config;
pub mod display;
pub mod entropy;
pub mod error;
pub mod input;
pub mod keys;
pub mod public_log;
pub mod signer;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
