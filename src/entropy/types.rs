//! Seed value types shared by the entry stages

use std::fmt;

use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Fixed-width hex seed.
///
/// Stored lower-case, which is the form that gets hashed and handed to the
/// wallet program. [`SeedHex::display`] gives the upper-case form shown to
/// the operator.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedHex(Zeroizing<String>);

impl SeedHex {
    /// Parse a hex string of exactly `hex_digits` characters (any case)
    pub fn parse(value: &str, hex_digits: usize) -> Result<Self> {
        if value.len() != hex_digits {
            return Err(Error::InvalidInput(format!(
                "seed must be {} hex digits, got {}",
                hex_digits,
                value.len()
            )));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput("seed contains non-hex characters".into()));
        }
        Ok(Self(Zeroizing::new(value.to_ascii_lowercase())))
    }

    /// Lower-case form
    pub fn as_lower(&self) -> &str {
        &self.0
    }

    /// Upper-case form for the screen
    pub fn display(&self) -> String {
        self.0.to_ascii_uppercase()
    }

    pub fn hex_digits(&self) -> usize {
        self.0.len()
    }

    /// Raw seed bytes
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        hex::decode(self.0.as_str())
            .map(Zeroizing::new)
            .map_err(|e| Error::InvalidInput(format!("seed is not valid hex: {}", e)))
    }
}

impl fmt::Debug for SeedHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeedHex([REDACTED; {} digits])", self.0.len())
    }
}

/// Where a seed came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropySource {
    Dice,
    Mnemonic,
}

impl fmt::Display for EntropySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropySource::Dice => write!(f, "dice"),
            EntropySource::Mnemonic => write!(f, "mnemonic"),
        }
    }
}

/// Final seed of the entry stages, after any password strengthening
#[derive(Debug, Clone)]
pub struct DerivedSeed {
    pub seed: SeedHex,
    pub source: EntropySource,
}

/// Result of feeding one key to an entry stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Key accepted, stage wants more input
    Continue,
    /// Operator asked to enter a mnemonic instead of dice rolls
    SwitchToMnemonic,
    /// Stage finished with this seed
    Complete(SeedHex),
}
