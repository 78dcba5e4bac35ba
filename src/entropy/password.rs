//! Password strengthening of a mnemonic-derived seed
//!
//! The protected seed is a SHA-256 chain over the password characters,
//! starting from the lower-case seed:
//!
//! ```text
//! running = lower(seed)
//! for c in password: running = hex(sha256(running + ":" + c))
//! protected = upper(running[..hex_digits])
//! ```
//!
//! The chain is always rebuilt from the full password. Editing an earlier
//! character changes every later link, so a chain extended key by key would
//! disagree with the chain of the final password.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::types::{EntryOutcome, SeedHex};
use crate::error::{Error, Result};
use crate::input::Key;

/// Derive the protected seed for `password`. An empty password returns `seed`.
pub fn strengthen(seed: &SeedHex, password: &str) -> Result<SeedHex> {
    if password.is_empty() {
        return Ok(seed.clone());
    }

    let mut running = Zeroizing::new(seed.as_lower().to_string());
    for c in password.chars() {
        let link = Zeroizing::new(format!("{}:{}", running.as_str(), c));
        running = Zeroizing::new(hex::encode(Sha256::digest(link.as_bytes())));
    }

    let width = seed.hex_digits();
    if width > running.len() {
        return Err(Error::Config(format!(
            "seeds wider than {} hex digits cannot be strengthened",
            running.len()
        )));
    }
    SeedHex::parse(&running[..width], width)
}

/// Characters allowed in a seed password
pub fn is_password_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == ' '
}

/// Collects a password one key at a time, keeping the protected seed current
pub struct PasswordStrengthener {
    seed: SeedHex,
    password: Zeroizing<String>,
    protected: SeedHex,
}

impl PasswordStrengthener {
    pub fn new(seed: SeedHex) -> Self {
        Self {
            protected: seed.clone(),
            seed,
            password: Zeroizing::new(String::new()),
        }
    }

    /// Feed one key. Enter finalizes the protected seed.
    pub fn push_key(&mut self, key: Key) -> Result<EntryOutcome> {
        match key {
            Key::Interrupt => {
                return Err(Error::Aborted("interrupted during password entry".into()))
            }
            Key::Enter => return Ok(EntryOutcome::Complete(self.protected.clone())),
            Key::Char(c) if is_password_char(c) => self.password.push(c),
            Key::Backspace => {
                self.password.pop();
            }
            Key::Char(_) => return Err(Error::InvalidInput("key out-of-range".into())),
        }

        self.protected = strengthen(&self.seed, &self.password)?;
        Ok(EntryOutcome::Continue)
    }

    /// Protected seed for the password typed so far
    pub fn protected_seed(&self) -> &SeedHex {
        &self.protected
    }

    /// Length of the password so far
    pub fn password_len(&self) -> usize {
        self.password.chars().count()
    }

    pub fn status(&self) -> &'static str {
        if self.password.is_empty() {
            "enter seed password or RTN to continue"
        } else {
            "continue entering or RTN to complete"
        }
    }
}
