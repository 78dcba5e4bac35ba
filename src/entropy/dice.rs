//! Dice roll entropy collection
//!
//! Each roll of a fair die contributes log2(6) bits. Rolls are read as the
//! digits of a base-6 number (roll `n` is digit `n - 1`) and the seed is that
//! number reduced modulo `2^target_bits`, printed as fixed-width hex.

use num_bigint::BigUint;
use zeroize::Zeroizing;

use super::types::{EntryOutcome, SeedHex};
use crate::config::EntropyBudget;
use crate::error::{Error, Result};
use crate::input::Key;

/// Derive the seed for a roll sequence.
///
/// `rolls` holds die faces 1-6. The value is rebuilt from the whole sequence
/// so the hex always carries its leading zeros.
pub fn seed_from_rolls(rolls: &[u8], budget: &EntropyBudget) -> Result<SeedHex> {
    let digits: Zeroizing<Vec<u8>> = Zeroizing::new(
        rolls
            .iter()
            .map(|&roll| match roll {
                1..=6 => Ok(b'0' + roll - 1),
                other => Err(Error::InvalidInput(format!("{} is not a die face", other))),
            })
            .collect::<Result<Vec<u8>>>()?,
    );

    let value = if digits.is_empty() {
        BigUint::default()
    } else {
        BigUint::parse_bytes(&digits, 6)
            .ok_or_else(|| Error::InvalidInput("rolls are not base-6 digits".into()))?
    };
    let modulus = BigUint::from(1u8) << budget.target_bits;
    let reduced = value % modulus;

    let hex = Zeroizing::new(format!("{:0width$x}", reduced, width = budget.hex_digits));
    SeedHex::parse(&hex, budget.hex_digits)
}

/// Collects dice rolls one key at a time
pub struct EntropyCollector {
    budget: EntropyBudget,
    rolls: Zeroizing<Vec<u8>>,
    seed: Option<SeedHex>,
}

impl EntropyCollector {
    pub fn new(budget: EntropyBudget) -> Self {
        Self {
            budget,
            rolls: Zeroizing::new(Vec::with_capacity(budget.min_rolls)),
            seed: None,
        }
    }

    /// Feed one key.
    ///
    /// Digits 1-6 are rolls. Enter before the threshold switches to mnemonic
    /// entry. Anything else is rejected and leaves the rolls untouched.
    pub fn push_key(&mut self, key: Key) -> Result<EntryOutcome> {
        match key {
            Key::Interrupt => Err(Error::Aborted("interrupted during dice entry".into())),
            Key::Enter if !self.is_complete() => Ok(EntryOutcome::SwitchToMnemonic),
            Key::Char(c @ '1'..='6') => self.push_roll(c as u8 - b'0'),
            _ => Err(Error::InvalidInput("key out-of-range".into())),
        }
    }

    /// Record one die face (1-6)
    pub fn push_roll(&mut self, roll: u8) -> Result<EntryOutcome> {
        if self.is_complete() {
            return Err(Error::InvalidInput("roll sequence already complete".into()));
        }
        if !(1..=6).contains(&roll) {
            return Err(Error::InvalidInput("key out-of-range".into()));
        }

        self.rolls.push(roll);
        let seed = seed_from_rolls(&self.rolls, &self.budget)?;
        self.seed = Some(seed.clone());

        if self.is_complete() {
            Ok(EntryOutcome::Complete(seed))
        } else {
            Ok(EntryOutcome::Continue)
        }
    }

    /// Rolls still needed before the entropy budget is met
    pub fn remaining(&self) -> usize {
        self.budget.min_rolls.saturating_sub(self.rolls.len())
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Rolls entered so far, as typed
    pub fn rolls_display(&self) -> String {
        self.rolls.iter().map(|r| char::from(b'0' + r)).collect()
    }

    /// Seed for the rolls entered so far
    pub fn current_seed(&self) -> Option<&SeedHex> {
        self.seed.as_ref()
    }

    /// Operator-facing progress line
    pub fn status(&self) -> String {
        if self.is_complete() {
            "rolls complete".to_string()
        } else {
            format!("{} remaining", self.remaining())
        }
    }
}
