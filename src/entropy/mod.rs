//! Seed entry pipeline
//!
//! Dice rolls or a recorded mnemonic produce a [`SeedHex`]. A seed that came
//! from a mnemonic can be strengthened with a password before use.
//!
//! # Flow
//!
//! ```text
//! EntropyCollector ──(Enter)──► MnemonicEntryValidator ──► PasswordStrengthener
//!        │                                                        │
//!        └────────────────────────► DerivedSeed ◄─────────────────┘
//! ```

pub mod dice;
pub mod mnemonic;
pub mod password;
pub mod types;

pub use dice::{seed_from_rolls, EntropyCollector};
pub use mnemonic::{verify_round_trip, Bip39Codec, MnemonicCodec, MnemonicEntryValidator, MnemonicPhrase};
pub use password::{strengthen, PasswordStrengthener};
pub use types::{DerivedSeed, EntropySource, EntryOutcome, SeedHex};

use tracing::{debug, info};

use crate::config::EntropyBudget;
use crate::display::StatusDisplay;
use crate::error::Result;
use crate::input::InputSource;

pub const LABEL_DICE: &str = "Dice Results";
pub const LABEL_MNEMONIC: &str = "Mnemonic Seed";
pub const LABEL_PASSWORD: &str = "Seed Password";
pub const LABEL_RAW_SEED: &str = "Raw Hex Seed";

/// Runs the interactive entry stages against an input source and a display
pub struct SeedEntry<'a> {
    budget: EntropyBudget,
    codec: &'a dyn MnemonicCodec,
    input: &'a mut dyn InputSource,
    display: &'a mut dyn StatusDisplay,
}

impl<'a> SeedEntry<'a> {
    pub fn new(
        budget: EntropyBudget,
        codec: &'a dyn MnemonicCodec,
        input: &'a mut dyn InputSource,
        display: &'a mut dyn StatusDisplay,
    ) -> Self {
        Self {
            budget,
            codec,
            input,
            display,
        }
    }

    /// Dice entry, falling back to mnemonic + password when the operator
    /// presses Enter before the rolls are complete
    pub fn from_dice(&mut self) -> Result<DerivedSeed> {
        match self.read_dice()? {
            Some(seed) => {
                info!("Seed derived from {} dice rolls", self.budget.min_rolls);
                Ok(DerivedSeed {
                    seed,
                    source: EntropySource::Dice,
                })
            }
            None => {
                info!("Switching to mnemonic entry");
                self.from_mnemonic()
            }
        }
    }

    /// Mnemonic entry followed by the optional password
    pub fn from_mnemonic(&mut self) -> Result<DerivedSeed> {
        let seed = self.read_mnemonic()?;
        let seed = self.read_password(seed)?;
        info!("Seed derived from mnemonic");
        Ok(DerivedSeed {
            seed,
            source: EntropySource::Mnemonic,
        })
    }

    fn read_dice(&mut self) -> Result<Option<SeedHex>> {
        let mut collector = EntropyCollector::new(self.budget);

        self.display.clear();
        self.display.show(LABEL_DICE, "");
        self.display.show(LABEL_RAW_SEED, "");
        self.display.status("type dice roll results or RTN for mnemonics");

        loop {
            let key = self.input.next_key()?;
            match collector.push_key(key) {
                Ok(EntryOutcome::Continue) => {
                    self.display.show(LABEL_DICE, &collector.rolls_display());
                    if let Some(seed) = collector.current_seed() {
                        self.display.show(LABEL_RAW_SEED, &seed.display());
                    }
                    self.display.status(&collector.status());
                }
                Ok(EntryOutcome::SwitchToMnemonic) => {
                    self.input.flush()?;
                    return Ok(None);
                }
                Ok(EntryOutcome::Complete(seed)) => {
                    self.input.flush()?;
                    self.display.clear();
                    return Ok(Some(seed));
                }
                Err(e) if e.is_recoverable() => {
                    debug!("Rejected dice key: {}", e);
                    self.display.status(&e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn read_mnemonic(&mut self) -> Result<SeedHex> {
        let mut validator = MnemonicEntryValidator::new(self.codec, self.budget.mnemonic_words());

        self.display.clear();
        self.display.show(LABEL_MNEMONIC, "");
        self.display.show(LABEL_RAW_SEED, "");
        self.display.status("type mnemonic words");

        loop {
            let key = self.input.next_key()?;
            match validator.push_key(key) {
                Ok(EntryOutcome::Complete(seed)) => {
                    self.input.flush()?;
                    return Ok(seed);
                }
                Ok(_) => {
                    self.display.show(LABEL_MNEMONIC, validator.text());
                    let preview = validator
                        .current_seed()
                        .map(SeedHex::display)
                        .unwrap_or_default();
                    self.display.show(LABEL_RAW_SEED, &preview);
                    self.display.status(&validator.status());
                }
                Err(e) if e.is_recoverable() => {
                    debug!("Rejected mnemonic input: {}", e);
                    self.display.status(&e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn read_password(&mut self, seed: SeedHex) -> Result<SeedHex> {
        let mut strengthener = PasswordStrengthener::new(seed);

        self.display.clear();
        self.display.show(LABEL_PASSWORD, "");
        self.display
            .show(LABEL_RAW_SEED, &strengthener.protected_seed().display());
        self.display.status(strengthener.status());

        loop {
            let key = self.input.next_key()?;
            match strengthener.push_key(key) {
                Ok(EntryOutcome::Complete(protected)) => {
                    self.input.flush()?;
                    self.display.clear();
                    if strengthener.password_len() > 0 {
                        info!("Seed password applied");
                    }
                    return Ok(protected);
                }
                Ok(_) => {
                    self.display
                        .show(LABEL_PASSWORD, &"*".repeat(strengthener.password_len()));
                    self.display
                        .show(LABEL_RAW_SEED, &strengthener.protected_seed().display());
                    self.display.status(strengthener.status());
                }
                Err(e) if e.is_recoverable() => {
                    self.display.status(&e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
    }
}
