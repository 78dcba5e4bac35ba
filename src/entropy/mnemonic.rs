//! Mnemonic phrase entry and the seed <-> phrase codec
//!
//! The wordlist and checksum live in the codec; [`Bip39Codec`] uses the
//! English BIP-39 list, where a 128-bit seed is a 12-word phrase.

use std::fmt;

use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

use super::types::{EntryOutcome, SeedHex};
use crate::error::{Error, Result};
use crate::input::Key;

/// Space-separated mnemonic words
#[derive(Clone, PartialEq, Eq)]
pub struct MnemonicPhrase(Zeroizing<String>);

impl MnemonicPhrase {
    pub fn new(words: &[&str]) -> Self {
        Self(Zeroizing::new(words.join(" ")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn words(&self) -> Vec<&str> {
        self.0.split_whitespace().collect()
    }
}

impl fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MnemonicPhrase([REDACTED; {} words])", self.words().len())
    }
}

/// Converts between seeds and word phrases
pub trait MnemonicCodec: Send + Sync {
    /// Whether `word` is in the wordlist
    fn is_word(&self, word: &str) -> bool;

    /// Encode a seed as a phrase
    fn encode(&self, seed: &SeedHex) -> Result<MnemonicPhrase>;

    /// Decode a phrase to a seed; fails on unknown words or a bad checksum
    fn decode(&self, words: &[&str]) -> Result<SeedHex>;
}

/// BIP-39 English codec
#[derive(Debug, Clone, Copy)]
pub struct Bip39Codec {
    hex_digits: usize,
}

impl Bip39Codec {
    pub fn new(hex_digits: usize) -> Self {
        Self { hex_digits }
    }
}

impl MnemonicCodec for Bip39Codec {
    fn is_word(&self, word: &str) -> bool {
        Language::English.find_word(word).is_some()
    }

    fn encode(&self, seed: &SeedHex) -> Result<MnemonicPhrase> {
        let bytes = seed.to_bytes()?;
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &bytes)
            .map_err(|e| Error::Integrity(format!("seed has no mnemonic encoding: {}", e)))?;
        Ok(MnemonicPhrase(Zeroizing::new(mnemonic.to_string())))
    }

    fn decode(&self, words: &[&str]) -> Result<SeedHex> {
        let phrase = Zeroizing::new(words.join(" "));
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &phrase)
            .map_err(|e| Error::InvalidInput(format!("invalid mnemonic: {}", e)))?;
        let entropy = Zeroizing::new(mnemonic.to_entropy());
        let hex = Zeroizing::new(hex::encode(entropy.as_slice()));
        SeedHex::parse(&hex, self.hex_digits)
    }
}

/// Encode `seed` and confirm the phrase decodes back to the same seed
pub fn verify_round_trip(codec: &dyn MnemonicCodec, seed: &SeedHex) -> Result<MnemonicPhrase> {
    let phrase = codec.encode(seed)?;
    let decoded = codec
        .decode(&phrase.words())
        .map_err(|e| Error::Integrity(format!("encoded phrase does not decode: {}", e)))?;
    if &decoded != seed {
        return Err(Error::Integrity(
            "Validation failed decode equivalence test".into(),
        ));
    }
    Ok(phrase)
}

/// Validates a phrase typed one key at a time
pub struct MnemonicEntryValidator<'a> {
    codec: &'a dyn MnemonicCodec,
    word_count: usize,
    buffer: Zeroizing<String>,
    seed: Option<SeedHex>,
}

impl<'a> MnemonicEntryValidator<'a> {
    pub fn new(codec: &'a dyn MnemonicCodec, word_count: usize) -> Self {
        Self {
            codec,
            word_count,
            buffer: Zeroizing::new(String::new()),
            seed: None,
        }
    }

    /// Feed one key.
    ///
    /// Letters extend the current word (upper case is folded). Space and
    /// Enter end a word; with a full valid phrase they end entry. Backspace
    /// edits. Rejections keep the buffer as it was.
    pub fn push_key(&mut self, key: Key) -> Result<EntryOutcome> {
        match key {
            Key::Interrupt => Err(Error::Aborted("interrupted during mnemonic entry".into())),
            Key::Char(c) if c.is_ascii_alphabetic() => {
                self.buffer.push(c.to_ascii_lowercase());
                self.seed = None;
                Ok(EntryOutcome::Continue)
            }
            Key::Char(' ') | Key::Enter => self.end_word(),
            Key::Backspace => {
                self.buffer.pop();
                self.refresh_preview();
                Ok(EntryOutcome::Continue)
            }
            Key::Char(_) => Err(Error::InvalidInput("key out-of-range".into())),
        }
    }

    fn words(&self) -> Zeroizing<Vec<String>> {
        Zeroizing::new(self.buffer.split_whitespace().map(str::to_string).collect())
    }

    fn end_word(&mut self) -> Result<EntryOutcome> {
        self.seed = None;
        let words = self.words();

        if let Some(position) = words.iter().position(|w| !self.codec.is_word(w)) {
            return Err(Error::InvalidInput(format!("word {} not valid", position + 1)));
        }

        if words.len() > self.word_count {
            return Err(Error::InvalidInput(format!(
                "too many words, expected {}",
                self.word_count
            )));
        }

        if words.len() == self.word_count {
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            let seed = self.codec.decode(&refs)?;
            self.seed = Some(seed.clone());
            return Ok(EntryOutcome::Complete(seed));
        }

        if !self.buffer.is_empty() && !self.buffer.ends_with(' ') {
            self.buffer.push(' ');
        }
        Ok(EntryOutcome::Continue)
    }

    // Decoded seed shown while the phrase is complete but not yet confirmed
    fn refresh_preview(&mut self) {
        let words = self.words();
        self.seed = None;
        if words.len() == self.word_count && words.iter().all(|w| self.codec.is_word(w)) {
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            self.seed = self.codec.decode(&refs).ok();
        }
    }

    /// Words typed so far
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Seed decoded from a full phrase, if one is present
    pub fn current_seed(&self) -> Option<&SeedHex> {
        self.seed.as_ref()
    }

    /// Words still needed
    pub fn remaining(&self) -> usize {
        self.word_count
            .saturating_sub(self.buffer.split_whitespace().count())
    }

    pub fn status(&self) -> String {
        format!("{} remaining", self.remaining())
    }
}
