//! Operator key input
//!
//! Entry stages consume one logical [`Key`] at a time from an
//! [`InputSource`]. The terminal implementation reads raw key events;
//! [`ScriptedInput`] replays a fixed sequence for tests and dry runs.

pub mod terminal;

use std::collections::VecDeque;

use crate::error::{Error, Result};

pub use terminal::TerminalInput;

/// One logical key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    /// Ctrl-C
    Interrupt,
}

/// Blocking source of key events
pub trait InputSource {
    /// Wait for the next key
    fn next_key(&mut self) -> Result<Key>;

    /// Discard keys typed ahead of the current prompt
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Give the terminal back once key entry is over
    fn release(&mut self) {}
}

/// Replays a fixed key sequence
#[derive(Debug, Default)]
pub struct ScriptedInput {
    keys: VecDeque<Key>,
}

impl ScriptedInput {
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Build from text: `\n` or `\r` is Enter, `\x7f` or `\x08` Backspace,
    /// `\x03` Interrupt, anything else a character.
    pub fn from_text(text: &str) -> Self {
        Self::new(text.chars().map(key_from_char))
    }

    /// Append more text to the script
    pub fn push_text(&mut self, text: &str) {
        self.keys.extend(text.chars().map(key_from_char));
    }

    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

impl InputSource for ScriptedInput {
    fn next_key(&mut self) -> Result<Key> {
        self.keys
            .pop_front()
            .ok_or_else(|| Error::Aborted("input exhausted".into()))
    }
}

fn key_from_char(c: char) -> Key {
    match c {
        '\n' | '\r' => Key::Enter,
        '\x7f' | '\x08' => Key::Backspace,
        '\x03' => Key::Interrupt,
        other => Key::Char(other),
    }
}
