//! Raw-mode keyboard input via crossterm

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::debug;

use super::{InputSource, Key};
use crate::error::Result;

/// Reads single keys from the controlling terminal in raw mode.
///
/// Raw mode is restored when the value is released or dropped.
pub struct TerminalInput {
    raw: bool,
}

impl TerminalInput {
    /// Put the terminal into raw mode
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        debug!("Terminal raw mode enabled");
        Ok(Self { raw: true })
    }

    fn restore(&mut self) {
        if self.raw {
            let _ = terminal::disable_raw_mode();
            self.raw = false;
            debug!("Terminal raw mode disabled");
        }
    }
}

impl InputSource for TerminalInput {
    fn next_key(&mut self) -> Result<Key> {
        loop {
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };

            if kind != KeyEventKind::Press {
                continue;
            }

            let key = match code {
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Key::Interrupt,
                KeyCode::Char(c) => Key::Char(c),
                KeyCode::Enter => Key::Enter,
                KeyCode::Backspace | KeyCode::Delete => Key::Backspace,
                // Navigation and function keys carry no input
                _ => continue,
            };
            return Ok(key);
        }
    }

    fn flush(&mut self) -> Result<()> {
        while event::poll(Duration::ZERO)? {
            let _ = event::read()?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.restore();
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        self.restore();
    }
}
