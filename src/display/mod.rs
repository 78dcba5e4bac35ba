//! Operator-facing status display
//!
//! The screen is a list of labelled fields plus one status line. Seeds and
//! mnemonic words are shown here so the operator can copy them down; nothing
//! written through this trait reaches the log.

use std::io::{stderr, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};

/// Sink for what the operator sees while entering keys
pub trait StatusDisplay {
    /// Remove every field and the status line
    fn clear(&mut self);

    /// Set the value shown under `label`, adding the field if new
    fn show(&mut self, label: &str, value: &str);

    /// Replace the status line
    fn status(&mut self, message: &str);
}

/// Redraws the whole screen on stderr after every change
#[derive(Debug, Default)]
pub struct TerminalDisplay {
    fields: Vec<(String, String)>,
    status: String,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn redraw(&self) {
        let mut out = stderr();
        // Raw mode needs explicit carriage returns
        let _ = queue!(out, Clear(ClearType::All), MoveTo(0, 0));
        for (label, value) in &self.fields {
            let _ = queue!(out, Print(format!("{}\r\n  {}\r\n\r\n", label, value)));
        }
        let _ = queue!(out, Print(format!("> {}\r\n", self.status)));
        let _ = out.flush();
    }
}

impl StatusDisplay for TerminalDisplay {
    fn clear(&mut self) {
        self.fields.clear();
        self.status.clear();
        let _ = execute!(stderr(), Clear(ClearType::All), MoveTo(0, 0));
    }

    fn show(&mut self, label: &str, value: &str) {
        match self.fields.iter_mut().find(|(l, _)| l == label) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((label.to_string(), value.to_string())),
        }
        self.redraw();
    }

    fn status(&mut self, message: &str) {
        self.status = message.to_string();
        self.redraw();
    }
}

/// Keeps every update in memory
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub fields: Vec<(String, String)>,
    pub statuses: Vec<String>,
    pub clears: usize,
    /// Status line as it would currently appear on screen
    pub visible_status: String,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value shown under `label`
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn last_status(&self) -> Option<&str> {
        self.statuses.last().map(String::as_str)
    }
}

impl StatusDisplay for RecordingDisplay {
    fn clear(&mut self) {
        self.clears += 1;
        self.visible_status.clear();
    }

    fn show(&mut self, label: &str, value: &str) {
        self.fields.push((label.to_string(), value.to_string()));
    }

    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_string());
        self.visible_status = message.to_string();
    }
}
