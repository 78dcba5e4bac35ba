//! Interactive sessions with the external wallet program
//!
//! A [`ProcessSession`] is one running invocation: lines can be sent to it,
//! its output can be searched for a prompt, and it can be read to
//! end-of-stream. The real program runs on a pseudo-terminal, the way an
//! operator would run it, so password prompts written to the terminal are
//! seen as well. Every wait is bounded by the launcher's timeout and
//! a timeout is reported as [`Error::ProcessTimeout`].

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::libc;
use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, OutputFlags, SetArg};
use nix::unistd::setsid;
use regex::Regex;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Output of a session read to end-of-stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    /// Everything after the last matched prompt
    pub output: String,
    /// Exit code; None if killed by a signal
    pub exit_code: Option<i32>,
}

impl SessionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One running invocation of the wallet program
#[async_trait]
pub trait ProcessSession: Send {
    /// Write `line` plus a newline to the program's terminal
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// Wait for `pattern` in the output. Returns the text before the match
    /// and consumes through the end of it.
    async fn expect(&mut self, pattern: &Regex) -> Result<String>;

    /// Read until end-of-stream and collect the exit code
    async fn read_to_end(&mut self) -> Result<SessionOutput>;

    /// Signal end-of-input and wait for exit without reading further output
    async fn close(&mut self) -> Result<Option<i32>>;
}

/// Starts wallet program sessions
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, args: &[String]) -> Result<Box<dyn ProcessSession>>;
}

/// Case-insensitive password prompt
pub fn password_prompt() -> Regex {
    Regex::new(r"(?i)password.*:").expect("static regex")
}

/// Case-insensitive confirmation prompt
pub fn confirm_prompt() -> Regex {
    Regex::new(r"(?i)confirm.*:").expect("static regex")
}

/// Launches the real wallet program as a child process on its own pty
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    timeout: Duration,
}

impl CommandLauncher {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self, args: &[String]) -> Result<Box<dyn ProcessSession>> {
        // Arguments can carry the seed, so only the sub-command is logged
        debug!(
            "Launching {} {}",
            self.program.display(),
            args.first().map(String::as_str).unwrap_or("")
        );

        let OpenptyResult { master, slave } = open_pty()?;

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::from(slave.try_clone()?))
            .stdout(Stdio::from(slave.try_clone()?))
            .stderr(Stdio::from(slave))
            .kill_on_drop(true);
        // New session with the pty as controlling terminal, so prompts that
        // go through /dev/tty reach the master side too
        unsafe {
            command.pre_exec(|| {
                setsid()?;
                if libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| {
            Error::ExternalProcess(format!(
                "Failed to launch {}: {}",
                self.program.display(),
                e
            ))
        })?;
        // Drop the parent's slave descriptors so the master sees EOF on exit
        drop(command);

        let reader = File::from(master.try_clone()?);
        let (tx, rx) = mpsc::channel(64);
        std::thread::spawn(move || pump_output(reader, tx));

        Ok(Box::new(ChildSession {
            child,
            writer: Some(File::from(master)),
            output: rx,
            pending: Vec::new(),
            buffer: String::new(),
            eof: false,
            timeout: self.timeout,
        }))
    }
}

// Open a pty with echo off, so answers to prompts never show up in the output
fn open_pty() -> Result<OpenptyResult> {
    let pty = openpty(None, None)
        .map_err(|e| Error::ExternalProcess(format!("Failed to open pty: {}", e)))?;
    let mut termios = tcgetattr(&pty.slave)
        .map_err(|e| Error::ExternalProcess(format!("Failed to read pty settings: {}", e)))?;
    termios.local_flags.remove(LocalFlags::ECHO);
    termios.output_flags.remove(OutputFlags::ONLCR);
    tcsetattr(&pty.slave, SetArg::TCSANOW, &termios)
        .map_err(|e| Error::ExternalProcess(format!("Failed to set pty settings: {}", e)))?;
    Ok(pty)
}

// Forward pty output into the session channel until every slave end is closed
fn pump_output(mut reader: File, tx: mpsc::Sender<Vec<u8>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(chunk[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Linux reports a closed slave as EIO
            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
            Err(e) => {
                warn!("Wallet program output error: {}", e);
                break;
            }
        }
    }
}

/// Move the decodable prefix of `pending` into `out`.
///
/// An incomplete character at the end stays in `pending` for the next chunk.
/// Invalid bytes become U+FFFD.
pub fn decode_output(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(std::str::from_utf8(&pending[..valid]).unwrap_or_default());
                match e.error_len() {
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + len);
                    }
                }
            }
        }
    }
}

struct ChildSession {
    child: Child,
    writer: Option<File>,
    output: mpsc::Receiver<Vec<u8>>,
    /// Bytes of a character split across chunks
    pending: Vec<u8>,
    buffer: String,
    eof: bool,
    timeout: Duration,
}

impl ChildSession {
    // Pull one chunk of output into the buffer before the deadline
    async fn fill(&mut self, deadline: Instant) -> Result<()> {
        match timeout_at(deadline, self.output.recv()).await {
            Ok(Some(chunk)) => {
                self.pending.extend_from_slice(&chunk);
                decode_output(&mut self.pending, &mut self.buffer);
                Ok(())
            }
            Ok(None) => {
                self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
                self.pending.clear();
                self.eof = true;
                Ok(())
            }
            Err(_) => {
                let _ = self.child.start_kill();
                Err(Error::ProcessTimeout(self.timeout.as_secs()))
            }
        }
    }

    async fn wait(&mut self, deadline: Instant) -> Result<Option<i32>> {
        match timeout_at(deadline, self.child.wait()).await {
            Ok(status) => Ok(status?.code()),
            Err(_) => {
                let _ = self.child.start_kill();
                Err(Error::ProcessTimeout(self.timeout.as_secs()))
            }
        }
    }
}

#[async_trait]
impl ProcessSession for ChildSession {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::ExternalProcess("input already closed".into()))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    async fn expect(&mut self, pattern: &Regex) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some((start, end)) = pattern.find(&self.buffer).map(|m| (m.start(), m.end())) {
                let before = self.buffer[..start].to_string();
                self.buffer.drain(..end);
                return Ok(before);
            }
            if self.eof {
                return Err(Error::ExternalProcess(format!(
                    "output ended before prompt {}",
                    pattern.as_str()
                )));
            }
            self.fill(deadline).await?;
        }
    }

    async fn read_to_end(&mut self) -> Result<SessionOutput> {
        let deadline = Instant::now() + self.timeout;
        while !self.eof {
            self.fill(deadline).await?;
        }
        self.writer.take();
        let exit_code = self.wait(deadline).await?;
        Ok(SessionOutput {
            output: std::mem::take(&mut self.buffer),
            exit_code,
        })
    }

    async fn close(&mut self) -> Result<Option<i32>> {
        // End-of-file for a program still reading the terminal
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.write_all(b"\x04");
        }
        let deadline = Instant::now() + self.timeout;
        self.wait(deadline).await
    }
}
