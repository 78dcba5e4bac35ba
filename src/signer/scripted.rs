//! Scripted stand-in for the wallet program
//!
//! Each launch pops the next [`SessionScript`] registered for its
//! sub-command (`restore`, `daemon start`, `signtransaction`, ...). Commands
//! without a script exit 0 with no output. Every launch and every line sent
//! is recorded for inspection.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use regex::Regex;

use super::session::{ProcessLauncher, ProcessSession, SessionOutput};
use crate::error::{Error, Result};

/// Behaviour of one scripted invocation
#[derive(Debug, Clone)]
pub struct SessionScript {
    /// Everything the program prints, prompts included
    pub output: String,
    pub exit_code: Option<i32>,
    /// Launch itself fails
    pub launch_error: bool,
    /// Never reaches end-of-stream
    pub hang: bool,
    /// Blocks until the session is dropped instead of timing out
    pub stall: bool,
    /// Write the `-w` wallet file when the session ends
    pub creates_wallet: bool,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            output: String::new(),
            exit_code: Some(0),
            launch_error: false,
            hang: false,
            stall: false,
            creates_wallet: false,
        }
    }
}

impl SessionScript {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: text.into(),
            ..Self::default()
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn launch_failure() -> Self {
        Self {
            launch_error: true,
            ..Self::default()
        }
    }

    pub fn creating_wallet(mut self) -> Self {
        self.creates_wallet = true;
        self
    }
}

/// What the scripted program saw
#[derive(Debug, Default, Clone)]
pub struct ScriptLog {
    pub launches: Vec<Vec<String>>,
    /// (sub-command, line) pairs in send order
    pub sent: Vec<(String, String)>,
}

/// Launcher that replays registered scripts
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<HashMap<String, VecDeque<SessionScript>>>,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next launch of `command`
    pub fn on(self, command: &str, script: SessionScript) -> Self {
        lock(&self.scripts)
            .entry(command.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn log(&self) -> ScriptLog {
        lock(&self.log).clone()
    }

    /// Sub-commands in launch order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.log)
            .launches
            .iter()
            .map(|args| command_key(args))
            .collect()
    }

    /// Lines sent to sessions of `command`
    pub fn lines_sent_to(&self, command: &str) -> Vec<String> {
        lock(&self.log)
            .sent
            .iter()
            .filter(|(c, _)| c == command)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, args: &[String]) -> Result<Box<dyn ProcessSession>> {
        let command = command_key(args);
        lock(&self.log).launches.push(args.to_vec());

        let script = lock(&self.scripts)
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();

        if script.launch_error {
            return Err(Error::ExternalProcess(format!(
                "Failed to launch {}",
                command
            )));
        }

        let wallet_path = args
            .iter()
            .find_map(|a| a.strip_prefix("-w"))
            .map(PathBuf::from);

        Ok(Box::new(ScriptedSession {
            remaining: script.output.clone(),
            script,
            command,
            wallet_path,
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedSession {
    script: SessionScript,
    remaining: String,
    command: String,
    wallet_path: Option<PathBuf>,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedSession {
    async fn stall(&self) {
        if self.script.stall {
            std::future::pending::<()>().await;
        }
    }

    fn finish(&mut self) -> Result<Option<i32>> {
        if self.script.hang {
            return Err(Error::ProcessTimeout(0));
        }
        if self.script.creates_wallet {
            if let Some(path) = &self.wallet_path {
                std::fs::write(path, "{\"wallet_type\": \"standard\", \"use_encryption\": true}")?;
            }
        }
        Ok(self.script.exit_code)
    }
}

#[async_trait]
impl ProcessSession for ScriptedSession {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        lock(&self.log)
            .sent
            .push((self.command.clone(), line.to_string()));
        Ok(())
    }

    async fn expect(&mut self, pattern: &Regex) -> Result<String> {
        match pattern.find(&self.remaining).map(|m| (m.start(), m.end())) {
            Some((start, end)) => {
                let before = self.remaining[..start].to_string();
                self.remaining.drain(..end);
                Ok(before)
            }
            None if self.script.stall => {
                self.stall().await;
                Err(Error::ProcessTimeout(0))
            }
            None if self.script.hang => Err(Error::ProcessTimeout(0)),
            None => Err(Error::ExternalProcess(format!(
                "output ended before prompt {}",
                pattern.as_str()
            ))),
        }
    }

    async fn read_to_end(&mut self) -> Result<SessionOutput> {
        self.stall().await;
        let exit_code = self.finish()?;
        Ok(SessionOutput {
            output: std::mem::take(&mut self.remaining),
            exit_code,
        })
    }

    async fn close(&mut self) -> Result<Option<i32>> {
        self.stall().await;
        self.finish()
    }
}

/// `daemon <action>` for daemon calls, otherwise the first argument
pub fn command_key(args: &[String]) -> String {
    match args {
        [first, second, ..] if first == "daemon" => format!("daemon {}", second),
        [first, ..] => first.clone(),
        [] => String::new(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
