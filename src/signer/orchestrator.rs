//! Signing session state machine
//!
//! ```text
//! Idle → Restoring → Started → Signing(0) … Signing(n-1) → Stopped → Done
//! ```
//!
//! No step aborts the run. A failed restore or start is logged and the
//! remaining steps still run, so every input gets a result file and the
//! daemon is always asked to stop. Each transaction is signed in its own
//! session; a fault there only fails that transaction.

use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::session::{confirm_prompt, password_prompt, ProcessLauncher};
use super::transactions::{
    display_name, persist_result, SignedTransactionResult, UnsignedTransaction,
};
use crate::config::{SignerConfig, TransferConfig};
use crate::entropy::SeedHex;
use crate::error::{Error, Result};
use crate::keys::{EphemeralCredential, WalletArtifactGuard};

/// Where the orchestrator is in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    Idle,
    Restoring,
    Started,
    Signing(usize),
    Stopped,
    Done,
}

/// A step that failed without ending the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub state: SigningState,
    pub reason: String,
}

/// Result for one input
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    pub input: String,
    pub complete: bool,
    /// Result file, if it could be written
    pub output: Option<PathBuf>,
}

/// Everything the run produced
#[derive(Debug, Clone, Default)]
pub struct SigningReport {
    pub restored: bool,
    pub outcomes: Vec<TransactionOutcome>,
    pub failures: Vec<StepFailure>,
}

impl SigningReport {
    pub fn signed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.complete).count()
    }

    /// Result file names in input order
    pub fn result_files(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.output.as_deref().map(display_name))
            .collect()
    }
}

/// Drives the wallet program through restore, start, sign and stop
pub struct SigningOrchestrator<'a> {
    signer: &'a SignerConfig,
    transfer: &'a TransferConfig,
    launcher: &'a dyn ProcessLauncher,
    credential: Option<&'a EphemeralCredential>,
    state: SigningState,
}

impl<'a> SigningOrchestrator<'a> {
    /// `credential` encrypts the restored wallet; None restores it unencrypted
    pub fn new(
        signer: &'a SignerConfig,
        transfer: &'a TransferConfig,
        launcher: &'a dyn ProcessLauncher,
        credential: Option<&'a EphemeralCredential>,
    ) -> Self {
        Self {
            signer,
            transfer,
            launcher,
            credential,
            state: SigningState::Idle,
        }
    }

    pub fn state(&self) -> SigningState {
        self.state
    }

    /// Run the full session for `transactions`, in order
    pub async fn run(
        &mut self,
        seed: &SeedHex,
        artifact: &WalletArtifactGuard,
        transactions: &[UnsignedTransaction],
    ) -> SigningReport {
        let mut report = SigningReport::default();
        let wallet_flag = format!("-w{}", artifact.path().display());

        self.transition(SigningState::Restoring);
        info!("Restoring wallet");
        match self.restore(seed, &wallet_flag).await {
            Ok(()) => {
                report.restored = true;
                info!("Restore complete");
                if let Some(warning) = artifact.validate_permissions() {
                    warn!("{}", warning);
                }
            }
            Err(e) => {
                warn!("Restore failed: {}", e);
                self.record(&mut report, e);
            }
        }

        self.transition(SigningState::Started);
        info!("Loading wallet");
        if let Err(e) = self.start(&wallet_flag).await {
            warn!("Wallet load failed: {}", e);
            self.record(&mut report, e);
        }

        for (index, transaction) in transactions.iter().enumerate() {
            self.transition(SigningState::Signing(index));
            info!("Signing {}", transaction.file_name);

            let result = match self.sign(transaction, &wallet_flag).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Signing {} failed: {}", transaction.file_name, e);
                    let reason = e.to_string();
                    self.record(&mut report, e);
                    SignedTransactionResult::failure(reason)
                }
            };

            if result.complete {
                info!("Signing complete for {}", transaction.file_name);
            } else {
                warn!("Signing incomplete for {}", transaction.file_name);
            }

            let secrets: Vec<&str> = self.credential.map(|c| c.expose()).into_iter().collect();
            let output = match persist_result(self.transfer, transaction, &result, &secrets) {
                Ok(path) => Some(path),
                Err(e) => {
                    error!("Could not write result for {}: {}", transaction.file_name, e);
                    self.record(&mut report, e);
                    None
                }
            };

            report.outcomes.push(TransactionOutcome {
                input: transaction.file_name.clone(),
                complete: result.complete,
                output,
            });
        }

        self.transition(SigningState::Stopped);
        info!("Closing wallet");
        if let Err(e) = self.stop(&wallet_flag).await {
            warn!("Wallet shutdown failed: {}", e);
            self.record(&mut report, e);
        }

        self.transition(SigningState::Done);
        info!(
            "Signing session done: {}/{} complete",
            report.signed(),
            report.outcomes.len()
        );
        report
    }

    fn transition(&mut self, next: SigningState) {
        debug!("Signing state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn record(&self, report: &mut SigningReport, error: Error) {
        report.failures.push(StepFailure {
            state: self.state,
            reason: error.to_string(),
        });
    }

    async fn restore(&self, seed: &SeedHex, wallet_flag: &str) -> Result<()> {
        let args = vec![
            "restore".to_string(),
            "-o".to_string(),
            "-P".to_string(),
            wallet_flag.to_string(),
            seed.as_lower().to_string(),
        ];
        let mut session = self.launcher.launch(&args).await?;

        session.expect(&password_prompt()).await?;
        match self.credential {
            Some(credential) => {
                session.send_line(credential.expose()).await?;
                session.expect(&confirm_prompt()).await?;
                session.send_line(credential.expose()).await?;
            }
            None => session.send_line("").await?,
        }

        let finished = session.read_to_end().await?;
        if !finished.success() {
            return Err(Error::ExternalProcess(format!(
                "restore exited with {:?}",
                finished.exit_code
            )));
        }
        Ok(())
    }

    async fn start(&self, wallet_flag: &str) -> Result<()> {
        let args = vec!["daemon".to_string(), "start".to_string(), "-P".to_string()];
        let code = self.launch_and_close(&args).await?;
        if code != Some(0) {
            warn!("Daemon start exited with {:?}", code);
        }

        let args = vec![
            "daemon".to_string(),
            "load_wallet".to_string(),
            "-P".to_string(),
            wallet_flag.to_string(),
        ];
        let mut load = self.launcher.launch(&args).await?;
        // The wallet program has not been seen to prompt here even for an
        // encrypted wallet; answering is opt-in.
        if self.signer.load_wallet_sends_password {
            if let Some(credential) = self.credential {
                load.expect(&password_prompt()).await?;
                load.send_line(credential.expose()).await?;
            }
        }
        let code = load.close().await?;
        if code != Some(0) {
            return Err(Error::ExternalProcess(format!(
                "load_wallet exited with {:?}",
                code
            )));
        }
        Ok(())
    }

    async fn sign(
        &self,
        transaction: &UnsignedTransaction,
        wallet_flag: &str,
    ) -> Result<SignedTransactionResult> {
        let request = transaction.load()?;
        let args = vec![
            "signtransaction".to_string(),
            "-P".to_string(),
            wallet_flag.to_string(),
            request.hex,
        ];
        let mut session = self.launcher.launch(&args).await?;

        if let Some(credential) = self.credential {
            session.expect(&password_prompt()).await?;
            session.send_line(credential.expose()).await?;
        }

        let finished = session.read_to_end().await?;
        if !finished.success() {
            return Err(Error::ExternalProcess(format!(
                "signtransaction exited with {:?}",
                finished.exit_code
            )));
        }

        let body: Value = serde_json::from_str(finished.output.trim()).map_err(|e| {
            Error::Deserialization(format!("signtransaction output is not JSON: {}", e))
        })?;
        Ok(SignedTransactionResult::from_output(body))
    }

    async fn stop(&self, wallet_flag: &str) -> Result<()> {
        let args = vec![
            "daemon".to_string(),
            "close_wallet".to_string(),
            "-P".to_string(),
            wallet_flag.to_string(),
        ];
        let close = self.launch_and_close(&args).await;

        let args = vec!["daemon".to_string(), "stop".to_string(), "-P".to_string()];
        self.launch_and_close(&args).await?;

        close.map(|_| ())
    }

    async fn launch_and_close(&self, args: &[String]) -> Result<Option<i32>> {
        let mut session = self.launcher.launch(args).await?;
        session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::keys::KeyMaterialLifecycleManager;
    use crate::signer::scripted::{ScriptedLauncher, SessionScript};
    use crate::signer::transactions::discover_unsigned;
    use tempfile::{tempdir, TempDir};

    const RESTORE_PROMPTS: &str =
        "Password (hit return if you do not wish to encrypt your wallet):\nConfirm password:\nWallet saved\n";

    struct Fixture {
        _dir: TempDir,
        config: Config,
        lifecycle: KeyMaterialLifecycleManager,
        seed: SeedHex,
    }

    fn fixture(inputs: &[(&str, &str)]) -> Fixture {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.transfer.data_dir = dir.path().join("xfer");
        config.signer.wallet_path = dir.path().join("private-wallet");
        std::fs::create_dir(&config.transfer.data_dir).unwrap();
        for (name, body) in inputs {
            std::fs::write(config.transfer.data_dir.join(name), body).unwrap();
        }
        let lifecycle = KeyMaterialLifecycleManager::new(&config.signer);
        Fixture {
            _dir: dir,
            config,
            lifecycle,
            seed: SeedHex::parse(&"a".repeat(32), 32).unwrap(),
        }
    }

    async fn run(f: &Fixture, launcher: &ScriptedLauncher, with_credential: bool) -> SigningReport {
        let transactions = discover_unsigned(&f.config.transfer).unwrap();
        let artifact = f.lifecycle.acquire_artifact().unwrap();
        let credential = with_credential.then(|| f.lifecycle.credential());
        let mut orchestrator =
            SigningOrchestrator::new(&f.config.signer, &f.config.transfer, launcher, credential);
        let report = orchestrator.run(&f.seed, &artifact, &transactions).await;
        assert_eq!(orchestrator.state(), SigningState::Done);
        report
    }

    fn sign_output(complete: bool) -> SessionScript {
        SessionScript::output(format!(
            "Password:\n{{\"complete\": {}, \"final\": {}, \"hex\": \"0200abcd\"}}\n",
            complete, complete
        ))
    }

    #[tokio::test]
    async fn test_success_then_failure_yields_two_results() {
        let f = fixture(&[
            ("unsigned1.txn", r#"{"hex": "01"}"#),
            ("unsigned2.txn", r#"{"hex": "02"}"#),
        ]);
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS).creating_wallet())
            .on("signtransaction", sign_output(true))
            .on("signtransaction", sign_output(false));

        let report = run(&f, &launcher, true).await;

        assert!(report.restored);
        assert_eq!(report.result_files(), vec!["signed-success1.txn", "signed-failure2.txn"]);

        let dir = &f.config.transfer.data_dir;
        let first: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("signed-success1.txn")).unwrap())
                .unwrap();
        assert_eq!(first["complete"], Value::Bool(true));
        assert_eq!(first["hex"], Value::String("0200abcd".into()));
        assert!(!dir.join("signed-failure1.txn").exists());
        assert!(!dir.join("signed-success2.txn").exists());

        assert_eq!(
            launcher.commands(),
            vec![
                "restore",
                "daemon start",
                "daemon load_wallet",
                "signtransaction",
                "signtransaction",
                "daemon close_wallet",
                "daemon stop",
            ]
        );
        // Payload of each input reaches the sign call
        let log = launcher.log();
        assert_eq!(log.launches[3].last().unwrap(), "01");
        assert_eq!(log.launches[4].last().unwrap(), "02");
    }

    #[tokio::test]
    async fn test_credential_answers_restore_and_sign_prompts() {
        let f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS))
            .on("signtransaction", sign_output(true));

        run(&f, &launcher, true).await;

        let credential = f.lifecycle.credential().expose().to_string();
        assert_eq!(launcher.lines_sent_to("restore"), vec![credential.clone(), credential.clone()]);
        assert_eq!(launcher.lines_sent_to("signtransaction"), vec![credential]);
        assert!(launcher.lines_sent_to("daemon load_wallet").is_empty());

        // Restore gets the lower-case seed and the wallet path
        let restore_args = &launcher.log().launches[0];
        assert_eq!(restore_args[..3], ["restore", "-o", "-P"]);
        assert!(restore_args[3].starts_with("-w"));
        assert_eq!(restore_args[4], "a".repeat(32));
    }

    #[tokio::test]
    async fn test_without_credential_sends_empty_password() {
        let f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output("Password:"))
            .on("signtransaction", SessionScript::output("{\"complete\": true}"));

        let report = run(&f, &launcher, false).await;

        assert_eq!(launcher.lines_sent_to("restore"), vec![String::new()]);
        assert!(launcher.lines_sent_to("signtransaction").is_empty());
        assert_eq!(report.signed(), 1);
    }

    #[tokio::test]
    async fn test_load_wallet_password_flag() {
        let mut f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        f.config.signer.load_wallet_sends_password = true;
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS))
            .on("daemon load_wallet", SessionScript::output("Password:"))
            .on("signtransaction", sign_output(true));

        let report = run(&f, &launcher, true).await;

        let credential = f.lifecycle.credential().expose().to_string();
        assert_eq!(launcher.lines_sent_to("daemon load_wallet"), vec![credential]);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_load_wallet_flag_without_prompt_fails_start_only() {
        let mut f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        f.config.signer.load_wallet_sends_password = true;
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS))
            .on("signtransaction", sign_output(true));

        let report = run(&f, &launcher, true).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].state, SigningState::Started);
        assert_eq!(report.signed(), 1);
    }

    #[tokio::test]
    async fn test_restore_failure_is_not_fatal() {
        let f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output("Error: bad seed").exit_code(1))
            .on("signtransaction", SessionScript::output("Password:\nwallet not loaded").exit_code(1));

        let report = run(&f, &launcher, true).await;

        assert!(!report.restored);
        assert_eq!(report.failures[0].state, SigningState::Restoring);
        assert_eq!(report.result_files(), vec!["signed-failure.txn"]);
        assert!(launcher.commands().contains(&"daemon stop".to_string()));
    }

    #[tokio::test]
    async fn test_fault_in_one_transaction_does_not_stop_batch() {
        let f = fixture(&[
            ("unsigned1.txn", r#"{"hex": "01"}"#),
            ("unsigned2.txn", "this is not json"),
            ("unsigned3.txn", r#"{"hex": "03"}"#),
            ("unsigned4.txn", r#"{"hex": "04"}"#),
            ("unsigned5.txn", r#"{"hex": "05"}"#),
        ]);
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS))
            .on("signtransaction", sign_output(true))
            // unsigned2 never launches; unsigned3 times out
            .on("signtransaction", SessionScript::hanging())
            .on("signtransaction", SessionScript::output("Password:\nnot json at all"))
            .on("signtransaction", sign_output(true));

        let report = run(&f, &launcher, true).await;

        assert_eq!(
            report.result_files(),
            vec![
                "signed-success1.txn",
                "signed-failure2.txn",
                "signed-failure3.txn",
                "signed-failure4.txn",
                "signed-success5.txn",
            ]
        );
        let states: Vec<SigningState> = report.failures.iter().map(|f| f.state).collect();
        assert_eq!(
            states,
            vec![SigningState::Signing(1), SigningState::Signing(2), SigningState::Signing(3)]
        );
    }

    #[tokio::test]
    async fn test_launch_failure_on_stop_is_reported() {
        let f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS))
            .on("signtransaction", sign_output(true))
            .on("daemon close_wallet", SessionScript::launch_failure());

        let report = run(&f, &launcher, true).await;

        assert_eq!(report.signed(), 1);
        assert_eq!(report.failures.last().unwrap().state, SigningState::Stopped);
        // Daemon stop still attempted after close_wallet failed
        assert_eq!(launcher.commands().last().unwrap(), "daemon stop");
    }

    #[tokio::test]
    async fn test_credential_never_written_to_results() {
        let f = fixture(&[("unsigned.txn", r#"{"hex": "01"}"#)]);
        let credential = f.lifecycle.credential().expose().to_string();
        // A program that echoes the password back into its output
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS))
            .on(
                "signtransaction",
                SessionScript::output(format!(
                    "Password:\n{{\"complete\": false, \"error\": \"bad password {}\"}}",
                    credential
                )),
            );

        run(&f, &launcher, true).await;

        let written =
            std::fs::read_to_string(f.config.transfer.data_dir.join("signed-failure.txn")).unwrap();
        assert!(!written.contains(&credential));
    }
}
