//! CLI command implementations

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use dialoguer::Select;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::display::StatusDisplay;
use crate::entropy::{
    verify_round_trip, MnemonicCodec, SeedEntry, SeedHex, LABEL_MNEMONIC, LABEL_RAW_SEED,
};
use crate::error::{Error, Result};
use crate::input::InputSource;
use crate::keys::KeyMaterialLifecycleManager;
use crate::public_log::{append_public_log, derive_public_record};
use crate::signer::{discover_unsigned, ProcessLauncher, SigningOrchestrator, SigningReport};

/// What the operator came to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Create,
    Sign,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Create => write!(f, "Create a new seed from dice"),
            RunMode::Sign => write!(f, "Sign transactions"),
        }
    }
}

/// Ask for the run mode when none was given on the command line
pub fn choose_mode() -> anyhow::Result<RunMode> {
    let modes = [RunMode::Create, RunMode::Sign];
    let selection = Select::new()
        .with_prompt("What would you like to do?")
        .items(&modes)
        .default(0)
        .interact()?;
    Ok(modes[selection])
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Aborted(String),
    Fatal(String),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Fatal(_) => 1,
            RunOutcome::Aborted(_) => 130,
        }
    }
}

impl From<Error> for RunOutcome {
    fn from(e: Error) -> Self {
        match e {
            Error::Aborted(reason) => RunOutcome::Aborted(reason),
            other => RunOutcome::Fatal(other.to_string()),
        }
    }
}

fn finish<T>(result: Result<T>) -> RunOutcome {
    match result {
        Ok(_) => RunOutcome::Success,
        Err(e) => {
            let outcome = RunOutcome::from(e);
            match &outcome {
                RunOutcome::Aborted(reason) => warn!("Aborted: {}", reason),
                RunOutcome::Fatal(reason) => error!("{}", reason),
                RunOutcome::Success => {}
            }
            outcome
        }
    }
}

/// Create a seed from dice and log its public key and addresses
pub fn run_create(
    config: &Config,
    codec: &dyn MnemonicCodec,
    input: &mut dyn InputSource,
    display: &mut dyn StatusDisplay,
) -> RunOutcome {
    let result = create(config, codec, &mut *input, &mut *display);
    input.release();
    if let Ok(path) = &result {
        println!("\nPublic Key and Addresses logged to:\n{}", path.display());
    }
    finish(result)
}

fn create(
    config: &Config,
    codec: &dyn MnemonicCodec,
    input: &mut dyn InputSource,
    display: &mut dyn StatusDisplay,
) -> Result<PathBuf> {
    config.transfer.ensure_data_dir()?;

    let derived = SeedEntry::new(config.entropy, codec, &mut *input, &mut *display).from_dice()?;
    show_seed(codec, &derived.seed, display)?;

    display.status("creating public key");
    let record = derive_public_record(&derived.seed, config.transfer.addresses_to_show)?;
    info!(
        "Derived master public key and {} address(es)",
        record.addresses.len()
    );

    // Leave the seed on screen until the operator has copied it
    display.status("finished");
    input.flush()?;
    input.next_key()?;
    display.clear();

    let path = config.transfer.public_log_path();
    append_public_log(&path, &record)?;
    Ok(path)
}

/// Restore the seed from its mnemonic and sign every pending transaction
pub async fn run_sign(
    config: &Config,
    codec: &dyn MnemonicCodec,
    input: &mut dyn InputSource,
    display: &mut dyn StatusDisplay,
    launcher: &dyn ProcessLauncher,
) -> RunOutcome {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_sign_until(config, codec, input, display, launcher, interrupt).await
}

/// [`run_sign`] with the signing phase cut short when `interrupt` resolves
pub async fn run_sign_until(
    config: &Config,
    codec: &dyn MnemonicCodec,
    input: &mut dyn InputSource,
    display: &mut dyn StatusDisplay,
    launcher: &dyn ProcessLauncher,
    interrupt: impl Future<Output = ()>,
) -> RunOutcome {
    let result = sign(config, codec, &mut *input, &mut *display, launcher, interrupt).await;
    input.release();
    if let Ok(report) = &result {
        print_report(report);
    }
    finish(result)
}

async fn sign(
    config: &Config,
    codec: &dyn MnemonicCodec,
    input: &mut dyn InputSource,
    display: &mut dyn StatusDisplay,
    launcher: &dyn ProcessLauncher,
    interrupt: impl Future<Output = ()>,
) -> Result<SigningReport> {
    // Inputs must exist before any secret is entered or generated
    let transactions = discover_unsigned(&config.transfer)?;

    let derived =
        SeedEntry::new(config.entropy, codec, &mut *input, &mut *display).from_mnemonic()?;
    show_seed(codec, &derived.seed, display)?;
    display.clear();
    display.status("restoring wallet");
    input.release();

    let lifecycle = KeyMaterialLifecycleManager::new(&config.signer);
    let artifact = lifecycle.acquire_artifact()?;

    let mut orchestrator = SigningOrchestrator::new(
        &config.signer,
        &config.transfer,
        launcher,
        Some(lifecycle.credential()),
    );
    // Dropping the signing future kills any running wallet program
    let report = tokio::select! {
        report = orchestrator.run(&derived.seed, &artifact, &transactions) => Some(report),
        _ = interrupt => None,
    };

    if let Err(e) = artifact.release() {
        error!("Failed to remove temporary wallet: {}", e);
    }
    match report {
        Some(report) => Ok(report),
        None => {
            warn!("Received interrupt during signing");
            Err(Error::Aborted("interrupted during signing".into()))
        }
    }
}

// Encode the final seed, check it decodes back, and put both on screen
fn show_seed(
    codec: &dyn MnemonicCodec,
    seed: &SeedHex,
    display: &mut dyn StatusDisplay,
) -> Result<()> {
    display.clear();
    display.show(LABEL_RAW_SEED, &seed.display());
    let phrase = verify_round_trip(codec, seed)?;
    display.show(LABEL_MNEMONIC, phrase.as_str());
    Ok(())
}

fn print_report(report: &SigningReport) {
    println!("\n=== SIGNING RESULTS ===\n");
    if !report.restored {
        println!("Wallet restore failed; results below are likely failures.");
    }
    for outcome in &report.outcomes {
        let status = if outcome.complete { "signed" } else { "FAILED" };
        match &outcome.output {
            Some(path) => println!("{:<24} {:<8} -> {}", outcome.input, status, path.display()),
            None => println!("{:<24} {:<8} (result not written)", outcome.input, status),
        }
    }
    println!(
        "\n{}/{} transaction(s) fully signed",
        report.signed(),
        report.outcomes.len()
    );
    for failure in &report.failures {
        println!("  {:?}: {}", failure.state, failure.reason);
    }
}

/// Show current configuration
pub fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::RecordingDisplay;
    use crate::entropy::{Bip39Codec, MnemonicPhrase};
    use crate::input::ScriptedInput;
    use crate::signer::{ScriptedLauncher, SessionScript};
    use tempfile::{tempdir, TempDir};

    const ZERO_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const RESTORE_PROMPTS: &str = "Password:\nConfirm password:\n";

    fn setup(with_data_dir: bool) -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.transfer.data_dir = dir.path().join("xfer");
        config.signer.wallet_path = dir.path().join("private-wallet");
        if with_data_dir {
            std::fs::create_dir(&config.transfer.data_dir).unwrap();
        }
        (dir, config)
    }

    #[test]
    fn test_create_logs_public_key() {
        let (_dir, config) = setup(true);
        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text(&format!("{}x", "3".repeat(50)));
        let mut display = RecordingDisplay::new();

        let outcome = run_create(&config, &codec, &mut input, &mut display);
        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(input.remaining(), 0);

        let log = std::fs::read_to_string(config.transfer.public_log_path()).unwrap();
        assert!(log.starts_with("-------------------\n"));
        assert!(log.contains("Master Public Key:\nxpub"));
        let phrase = display.field(LABEL_MNEMONIC).unwrap();
        assert_eq!(phrase.split(' ').count(), 12);
        // The seed itself never reaches the public log
        let seed = display.field(LABEL_RAW_SEED).unwrap();
        assert!(!log.to_uppercase().contains(seed));
        assert!(!log.contains(phrase));
    }

    #[test]
    fn test_create_requires_data_dir_before_entry() {
        let (_dir, config) = setup(false);
        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text("123456");
        let mut display = RecordingDisplay::new();

        let outcome = run_create(&config, &codec, &mut input, &mut display);
        match &outcome {
            RunOutcome::Fatal(reason) => assert!(reason.contains("must exist")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(input.remaining(), 6);
    }

    #[test]
    fn test_create_round_trip_mismatch_is_fatal() {
        struct Lossy;
        impl MnemonicCodec for Lossy {
            fn is_word(&self, _: &str) -> bool {
                true
            }
            fn encode(&self, _: &SeedHex) -> Result<MnemonicPhrase> {
                Ok(MnemonicPhrase::new(&["lossy"; 12]))
            }
            fn decode(&self, _: &[&str]) -> Result<SeedHex> {
                SeedHex::parse(&"0".repeat(32), 32)
            }
        }

        let (_dir, config) = setup(true);
        let mut input = ScriptedInput::from_text(&format!("{}x", "3".repeat(50)));
        let mut display = RecordingDisplay::new();

        let outcome = run_create(&config, &Lossy, &mut input, &mut display);
        assert!(matches!(outcome, RunOutcome::Fatal(_)));
        assert!(!config.transfer.public_log_path().exists());
    }

    #[test]
    fn test_create_interrupt_aborts() {
        let (_dir, config) = setup(true);
        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text("12\x03");
        let mut display = RecordingDisplay::new();

        let outcome = run_create(&config, &codec, &mut input, &mut display);
        assert!(matches!(outcome, RunOutcome::Aborted(_)));
        assert_ne!(outcome.exit_code(), 0);
        assert!(!config.transfer.public_log_path().exists());
    }

    #[tokio::test]
    async fn test_sign_without_inputs_fails_before_entry() {
        let (_dir, config) = setup(true);
        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text(&format!("{}\n\n", ZERO_PHRASE));
        let keys = input.remaining();
        let mut display = RecordingDisplay::new();
        let launcher = ScriptedLauncher::new();

        let outcome = run_sign(&config, &codec, &mut input, &mut display, &launcher).await;
        match outcome {
            RunOutcome::Fatal(reason) => assert!(reason.contains("No unsigned transaction files")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(input.remaining(), keys);
        assert!(launcher.commands().is_empty());
    }

    #[tokio::test]
    async fn test_sign_end_to_end() {
        let (_dir, config) = setup(true);
        let xfer = &config.transfer.data_dir;
        std::fs::write(xfer.join("unsigned1.txn"), r#"{"hex": "0101"}"#).unwrap();
        std::fs::write(xfer.join("unsigned2.txn"), r#"{"hex": "0202"}"#).unwrap();

        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text(&format!("{}\n\n", ZERO_PHRASE));
        let mut display = RecordingDisplay::new();
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS).creating_wallet())
            .on(
                "signtransaction",
                SessionScript::output("Password:\n{\"complete\": true, \"hex\": \"ff\"}"),
            )
            .on(
                "signtransaction",
                SessionScript::output("Password:\n{\"complete\": false, \"hex\": \"ee\"}"),
            );

        let outcome = run_sign(&config, &codec, &mut input, &mut display, &launcher).await;
        assert_eq!(outcome, RunOutcome::Success);

        assert!(xfer.join("signed-success1.txn").exists());
        assert!(xfer.join("signed-failure2.txn").exists());
        assert!(!config.signer.wallet_path.exists());
        // The seed is wiped from screen and the progress line stays visible
        assert_eq!(display.visible_status, "restoring wallet");

        let restore = &launcher.log().launches[0];
        assert_eq!(restore.last().unwrap(), &"0".repeat(32));

        // The wallet credential never lands in the transfer directory
        let credential = launcher.lines_sent_to("restore").remove(0);
        assert_eq!(credential.len(), 64);
        for entry in std::fs::read_dir(xfer).unwrap() {
            let content = std::fs::read_to_string(entry.unwrap().path()).unwrap();
            assert!(!content.contains(&credential));
        }
    }

    #[tokio::test]
    async fn test_sign_interrupt_aborts_without_launching() {
        let (_dir, config) = setup(true);
        std::fs::write(config.transfer.data_dir.join("unsigned.txn"), r#"{"hex": "01"}"#).unwrap();

        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text("aban\x03");
        let mut display = RecordingDisplay::new();
        let launcher = ScriptedLauncher::new();

        let outcome = run_sign(&config, &codec, &mut input, &mut display, &launcher).await;
        assert!(matches!(outcome, RunOutcome::Aborted(_)));
        assert!(launcher.commands().is_empty());
        assert!(!config.signer.wallet_path.exists());
    }

    #[tokio::test]
    async fn test_sign_interrupt_during_signing_removes_wallet() {
        let (_dir, config) = setup(true);
        std::fs::write(config.transfer.data_dir.join("unsigned1.txn"), r#"{"hex": "01"}"#).unwrap();

        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text(&format!("{}\n\n", ZERO_PHRASE));
        let mut display = RecordingDisplay::new();
        let launcher = ScriptedLauncher::new()
            .on("restore", SessionScript::output(RESTORE_PROMPTS).creating_wallet())
            .on("signtransaction", SessionScript::stalled());

        let interrupt = tokio::time::sleep(std::time::Duration::from_millis(200));
        let outcome =
            run_sign_until(&config, &codec, &mut input, &mut display, &launcher, interrupt).await;

        assert!(matches!(outcome, RunOutcome::Aborted(_)));
        assert_eq!(outcome.exit_code(), 130);
        assert!(launcher.commands().contains(&"signtransaction".to_string()));
        assert!(!config.signer.wallet_path.exists());
        assert!(!config.transfer.data_dir.join("signed-success1.txn").exists());
    }

    #[tokio::test]
    async fn test_sign_report_survives_failed_wallet_removal() {
        // Restores into a directory, which a file removal cannot delete
        struct DirectoryWallet {
            inner: ScriptedLauncher,
            path: PathBuf,
        }

        #[async_trait::async_trait]
        impl ProcessLauncher for DirectoryWallet {
            async fn launch(&self, args: &[String]) -> Result<Box<dyn crate::signer::ProcessSession>> {
                if args.first().map(String::as_str) == Some("restore") {
                    std::fs::create_dir_all(&self.path)?;
                }
                self.inner.launch(args).await
            }
        }

        let (_dir, config) = setup(true);
        let xfer = &config.transfer.data_dir;
        std::fs::write(xfer.join("unsigned1.txn"), r#"{"hex": "01"}"#).unwrap();

        let codec = Bip39Codec::new(32);
        let mut input = ScriptedInput::from_text(&format!("{}\n\n", ZERO_PHRASE));
        let mut display = RecordingDisplay::new();
        let launcher = DirectoryWallet {
            inner: ScriptedLauncher::new()
                .on("restore", SessionScript::output(RESTORE_PROMPTS))
                .on(
                    "signtransaction",
                    SessionScript::output("Password:\n{\"complete\": true, \"hex\": \"ff\"}"),
                ),
            path: config.signer.wallet_path.clone(),
        };

        let outcome = run_sign(&config, &codec, &mut input, &mut display, &launcher).await;
        assert_eq!(outcome, RunOutcome::Success);
        assert!(xfer.join("signed-success1.txn").exists());
        assert!(config.signer.wallet_path.is_dir());
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            RunOutcome::from(Error::Aborted("ctrl-c".into())),
            RunOutcome::Aborted("ctrl-c".into())
        );
        assert!(matches!(
            RunOutcome::from(Error::Integrity("mismatch".into())),
            RunOutcome::Fatal(_)
        ));
        assert_eq!(RunOutcome::Success.exit_code(), 0);
    }
}
