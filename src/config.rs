//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub entropy: EntropyBudget,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub signer: SignerConfig,
}

/// How much dice entropy is required and how wide the resulting seed is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EntropyBudget {
    /// Rolls required before a seed is accepted
    #[serde(default = "default_min_rolls")]
    pub min_rolls: usize,
    /// Bits of entropy kept from the roll sequence
    #[serde(default = "default_target_bits")]
    pub target_bits: u32,
    /// Hex digits in the seed (target_bits / 4)
    #[serde(default = "default_hex_digits")]
    pub hex_digits: usize,
}

impl EntropyBudget {
    /// Bits of entropy carried by `min_rolls` fair six-sided dice
    pub fn roll_entropy_bits(&self) -> f64 {
        self.min_rolls as f64 * 6f64.log2()
    }

    /// Words in the mnemonic encoding of a seed of this width
    pub fn mnemonic_words(&self) -> usize {
        (self.target_bits as usize * 3) / 32
    }

    /// Check the budget invariants
    pub fn validate(&self) -> Result<()> {
        if self.roll_entropy_bits() < self.target_bits as f64 {
            anyhow::bail!(
                "{} rolls carry {:.1} bits, less than target_bits {}",
                self.min_rolls,
                self.roll_entropy_bits(),
                self.target_bits
            );
        }
        if self.hex_digits * 4 != self.target_bits as usize {
            anyhow::bail!(
                "hex_digits {} does not encode target_bits {}",
                self.hex_digits,
                self.target_bits
            );
        }
        // Mnemonic codec accepts 128..=256 bits in 32-bit steps
        if !(128..=256).contains(&self.target_bits) || self.target_bits % 32 != 0 {
            anyhow::bail!(
                "target_bits {} has no mnemonic encoding (use 128-256 in steps of 32)",
                self.target_bits
            );
        }
        Ok(())
    }
}

impl Default for EntropyBudget {
    fn default() -> Self {
        Self {
            min_rolls: default_min_rolls(),
            target_bits: default_target_bits(),
            hex_digits: default_hex_digits(),
        }
    }
}

/// Layout of the transfer directory shared with the networked machine
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_public_log_file")]
    pub public_log_file: String,
    #[serde(default = "default_unsigned_prefix")]
    pub unsigned_prefix: String,
    #[serde(default = "default_success_prefix")]
    pub success_prefix: String,
    #[serde(default = "default_failure_prefix")]
    pub failure_prefix: String,
    /// Extension including the leading dot
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Receive addresses written to the public log
    #[serde(default = "default_addresses_to_show")]
    pub addresses_to_show: usize,
}

impl TransferConfig {
    /// Path of the append-only public key log
    pub fn public_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.public_log_file)
    }

    /// Fail unless the transfer directory exists
    pub fn ensure_data_dir(&self) -> crate::Result<()> {
        if self.data_dir.is_dir() {
            Ok(())
        } else {
            Err(crate::Error::Resource(format!(
                "Data folder {} must exist.",
                self.data_dir.display()
            )))
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            public_log_file: default_public_log_file(),
            unsigned_prefix: default_unsigned_prefix(),
            success_prefix: default_success_prefix(),
            failure_prefix: default_failure_prefix(),
            extension: default_extension(),
            addresses_to_show: default_addresses_to_show(),
        }
    }
}

/// External wallet program settings
#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    /// Wallet program executable
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// Transient wallet artifact, deleted at the end of every run
    #[serde(default = "default_wallet_path")]
    pub wallet_path: PathBuf,
    /// Bound on every interaction with the wallet program
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Answer a password prompt when loading the wallet into the daemon.
    /// The wallet program has not been observed to prompt here.
    #[serde(default)]
    pub load_wallet_sends_password: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            wallet_path: default_wallet_path(),
            timeout_secs: default_timeout_secs(),
            load_wallet_sends_password: false,
        }
    }
}

// Default value functions
fn default_min_rolls() -> usize {
    50 // 50 * log2(6) ~ 129.2 bits
}

fn default_target_bits() -> u32 {
    128
}

fn default_hex_digits() -> usize {
    32
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/xfer")
}

fn default_public_log_file() -> String {
    "public-keys-and-addresses.txt".to_string()
}

fn default_unsigned_prefix() -> String {
    "unsigned".to_string()
}

fn default_success_prefix() -> String {
    "signed-success".to_string()
}

fn default_failure_prefix() -> String {
    "signed-failure".to_string()
}

fn default_extension() -> String {
    ".txn".to_string()
}

fn default_addresses_to_show() -> usize {
    5
}

fn default_program() -> PathBuf {
    PathBuf::from("electrum")
}

fn default_wallet_path() -> PathBuf {
    std::env::temp_dir().join("coldroll-private-wallet")
}

fn default_timeout_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("entropy.min_rolls", default_min_rolls() as i64)?
            .set_default("entropy.target_bits", default_target_bits() as i64)?
            .set_default("entropy.hex_digits", default_hex_digits() as i64)?
            .set_default("signer.timeout_secs", default_timeout_secs() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables, e.g. COLDROLL_SIGNER__TIMEOUT_SECS
            .add_source(
                config::Environment::with_prefix("COLDROLL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.entropy.validate()?;

        let prefixes = [
            ("unsigned_prefix", &self.transfer.unsigned_prefix),
            ("success_prefix", &self.transfer.success_prefix),
            ("failure_prefix", &self.transfer.failure_prefix),
        ];
        for (name, value) in prefixes {
            if value.is_empty() {
                anyhow::bail!("transfer.{} must not be empty", name);
            }
        }

        if self.transfer.success_prefix == self.transfer.failure_prefix {
            anyhow::bail!("success_prefix and failure_prefix must differ");
        }

        if !self.transfer.extension.starts_with('.') {
            anyhow::bail!(
                "transfer.extension must start with '.', got {:?}",
                self.transfer.extension
            );
        }

        if self.signer.timeout_secs == 0 {
            anyhow::bail!("signer.timeout_secs must be positive");
        }

        if self.signer.load_wallet_sends_password {
            tracing::warn!("load_wallet_sends_password is set - the daemon will be sent the wallet password on load");
        }

        Ok(())
    }

    /// Render the effective configuration. Holds no secrets.
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Entropy:
    min_rolls: {}
    target_bits: {}
    hex_digits: {}
    mnemonic_words: {}
  Transfer:
    data_dir: {}
    public_log: {}
    unsigned inputs: {}*{}
    results: {}*{} / {}*{}
    addresses_to_show: {}
  Signer:
    program: {}
    wallet_path: {}
    timeout: {}s
    load_wallet_sends_password: {}
"#,
            self.entropy.min_rolls,
            self.entropy.target_bits,
            self.entropy.hex_digits,
            self.entropy.mnemonic_words(),
            self.transfer.data_dir.display(),
            self.transfer.public_log_file,
            self.transfer.unsigned_prefix,
            self.transfer.extension,
            self.transfer.success_prefix,
            self.transfer.extension,
            self.transfer.failure_prefix,
            self.transfer.extension,
            self.transfer.addresses_to_show,
            self.signer.program.display(),
            self.signer.wallet_path.display(),
            self.signer.timeout_secs,
            self.signer.load_wallet_sends_password,
        )
    }
}
