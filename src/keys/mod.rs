//! Ephemeral key material for a signing run
//!
//! A fresh random credential encrypts the temporary wallet the external
//! program restores. The credential lives only in memory and the wallet
//! file is removed when its guard goes out of scope, on success, error or
//! panic alike.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::config::SignerConfig;
use crate::error::{Error, Result};

/// Minimum credential strength
pub const CREDENTIAL_BITS: usize = 256;

/// Per-run secret protecting the temporary wallet
pub struct EphemeralCredential(SecretString);

impl EphemeralCredential {
    /// Generate `bits` (at least 256) of OS randomness, hex encoded
    pub fn generate(bits: usize) -> Self {
        let bytes = bits.max(CREDENTIAL_BITS).div_ceil(8);
        let mut raw = Zeroizing::new(vec![0u8; bytes]);
        OsRng.fill_bytes(&mut raw);
        Self(SecretString::from(hex::encode(raw.as_slice())))
    }

    /// The credential text, for answering the wallet program's prompts only
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralCredential([REDACTED])")
    }
}

/// Owns the run's credential and the temporary wallet location
pub struct KeyMaterialLifecycleManager {
    wallet_path: PathBuf,
    credential: EphemeralCredential,
}

impl KeyMaterialLifecycleManager {
    /// Generate the run's credential
    pub fn new(config: &SignerConfig) -> Self {
        let credential = EphemeralCredential::generate(CREDENTIAL_BITS);
        debug!("Generated ephemeral wallet credential");
        Self {
            wallet_path: config.wallet_path.clone(),
            credential,
        }
    }

    pub fn credential(&self) -> &EphemeralCredential {
        &self.credential
    }

    pub fn wallet_path(&self) -> &Path {
        &self.wallet_path
    }

    /// Remove a wallet left behind by an earlier run.
    ///
    /// Returns whether a file was removed.
    pub fn remove_stale_artifact(&self) -> Result<bool> {
        remove_artifact(&self.wallet_path)
    }

    /// Clear any stale wallet and hand out the guard for the new one
    pub fn acquire_artifact(&self) -> Result<WalletArtifactGuard> {
        if self.remove_stale_artifact()? {
            warn!(
                "Removed stale wallet artifact at {}",
                self.wallet_path.display()
            );
        }
        Ok(WalletArtifactGuard {
            path: self.wallet_path.clone(),
            released: false,
        })
    }
}

/// Deletes the temporary wallet when dropped
#[derive(Debug)]
pub struct WalletArtifactGuard {
    path: PathBuf,
    released: bool,
}

impl WalletArtifactGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Warn if the restored wallet can be read by group or others
    pub fn validate_permissions(&self) -> Option<String> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&self.path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Some(format!(
                        "Wallet artifact {} has insecure permissions {:o}",
                        self.path.display(),
                        mode & 0o777
                    ));
                }
            }
        }
        None
    }

    /// Delete the wallet now and report failure
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_artifact(&self.path)?;
        info!("Temporary wallet removed");
        Ok(())
    }
}

impl Drop for WalletArtifactGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match remove_artifact(&self.path) {
            Ok(true) => info!("Temporary wallet removed"),
            Ok(false) => {}
            Err(e) => error!(
                "Failed to remove temporary wallet {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn remove_artifact(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Io(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
