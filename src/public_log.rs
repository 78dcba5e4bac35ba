//! Public key log
//!
//! After a seed is created the account's extended public key and its first
//! receive addresses are appended to a plain text log in the transfer
//! directory, so the seed can be funded without bringing it online.
//!
//! Keys follow BIP32 from the raw seed bytes: account `m/0'`, receive chain
//! `m/0'/0`, P2PKH addresses on mainnet.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network};
use chrono::{DateTime, Local};
use tracing::info;

use crate::entropy::SeedHex;
use crate::error::{Error, Result};

const SEPARATOR: &str = "-------------------";

/// What gets written to the public log for one seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRecord {
    pub master_public_key: String,
    pub addresses: Vec<String>,
}

/// Derive the account public key and `count` receive addresses
pub fn derive_public_record(seed: &SeedHex, count: usize) -> Result<PublicKeyRecord> {
    let secp = Secp256k1::new();
    let bytes = seed.to_bytes()?;

    let master = Xpriv::new_master(Network::Bitcoin, &bytes)
        .map_err(|e| Error::KeyDerivation(format!("master key: {}", e)))?;
    let account_path = [hardened(0)?];
    let account = master
        .derive_priv(&secp, &account_path)
        .map_err(|e| Error::KeyDerivation(format!("account key: {}", e)))?;
    let account_pub = Xpub::from_priv(&secp, &account);

    let receive = account_pub
        .derive_pub(&secp, &[normal(0)?])
        .map_err(|e| Error::KeyDerivation(format!("receive chain: {}", e)))?;

    let mut addresses = Vec::with_capacity(count);
    for index in 0..count {
        let child = receive
            .derive_pub(&secp, &[normal(index as u32)?])
            .map_err(|e| Error::KeyDerivation(format!("address {}: {}", index, e)))?;
        let address = Address::p2pkh(child.to_pub().pubkey_hash(), Network::Bitcoin);
        addresses.push(address.to_string());
    }

    Ok(PublicKeyRecord {
        master_public_key: account_pub.to_string(),
        addresses,
    })
}

fn hardened(index: u32) -> Result<ChildNumber> {
    ChildNumber::from_hardened_idx(index).map_err(|e| Error::KeyDerivation(e.to_string()))
}

fn normal(index: u32) -> Result<ChildNumber> {
    ChildNumber::from_normal_idx(index).map_err(|e| Error::KeyDerivation(e.to_string()))
}

/// Render one log block
pub fn format_entry(record: &PublicKeyRecord, at: DateTime<Local>) -> String {
    let mut entry = format!(
        "{}\n{}\n\nMaster Public Key:\n{}\n\nPublic Addresses:\n",
        SEPARATOR,
        at.format("%Y-%m-%d %H:%M:%S"),
        record.master_public_key
    );
    for address in &record.addresses {
        entry.push_str(address);
        entry.push('\n');
    }
    entry.push('\n');
    entry
}

/// Append a block for `record` to the log at `path`
pub fn append_public_log(path: &Path, record: &PublicKeyRecord) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::Io(format!("Cannot open {}: {}", path.display(), e)))?;
    file.write_all(format_entry(record, Local::now()).as_bytes())?;
    info!(
        "Appended public key and {} address(es) to {}",
        record.addresses.len(),
        path.display()
    );
    Ok(())
}
