//! Unsigned transaction inputs and signed results in the transfer directory
//!
//! Inputs are named `<unsigned_prefix><suffix><extension>`, e.g.
//! `unsigned.txn`, `unsigned1.txn`. Results reuse the suffix behind the
//! success or failure prefix: `signed-success1.txn`, `signed-failure.txn`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::error::{Error, Result};

/// An input file awaiting signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub file_name: String,
    /// File stem after the unsigned prefix
    pub suffix: String,
    pub path: PathBuf,
}

/// Contents of an input file. Only the payload is needed for signing.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub hex: String,
}

impl UnsignedTransaction {
    /// Read and parse the request
    pub fn load(&self) -> Result<TransactionRequest> {
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Deserialization(format!("{} is not a transaction request: {}", self.file_name, e))
        })
    }
}

/// Find inputs in file-name order.
///
/// A missing directory or an empty result is a resource error.
pub fn discover_unsigned(transfer: &TransferConfig) -> Result<Vec<UnsignedTransaction>> {
    transfer.ensure_data_dir()?;

    let mut found = Vec::new();
    for entry in std::fs::read_dir(&transfer.data_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(suffix) = input_suffix(transfer, file_name) {
            found.push(UnsignedTransaction {
                file_name: file_name.to_string(),
                suffix,
                path: path.clone(),
            });
        }
    }

    if found.is_empty() {
        return Err(Error::Resource(format!(
            "No unsigned transaction files found ({}{}, etc.).",
            transfer.unsigned_prefix, transfer.extension
        )));
    }

    found.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    info!("Found {} unsigned transaction file(s)", found.len());
    Ok(found)
}

fn input_suffix(transfer: &TransferConfig, file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(transfer.extension.as_str())?;
    stem.strip_prefix(transfer.unsigned_prefix.as_str())
        .map(str::to_string)
}

/// Outcome of signing one input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedTransactionResult {
    pub complete: bool,
    /// Wallet program output, or `{"complete": false, "error": ...}`
    pub body: Value,
}

impl SignedTransactionResult {
    /// Classify the wallet program's JSON output by its `complete` flag
    pub fn from_output(body: Value) -> Self {
        let complete = body.get("complete").and_then(Value::as_bool) == Some(true);
        Self { complete, body }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            complete: false,
            body: json!({ "complete": false, "error": reason.into() }),
        }
    }
}

/// Result file name for `suffix`
pub fn result_file_name(transfer: &TransferConfig, suffix: &str, complete: bool) -> String {
    let prefix = if complete {
        &transfer.success_prefix
    } else {
        &transfer.failure_prefix
    };
    format!("{}{}{}", prefix, suffix, transfer.extension)
}

/// Write the result next to its input.
///
/// Any occurrence of a `secret` in the body is masked before writing.
pub fn persist_result(
    transfer: &TransferConfig,
    input: &UnsignedTransaction,
    result: &SignedTransactionResult,
    secrets: &[&str],
) -> Result<PathBuf> {
    let mut text = serde_json::to_string(&result.body)?;
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        text = text.replace(secret, "[REDACTED]");
    }

    let path = result_path(transfer, &input.suffix, result.complete);
    std::fs::write(&path, text)?;
    debug!("Wrote {}", path.display());
    Ok(path)
}

fn result_path(transfer: &TransferConfig, suffix: &str, complete: bool) -> PathBuf {
    transfer
        .data_dir
        .join(result_file_name(transfer, suffix, complete))
}

/// File name component of a result path
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn transfer(dir: &Path) -> TransferConfig {
        TransferConfig {
            data_dir: dir.to_path_buf(),
            ..TransferConfig::default()
        }
    }

    #[test]
    fn test_discovers_matching_files_in_order() {
        let dir = tempdir().unwrap();
        for name in [
            "unsigned2.txn",
            "unsigned.txn",
            "unsigned1.txn",
            "unsigned1.json",
            "signed-success.txn",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("unsigned-dir.txn")).unwrap();

        let found = discover_unsigned(&transfer(dir.path())).unwrap();
        let names: Vec<&str> = found.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(names, vec!["unsigned.txn", "unsigned1.txn", "unsigned2.txn"]);
        let suffixes: Vec<&str> = found.iter().map(|t| t.suffix.as_str()).collect();
        assert_eq!(suffixes, vec!["", "1", "2"]);
    }

    #[test]
    fn test_no_inputs_is_resource_error() {
        let dir = tempdir().unwrap();
        let err = discover_unsigned(&transfer(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Resource(_)));

        let err = discover_unsigned(&transfer(&dir.path().join("missing"))).unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
    }

    #[test]
    fn test_result_names() {
        let t = TransferConfig::default();
        assert_eq!(result_file_name(&t, "1", true), "signed-success1.txn");
        assert_eq!(result_file_name(&t, "", false), "signed-failure.txn");
    }

    #[test]
    fn test_classification() {
        let ok = SignedTransactionResult::from_output(json!({"complete": true, "hex": "00"}));
        assert!(ok.complete);
        let partial = SignedTransactionResult::from_output(json!({"complete": false, "hex": "00"}));
        assert!(!partial.complete);
        let odd = SignedTransactionResult::from_output(json!({"complete": "yes"}));
        assert!(!odd.complete);
    }

    #[test]
    fn test_load_request() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("unsigned.txn"), r#"{"hex": "0100", "complete": false}"#).unwrap();
        std::fs::write(dir.path().join("unsigned2.txn"), "not json").unwrap();

        let found = discover_unsigned(&transfer(dir.path())).unwrap();
        assert_eq!(found[0].load().unwrap().hex, "0100");
        assert!(found[1].load().is_err());
    }

    #[test]
    fn test_persist_masks_secrets() {
        let dir = tempdir().unwrap();
        let t = transfer(dir.path());
        let input = UnsignedTransaction {
            file_name: "unsigned7.txn".into(),
            suffix: "7".into(),
            path: dir.path().join("unsigned7.txn"),
        };
        let result = SignedTransactionResult::failure("bad password deadbeefcafe");

        let path = persist_result(&t, &input, &result, &["deadbeefcafe"]).unwrap();
        assert_eq!(display_name(&path), "signed-failure7.txn");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("deadbeefcafe"));
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["complete"], json!(false));
    }
}
