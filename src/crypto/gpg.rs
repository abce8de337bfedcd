//! GnuPG-backed encryption gateway
//!
//! Invokes the `gpg` executable once per call. Plaintext travels over stdin
//! and ciphertext over stdout, so nothing unencrypted touches the disk.

use super::{EncryptionGateway, KeyInfo, Plaintext, RecipientSet};
use crate::config::GpgConfig;
use crate::error::EncryptionError;
use crate::process::{self, ProcessFailure, ProcessOutput};
use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Options shared by every invocation
const BASE_ARGS: &[&str] = &["--batch", "--quiet", "--yes", "--no-encrypt-to", "--use-agent"];

/// gpg talking to a local keyring
pub struct GpgGateway {
    executable: PathBuf,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl GpgGateway {
    pub fn new(config: &GpgConfig) -> Self {
        GpgGateway {
            executable: config.executable.clone(),
            extra_args: config.extra_args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn run(&self, args: &[String], input: Option<&[u8]>) -> Result<ProcessOutput, EncryptionError> {
        let all = BASE_ARGS
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra_args.iter().cloned())
            .chain(args.iter().cloned());
        process::run(&self.executable, all, None, input, self.timeout).map_err(|e| match e {
            ProcessFailure::Io(err) => EncryptionError::Io(err),
            ProcessFailure::Timeout => EncryptionError::Timeout {
                program: self.executable.display().to_string(),
                secs: self.timeout.as_secs(),
            },
        })
    }

    fn tool_error(&self, output: &ProcessOutput) -> EncryptionError {
        let stderr = output.stderr_lossy();
        if is_missing_key(&stderr) {
            EncryptionError::NoUsableKey(stderr)
        } else {
            EncryptionError::Tool {
                program: self.executable.display().to_string(),
                status: output.code(),
                stderr,
            }
        }
    }

    /// Encryption-capable key ids of the public key(s) a recipient names
    fn encryption_key_ids(&self, recipient: &str) -> Result<HashSet<String>, EncryptionError> {
        let args = vec![
            "--with-colons".to_string(),
            "--fixed-list-mode".to_string(),
            "--list-keys".to_string(),
            recipient.to_string(),
        ];
        let output = self.run(&args, None)?;
        if !output.success() {
            return Err(self.tool_error(&output));
        }
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(parse_encryption_key_ids(&listing))
    }
}

impl EncryptionGateway for GpgGateway {
    fn encrypt(
        &self,
        plaintext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<Vec<u8>, EncryptionError> {
        if recipients.is_empty() {
            return Err(EncryptionError::NoUsableKey(
                "no recipients given".to_string(),
            ));
        }
        let mut args = vec!["--encrypt".to_string()];
        for id in recipients.iter() {
            args.push("-r".to_string());
            args.push(id.to_string());
        }
        args.push("--output".to_string());
        args.push("-".to_string());

        let output = self.run(&args, Some(plaintext))?;
        if !output.success() {
            return Err(self.tool_error(&output));
        }
        if output.stdout.is_empty() {
            return Err(EncryptionError::Failed(
                "gpg produced no ciphertext".to_string(),
            ));
        }
        Ok(output.stdout)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Plaintext, EncryptionError> {
        let args = vec!["--decrypt".to_string()];
        let output = self.run(&args, Some(ciphertext))?;
        if !output.success() {
            let err = self.tool_error(&output);
            // stdout may hold partial plaintext
            drop(Zeroizing::new(output.stdout));
            return Err(err);
        }
        Ok(Zeroizing::new(output.stdout))
    }

    fn list_available_keys(&self) -> Result<Vec<KeyInfo>, EncryptionError> {
        let args = vec![
            "--with-colons".to_string(),
            "--fixed-list-mode".to_string(),
            "--list-secret-keys".to_string(),
        ];
        let output = self.run(&args, None)?;
        if !output.success() {
            return Err(self.tool_error(&output));
        }
        let keys = parse_secret_keys(&String::from_utf8_lossy(&output.stdout));
        debug!("gpg reports {} usable secret keys", keys.len());
        Ok(keys)
    }

    fn is_encrypted_for(
        &self,
        ciphertext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<bool, EncryptionError> {
        let args = vec![
            "--verbose".to_string(),
            "--list-only".to_string(),
            "--keyid-format=long".to_string(),
            "--decrypt".to_string(),
        ];
        let output = self.run(&args, Some(ciphertext))?;
        let actual = parse_packet_key_ids(&output.stderr_lossy());
        if actual.is_empty() {
            return Ok(false);
        }

        let mut known = HashSet::new();
        for recipient in recipients.iter() {
            let ids = match self.encryption_key_ids(recipient) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Could not list keys for recipient {}: {}", recipient, e);
                    return Ok(false);
                }
            };
            // Every recipient must be able to read the entry
            if ids.is_disjoint(&actual) {
                return Ok(false);
            }
            known.extend(ids);
        }
        // And nobody else may
        Ok(actual.is_subset(&known))
    }
}

fn is_missing_key(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no secret key")
        || lower.contains("no public key")
        || lower.contains("unusable public key")
        || lower.contains("no valid addressees")
}

/// Parse `--list-secret-keys --with-colons` output
///
/// Every primary key and subkey becomes one entry, subkeys inheriting the
/// user ids of their primary key.
fn parse_secret_keys(listing: &str) -> Vec<KeyInfo> {
    let mut keys: Vec<KeyInfo> = Vec::new();
    let mut primary_uids: Vec<String> = Vec::new();
    let mut primary_index = None;
    let mut awaiting_fpr = false;

    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("sec") => {
                primary_uids.clear();
                keys.push(KeyInfo::new(field(&fields, 4)));
                primary_index = Some(keys.len() - 1);
                awaiting_fpr = true;
            }
            Some("ssb") => {
                keys.push(KeyInfo {
                    key_id: field(&fields, 4).to_string(),
                    fingerprint: None,
                    user_ids: primary_uids.clone(),
                });
                awaiting_fpr = true;
            }
            Some("fpr") if awaiting_fpr => {
                if let Some(key) = keys.last_mut() {
                    key.fingerprint = Some(field(&fields, 9).to_string());
                }
                awaiting_fpr = false;
            }
            Some("uid") => {
                let uid = field(&fields, 9).to_string();
                if let Some(idx) = primary_index {
                    keys[idx].user_ids.push(uid.clone());
                }
                primary_uids.push(uid);
            }
            _ => {}
        }
    }
    keys
}

/// Key ids able to encrypt, from `--list-keys --with-colons` output
fn parse_encryption_key_ids(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .map(|line| line.split(':').collect::<Vec<_>>())
        .filter(|f| matches!(f.first().copied(), Some("pub") | Some("sub")))
        .filter(|f| field(f, 11).contains('e'))
        .map(|f| field(&f, 4).to_ascii_uppercase())
        .collect()
}

/// Key ids a message is encrypted to, from `--list-only --verbose` diagnostics
fn parse_packet_key_ids(diagnostics: &str) -> HashSet<String> {
    static PUBKEY_RE: OnceLock<Regex> = OnceLock::new();
    let re = PUBKEY_RE.get_or_init(|| {
        Regex::new(r"(?i)public key is (?:0x)?([0-9a-f]{16})").expect("valid regex")
    });
    re.captures_iter(diagnostics)
        .map(|c| c[1].to_ascii_uppercase())
        .collect()
}

fn field<'a>(fields: &[&'a str], idx: usize) -> &'a str {
    fields.get(idx).copied().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_LISTING: &str = "\
sec:u:255:22:1111222233334444:1600000000:::u:::scESC:::+:::ed25519:::0:
fpr:::::::::AAAABBBBCCCCDDDD1111222233334444:
grp:::::::::0123:
uid:u::::1600000000::HASH::Alice <alice@example.org>::::::::::0:
ssb:u:255:18:5555666677778888:1600000000::::::e:::+:::cv25519::
fpr:::::::::EEEEFFFF000011115555666677778888:
";

    #[test]
    fn test_parse_secret_keys() {
        let keys = parse_secret_keys(SECRET_LISTING);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].key_id, "1111222233334444");
        assert_eq!(
            keys[0].fingerprint.as_deref(),
            Some("AAAABBBBCCCCDDDD1111222233334444")
        );
        assert_eq!(keys[0].user_ids, vec!["Alice <alice@example.org>"]);
        assert_eq!(keys[1].key_id, "5555666677778888");
        assert_eq!(keys[1].user_ids, vec!["Alice <alice@example.org>"]);
        assert!(keys[0].matches("alice@example.org"));
    }

    #[test]
    fn test_parse_encryption_key_ids() {
        let listing = SECRET_LISTING.replace("sec:", "pub:").replace("ssb:", "sub:");
        let ids = parse_encryption_key_ids(&listing);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("5555666677778888"));
    }

    #[test]
    fn test_parse_packet_key_ids() {
        let diagnostics = "gpg: public key is 5555666677778888\n\
                           gpg: encrypted with cv25519 key, ID 5555666677778888\n\
                           gpg: public key is 0x99990000AAAABBBB\n";
        let ids = parse_packet_key_ids(diagnostics);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("99990000AAAABBBB"));
    }

    #[test]
    fn test_missing_key_detection() {
        assert!(is_missing_key("gpg: decryption failed: No secret key"));
        assert!(is_missing_key("gpg: K9: skipped: No public key"));
        assert!(!is_missing_key("gpg: signal caught"));
    }
}
