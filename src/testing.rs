//! In-memory gateways for unit tests

use crate::crypto::{EncryptionGateway, KeyInfo, Plaintext, RecipientSet};
use crate::error::{EncryptionError, GitError};
use crate::vcs::VersionControlGateway;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use zeroize::Zeroizing;

const MAGIC: &[u8] = b"MEMGPG:";

/// Encryption gateway with a fake message format
///
/// A message is `MEMGPG:<recipients>\n<masked plaintext>`, so tests can read
/// back who an entry was encrypted for.
pub(crate) struct MemoryGateway {
    public: HashSet<String>,
    secret: Mutex<Vec<String>>,
}

impl MemoryGateway {
    /// `public` keys can be encrypted to; `secret` keys can decrypt
    pub(crate) fn new(public: &[&str], secret: &[&str]) -> Self {
        MemoryGateway {
            public: public.iter().map(|s| s.to_string()).collect(),
            secret: Mutex::new(secret.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Swap the locally available secret keys
    pub(crate) fn set_secret(&self, secret: &[&str]) {
        *self.secret.lock() = secret.iter().map(|s| s.to_string()).collect();
    }

    pub(crate) fn recipients_of(ciphertext: &[u8]) -> Option<RecipientSet> {
        let rest = ciphertext.strip_prefix(MAGIC)?;
        let end = rest.iter().position(|b| *b == b'\n')?;
        let header = std::str::from_utf8(&rest[..end]).ok()?;
        Some(RecipientSet::from_ids(header.split(',')))
    }
}

fn mask(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ 0x5a).collect()
}

impl EncryptionGateway for MemoryGateway {
    fn encrypt(
        &self,
        plaintext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<Vec<u8>, EncryptionError> {
        if recipients.is_empty() {
            return Err(EncryptionError::NoUsableKey("no recipients given".to_string()));
        }
        if let Some(unknown) = recipients.iter().find(|id| !self.public.contains(*id)) {
            return Err(EncryptionError::NoUsableKey(format!("{}: No public key", unknown)));
        }
        let ids: Vec<&str> = recipients.iter().collect();
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(ids.join(",").as_bytes());
        out.push(b'\n');
        out.extend(mask(plaintext));
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Plaintext, EncryptionError> {
        let recipients = Self::recipients_of(ciphertext)
            .ok_or_else(|| EncryptionError::Failed("no valid OpenPGP data found".to_string()))?;
        let secret = self.secret.lock();
        if !recipients.iter().any(|id| secret.iter().any(|s| s == id)) {
            return Err(EncryptionError::NoUsableKey("decryption failed: No secret key".to_string()));
        }
        let body_start = ciphertext
            .iter()
            .position(|b| *b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(ciphertext.len());
        Ok(Zeroizing::new(mask(&ciphertext[body_start..])))
    }

    fn list_available_keys(&self) -> Result<Vec<KeyInfo>, EncryptionError> {
        Ok(self.secret.lock().iter().map(KeyInfo::new).collect())
    }

    fn is_encrypted_for(
        &self,
        ciphertext: &[u8],
        recipients: &RecipientSet,
    ) -> Result<bool, EncryptionError> {
        Ok(Self::recipients_of(ciphertext).as_ref() == Some(recipients))
    }
}

/// Version control gateway that records calls
#[derive(Default)]
pub(crate) struct RecordingVcs {
    log: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingVcs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail
    pub(crate) fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub(crate) fn commits(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|line| line.strip_prefix("commit ").map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) -> Result<(), GitError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GitError::Tool {
                program: "git".to_string(),
                operation: call,
                status: 128,
                stderr: "fatal: not a git repository".to_string(),
            });
        }
        self.log.lock().push(call);
        Ok(())
    }
}

impl VersionControlGateway for RecordingVcs {
    fn init(&self) -> Result<(), GitError> {
        self.record("init".to_string())
    }

    fn stage_all(&self) -> Result<(), GitError> {
        self.record("stage".to_string())
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        self.record(format!("commit {}", message))
    }

    fn push(&self) -> Result<(), GitError> {
        self.record("push".to_string())
    }

    fn pull(&self) -> Result<(), GitError> {
        self.record("pull".to_string())
    }
}
