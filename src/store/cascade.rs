//! Re-encryption cascade
//!
//! Brings every entry below a folder in line with the folder's recipients:
//! - Entries are visited one at a time in lexical path order
//! - Each entry is decrypted, re-encrypted and replaced atomically
//! - A failed entry is recorded and the walk continues
//! - Entries under a nested declaration keep that declaration's recipients
//!
//! Nothing is rolled back. Running the cascade again over the same folder
//! retries the failures and skips entries already encrypted correctly.

use super::path::StorePath;
use super::recipients::RecipientResolver;
use super::tree::{collect_entries, write_atomic};
use crate::crypto::{EncryptionGateway, RecipientSet};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Progress information for a cascade run
#[derive(Debug, Clone)]
pub struct CascadeProgress {
    /// Folder whose subtree is being re-encrypted
    pub folder: StorePath,
    /// Total number of entries to visit
    pub total_entries: usize,
    /// Entries visited so far
    pub processed_entries: usize,
    /// Entries rewritten for new recipients
    pub reencrypted_entries: usize,
    /// Entries already encrypted correctly
    pub unchanged_entries: usize,
    /// Entries that failed
    pub failed_entries: usize,
    pub phase: CascadePhase,
}

impl CascadeProgress {
    pub fn new(folder: StorePath, total_entries: usize) -> Self {
        Self {
            folder,
            total_entries,
            processed_entries: 0,
            reencrypted_entries: 0,
            unchanged_entries: 0,
            failed_entries: 0,
            phase: CascadePhase::Starting,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress_fraction(&self) -> f32 {
        if self.total_entries == 0 {
            return 1.0;
        }
        self.processed_entries as f32 / self.total_entries as f32
    }

    /// Get progress as percentage (0 to 100)
    pub fn progress_percent(&self) -> u8 {
        (self.progress_fraction() * 100.0) as u8
    }
}

/// Phase of a cascade run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePhase {
    Starting,
    /// Enumerating entries
    Scanning,
    /// Re-encrypting entries
    Processing,
    /// Every entry visited without failure
    Completed,
    /// Every entry visited, some failed
    CompletedWithErrors,
    /// Stopped early by a cancel request
    Cancelled,
}

/// Type alias for progress callback
pub type ProgressCallback = Box<dyn Fn(CascadeProgress) + Send + Sync>;

/// Shared flag asking a running cascade to stop after the current entry
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// An entry the cascade could not re-encrypt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFailure {
    pub path: StorePath,
    pub reason: String,
}

/// What a cascade run did to each entry
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub folder: StorePath,
    pub recipients: RecipientSet,
    pub reencrypted: Vec<StorePath>,
    pub unchanged: Vec<StorePath>,
    pub failed: Vec<CascadeFailure>,
    /// Entries left untouched because the run was cancelled
    pub not_visited: Vec<StorePath>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CascadeReport {
    /// Every entry now matches its recipients
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn total_entries(&self) -> usize {
        self.reencrypted.len() + self.unchanged.len() + self.failed.len() + self.not_visited.len()
    }
}

enum EntryResult {
    Reencrypted,
    Unchanged,
}

/// One cascade run over a store
pub struct ReEncryptionCascade<'a> {
    root: &'a Path,
    gateway: &'a dyn EncryptionGateway,
    resolver: &'a RecipientResolver,
    skip_current: bool,
    cancel: Option<&'a CancelToken>,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> ReEncryptionCascade<'a> {
    pub fn new(
        root: &'a Path,
        gateway: &'a dyn EncryptionGateway,
        resolver: &'a RecipientResolver,
    ) -> Self {
        Self {
            root,
            gateway,
            resolver,
            skip_current: true,
            cancel: None,
            progress: None,
        }
    }

    /// Skip entries that already match their recipients
    pub fn with_skip_current(mut self, skip: bool) -> Self {
        self.skip_current = skip;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, callback: Option<&'a ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Re-encrypt every entry below `folder` for `recipients`
    ///
    /// Entries below a nested declaration are re-encrypted for that
    /// declaration instead. Per-entry failures land in the report; only a
    /// failure to enumerate the folder is returned as an error.
    pub fn reencrypt(&self, folder: &StorePath, recipients: &RecipientSet) -> Result<CascadeReport> {
        let mut progress = CascadeProgress::new(folder.clone(), 0);
        progress.phase = CascadePhase::Scanning;
        self.notify(&progress);

        let entries = collect_entries(self.root, folder)?;
        self.run(folder, entries, recipients, progress)
    }

    /// Re-encrypt a single entry for `recipients`
    pub fn reencrypt_entry(&self, entry: &StorePath, recipients: &RecipientSet) -> Result<CascadeReport> {
        let scope = entry.parent().unwrap_or_default();
        let progress = CascadeProgress::new(entry.clone(), 0);
        self.run(&scope, vec![entry.clone()], recipients, progress)
    }

    fn run(
        &self,
        scope: &StorePath,
        entries: Vec<StorePath>,
        recipients: &RecipientSet,
        mut progress: CascadeProgress,
    ) -> Result<CascadeReport> {
        let started_at = Utc::now();
        info!(
            "Re-encrypting {} entries under {} for [{}]",
            entries.len(),
            scope,
            recipients
        );

        let mut report = CascadeReport {
            folder: progress.folder.clone(),
            recipients: recipients.clone(),
            reencrypted: Vec::new(),
            unchanged: Vec::new(),
            failed: Vec::new(),
            not_visited: Vec::new(),
            cancelled: false,
            started_at,
            finished_at: started_at,
        };

        progress.total_entries = entries.len();
        progress.phase = CascadePhase::Processing;
        self.notify(&progress);

        // Target recipients per directory, resolved once
        let mut targets: HashMap<StorePath, std::result::Result<RecipientSet, String>> = HashMap::new();

        let mut remaining = entries.into_iter();
        while let Some(entry) = remaining.next() {
            if self.cancel.is_some_and(CancelToken::is_cancelled) {
                warn!("Cascade under {} cancelled", scope);
                report.cancelled = true;
                report.not_visited.push(entry);
                report.not_visited.extend(remaining.by_ref());
                break;
            }

            let dir = entry.parent().unwrap_or_default();
            let target = targets
                .entry(dir.clone())
                .or_insert_with(|| self.target_for(&dir, scope, recipients))
                .clone();

            let result = match target {
                Ok(target) => self.process_entry(&entry, &target),
                Err(reason) => Err(reason),
            };

            progress.processed_entries += 1;
            match result {
                Ok(EntryResult::Reencrypted) => {
                    debug!("Re-encrypted {}", entry);
                    progress.reencrypted_entries += 1;
                    report.reencrypted.push(entry);
                }
                Ok(EntryResult::Unchanged) => {
                    debug!("{} already matches its recipients", entry);
                    progress.unchanged_entries += 1;
                    report.unchanged.push(entry);
                }
                Err(reason) => {
                    error!("Failed to re-encrypt {}: {}", entry, reason);
                    progress.failed_entries += 1;
                    report.failed.push(CascadeFailure {
                        path: entry,
                        reason,
                    });
                }
            }
            self.notify(&progress);
        }

        progress.phase = if report.cancelled {
            CascadePhase::Cancelled
        } else if report.failed.is_empty() {
            CascadePhase::Completed
        } else {
            CascadePhase::CompletedWithErrors
        };
        self.notify(&progress);

        report.finished_at = Utc::now();
        info!(
            "Cascade under {} finished: {} re-encrypted, {} unchanged, {} failed, {} not visited",
            scope,
            report.reencrypted.len(),
            report.unchanged.len(),
            report.failed.len(),
            report.not_visited.len()
        );
        Ok(report)
    }

    fn target_for(
        &self,
        dir: &StorePath,
        scope: &StorePath,
        recipients: &RecipientSet,
    ) -> std::result::Result<RecipientSet, String> {
        match self.resolver.declaration_below(dir, scope) {
            Ok(Some(nested)) => Ok(nested.recipients),
            Ok(None) => Ok(recipients.clone()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn process_entry(
        &self,
        entry: &StorePath,
        target: &RecipientSet,
    ) -> std::result::Result<EntryResult, String> {
        let file = entry.entry_file(self.root);
        let ciphertext = std::fs::read(&file).map_err(|e| e.to_string())?;

        if self.skip_current {
            match self.gateway.is_encrypted_for(&ciphertext, target) {
                Ok(true) => return Ok(EntryResult::Unchanged),
                Ok(false) => {}
                Err(e) => debug!("Could not inspect recipients of {}: {}", entry, e),
            }
        }

        let plaintext = self.gateway.decrypt(&ciphertext).map_err(|e| e.to_string())?;
        let reencrypted = self
            .gateway
            .encrypt(&plaintext, target)
            .map_err(|e| e.to_string())?;
        write_atomic(&file, &reencrypted).map_err(|e| e.to_string())?;
        Ok(EntryResult::Reencrypted)
    }

    fn notify(&self, progress: &CascadeProgress) {
        if let Some(cb) = self.progress {
            cb(progress.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryGateway;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;

    fn path(s: &str) -> StorePath {
        StorePath::from_segments(s.split('/').filter(|p| !p.is_empty()).map(String::from).collect())
    }

    struct Fixture {
        dir: tempfile::TempDir,
        gateway: Arc<MemoryGateway>,
        resolver: RecipientResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let gateway = Arc::new(MemoryGateway::new(&["K1", "K2", "K3"], &["K1", "K2", "K3"]));
            let resolver = RecipientResolver::new(dir.path(), gateway.clone());
            fs::write(dir.path().join(".gpg-id"), "K1\n").unwrap();
            Fixture {
                dir,
                gateway,
                resolver,
            }
        }

        fn add(&self, rel: &str, recipients: &[&str]) {
            let file = path(rel).entry_file(self.dir.path());
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            let ct = self
                .gateway
                .encrypt(rel.as_bytes(), &RecipientSet::from_ids(recipients))
                .unwrap();
            fs::write(file, ct).unwrap();
        }

        fn recipients_of(&self, rel: &str) -> RecipientSet {
            let ct = fs::read(path(rel).entry_file(self.dir.path())).unwrap();
            MemoryGateway::recipients_of(&ct).unwrap()
        }

        fn cascade(&self) -> ReEncryptionCascade<'_> {
            ReEncryptionCascade::new(self.dir.path(), self.gateway.as_ref(), &self.resolver)
        }
    }

    #[test]
    fn test_reencrypts_whole_subtree() {
        let f = Fixture::new();
        f.add("a", &["K1"]);
        f.add("b/c", &["K1"]);
        let target = RecipientSet::from_ids(["K1", "K2"]);

        let report = f.cascade().reencrypt(&StorePath::root(), &target).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.reencrypted, vec![path("a"), path("b/c")]);
        assert_eq!(f.recipients_of("a"), target);
        assert_eq!(f.recipients_of("b/c"), target);

        // A second run has nothing to do
        let report = f.cascade().reencrypt(&StorePath::root(), &target).unwrap();
        assert!(report.reencrypted.is_empty());
        assert_eq!(report.unchanged.len(), 2);
    }

    #[test]
    fn test_nested_declaration_keeps_its_recipients() {
        let f = Fixture::new();
        fs::create_dir_all(f.dir.path().join("team/inner")).unwrap();
        fs::write(f.dir.path().join("team/inner/.gpg-id"), "K3\n").unwrap();
        f.add("team/x", &["K1"]);
        f.add("team/inner/y", &["K1"]);

        let target = RecipientSet::from_ids(["K2"]);
        let report = f.cascade().reencrypt(&path("team"), &target).unwrap();
        assert!(report.is_complete());
        assert_eq!(f.recipients_of("team/x"), target);
        assert_eq!(f.recipients_of("team/inner/y"), RecipientSet::from_ids(["K3"]));
    }

    #[test]
    fn test_failures_do_not_stop_the_walk() {
        let f = Fixture::new();
        f.add("a", &["K1"]);
        fs::write(path("b").entry_file(f.dir.path()), b"garbage").unwrap();
        f.add("c", &["K1"]);

        let target = RecipientSet::from_ids(["K2"]);
        let report = f.cascade().reencrypt(&StorePath::root(), &target).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.reencrypted, vec![path("a"), path("c")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, path("b"));
        // Untouched on failure
        assert_eq!(fs::read(path("b").entry_file(f.dir.path())).unwrap(), b"garbage");
    }

    #[test]
    fn test_cancel_leaves_remaining_entries() {
        let f = Fixture::new();
        f.add("a", &["K1"]);
        f.add("b", &["K1"]);

        let token = CancelToken::new();
        token.cancel();
        let report = f
            .cascade()
            .with_cancel(&token)
            .reencrypt(&StorePath::root(), &RecipientSet::from_ids(["K2"]))
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.not_visited, vec![path("a"), path("b")]);
        assert_eq!(f.recipients_of("a"), RecipientSet::from_ids(["K1"]));
    }

    #[test]
    fn test_progress_reports_every_entry() {
        let f = Fixture::new();
        f.add("a", &["K1"]);
        f.add("b", &["K1"]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Box::new(move |p| sink.lock().push(p));
        let report = f
            .cascade()
            .with_progress(Some(&callback))
            .reencrypt(&StorePath::root(), &RecipientSet::from_ids(["K2"]))
            .unwrap();
        assert_eq!(report.total_entries(), 2);

        let seen = seen.lock();
        let last = seen.last().unwrap();
        assert_eq!(last.phase, CascadePhase::Completed);
        assert_eq!(last.processed_entries, 2);
        assert_eq!(last.progress_percent(), 100);
        assert!(seen.iter().any(|p| p.phase == CascadePhase::Scanning));
    }

    #[test]
    fn test_single_entry() {
        let f = Fixture::new();
        f.add("dir/one", &["K1"]);
        f.add("dir/two", &["K1"]);

        let report = f
            .cascade()
            .reencrypt_entry(&path("dir/one"), &RecipientSet::from_ids(["K3"]))
            .unwrap();
        assert_eq!(report.reencrypted, vec![path("dir/one")]);
        assert_eq!(f.recipients_of("dir/two"), RecipientSet::from_ids(["K1"]));
    }
}
