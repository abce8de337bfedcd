//! Store engine: every user-facing store operation
//!
//! Operations validate all paths first, then mutate the filesystem, then
//! notify version control. Mutations are serialized by a single writer lock;
//! reads may run concurrently with each other.

use super::cascade::{CancelToken, CascadeReport, ProgressCallback, ReEncryptionCascade};
use super::path::{NodeKind, PathValidator, StorePath};
use super::recipients::{RecipientResolver, Resolved};
use super::tree::{
    collect_tree, copy_tree_replacing, is_empty_folder, prune_empty_parents, replace_dir,
    write_atomic,
};
use crate::config::Config;
use crate::crypto::{EncryptionGateway, GpgGateway, Plaintext, RecipientSet};
use crate::error::{
    Error, GitError, PathError, PathRole, RecipientError, Result, StructuralError,
};
use crate::vcs::{GitCli, VersionControlGateway};
use parking_lot::RwLock;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A problem that did not stop an operation
#[derive(Debug)]
pub enum Warning {
    /// Recipients were declared but none has a local secret key
    NoUsableKey {
        folder: StorePath,
        recipients: RecipientSet,
    },
    /// The store changed but version control could not record it
    VersionControl {
        operation: &'static str,
        error: GitError,
    },
    /// A moved or copied node kept its old encryption because no
    /// recipients could be resolved at its new location
    NotReencrypted { path: StorePath, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NoUsableKey { folder, recipients } => write!(
                f,
                "none of [{}] declared for {} has a local secret key",
                recipients, folder
            ),
            Warning::VersionControl { operation, error } => {
                write!(f, "version control {} failed: {}", operation, error)
            }
            Warning::NotReencrypted { path, reason } => {
                write!(f, "{} was not re-encrypted: {}", path, reason)
            }
        }
    }
}

/// Result of a successful mutation
#[derive(Debug, Default)]
pub struct Outcome {
    /// Paths created or rewritten
    pub changed: Vec<StorePath>,
    pub warnings: Vec<Warning>,
    /// Present when the operation re-encrypted entries
    pub cascade: Option<CascadeReport>,
}

impl Outcome {
    fn with_change(path: StorePath) -> Self {
        Outcome {
            changed: vec![path],
            ..Default::default()
        }
    }
}

/// One line of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub path: StorePath,
    pub kind: NodeKind,
}

/// Behavior switches for the engine
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Push after every commit
    pub auto_push: bool,
    /// Pull before recipient changes and re-encryption
    pub auto_pull: bool,
    /// Let the cascade skip entries already encrypted correctly
    pub skip_current: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            auto_push: false,
            auto_pull: false,
            skip_current: true,
        }
    }
}

/// The password store engine
pub struct StoreEngine {
    root: PathBuf,
    validator: PathValidator,
    resolver: RecipientResolver,
    gateway: Arc<dyn EncryptionGateway>,
    vcs: Option<Box<dyn VersionControlGateway>>,
    options: EngineOptions,
    lock: RwLock<()>,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
}

impl StoreEngine {
    /// Create an engine for the store at `root`, which need not exist yet
    pub fn new(root: impl Into<PathBuf>, gateway: Arc<dyn EncryptionGateway>) -> Result<Self> {
        let validator = PathValidator::new(root)?;
        let root = validator.root().to_path_buf();
        let resolver = RecipientResolver::new(&root, gateway.clone());
        Ok(StoreEngine {
            root,
            validator,
            resolver,
            gateway,
            vcs: None,
            options: EngineOptions::default(),
            lock: RwLock::new(()),
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    /// Build the gpg and git backed engine described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let gateway: Arc<dyn EncryptionGateway> = Arc::new(GpgGateway::new(&config.gpg));
        let mut engine = Self::new(&config.store.root, gateway)?.with_options(EngineOptions {
            auto_push: config.git.auto_push,
            auto_pull: config.git.auto_pull,
            skip_current: config.cascade.skip_current,
        });
        if config.git.enabled {
            let git = GitCli::new(&config.git, engine.root.clone());
            engine = engine.with_version_control(Box::new(git));
        }
        Ok(engine)
    }

    pub fn with_version_control(mut self, vcs: Box<dyn VersionControlGateway>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Receive progress of every cascade the engine runs
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Token that stops a running cascade after its current entry
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Create the store, declare its root recipients and initialize version control
    pub fn init(&self, recipients: &RecipientSet) -> Result<Outcome> {
        let _guard = self.lock.write();
        self.cancel.reset();
        fs::create_dir_all(&self.root)?;

        let mut outcome = Outcome::default();
        if let Some(vcs) = &self.vcs {
            if let Err(e) = vcs.init() {
                warn!("Could not initialize version control: {}", e);
                outcome.warnings.push(Warning::VersionControl {
                    operation: "init",
                    error: e,
                });
            }
        }

        let root = StorePath::root();
        self.apply_recipients(&root, recipients, &mut outcome)?;
        self.record(&mut outcome, &format!("Set GPG id to {}.", recipients));
        Ok(outcome)
    }

    /// Encrypt `plaintext` as a new entry for the recipients effective at its folder
    pub fn add_entry(&self, raw: &str, plaintext: &[u8], force: bool) -> Result<Outcome> {
        let _guard = self.lock.write();
        let path = self.validator.validate(raw, PathRole::Source)?;
        let parent = entry_parent(&path, "add an entry at")?;
        self.validator.check_destination(raw, &path.entry_file(&self.root))?;

        if path.folder_dir(&self.root).is_dir() && !path.entry_file(&self.root).exists() {
            // The name is taken by a folder; an entry would shadow it
            return Err(StructuralError::AlreadyExists {
                path: path.to_string(),
                can_force: false,
            }
            .into());
        }
        if path.entry_file(&self.root).exists() && !force {
            return Err(StructuralError::AlreadyExists {
                path: path.to_string(),
                can_force: true,
            }
            .into());
        }

        let resolved = self.resolver.effective_recipients(&parent)?;
        let ciphertext = self.gateway.encrypt(plaintext, &resolved.recipients)?;
        write_atomic(&path.entry_file(&self.root), &ciphertext)?;
        info!("Added {} for [{}]", path, resolved.recipients);

        let mut outcome = Outcome::with_change(path.clone());
        self.record(&mut outcome, &format!("Add given password for {} to store.", path));
        Ok(outcome)
    }

    /// Replace the content of an existing entry
    pub fn edit_entry(&self, raw: &str, plaintext: &[u8]) -> Result<Outcome> {
        let _guard = self.lock.write();
        let path = self.existing_entry(raw)?;
        let parent = entry_parent(&path, "edit")?;

        let resolved = self.resolver.effective_recipients(&parent)?;
        let ciphertext = self.gateway.encrypt(plaintext, &resolved.recipients)?;
        write_atomic(&path.entry_file(&self.root), &ciphertext)?;
        info!("Edited {}", path);

        let mut outcome = Outcome::with_change(path.clone());
        self.record(&mut outcome, &format!("Edit password for {}.", path));
        Ok(outcome)
    }

    /// Decrypt an entry
    pub fn show_entry(&self, raw: &str) -> Result<Plaintext> {
        let _guard = self.lock.read();
        let path = self.existing_entry(raw)?;
        let ciphertext = fs::read(path.entry_file(&self.root))?;
        Ok(self.gateway.decrypt(&ciphertext)?)
    }

    /// Everything below a folder (the root when `raw` is `None`), sorted
    pub fn list(&self, raw: Option<&str>) -> Result<Vec<ListItem>> {
        let _guard = self.lock.read();
        let folder = match raw {
            None => StorePath::root(),
            Some(raw) => {
                let path = self.validator.validate(raw, PathRole::Source)?;
                if self.validator.locate(&path, true) != Some(NodeKind::Folder) {
                    return Err(PathError::NotInStore {
                        path: raw.trim().to_string(),
                    }
                    .into());
                }
                path
            }
        };
        Ok(collect_tree(&self.root, &folder)?
            .into_iter()
            .map(|(path, kind)| ListItem { path, kind })
            .collect())
    }

    /// Recipients that apply at a folder, or at an entry's folder
    pub fn effective_recipients(&self, raw: &str) -> Result<Resolved> {
        let _guard = self.lock.read();
        let path = self.validator.validate(raw, PathRole::Source)?;
        let folder = match self.validator.locate(&path, PathValidator::is_folder_directed(raw)) {
            Some(NodeKind::Entry) => path.parent().unwrap_or_default(),
            _ => path,
        };
        self.resolver.effective_recipients(&folder)
    }

    pub fn delete_entry(&self, raw: &str) -> Result<Outcome> {
        let _guard = self.lock.write();
        let path = self.existing_entry(raw)?;
        fs::remove_file(path.entry_file(&self.root))?;
        if let Some(parent) = path.parent() {
            prune_empty_parents(&self.root, &parent)?;
        }
        info!("Removed {}", path);

        let mut outcome = Outcome::with_change(path.clone());
        self.record(&mut outcome, &format!("Remove {} from store.", path));
        Ok(outcome)
    }

    /// Delete a folder; without `recursive` it must hold nothing but its declaration
    pub fn delete_folder(&self, raw: &str, recursive: bool) -> Result<Outcome> {
        let _guard = self.lock.write();
        let path = self.validator.validate(raw, PathRole::Source)?;
        if path.is_root() {
            return Err(StructuralError::StoreRoot {
                operation: "delete".to_string(),
            }
            .into());
        }
        let folder_raw = format!("{}/", path);
        let (path, _) = self.validator.validate_existing(&folder_raw, PathRole::Source)?;

        let dir = path.folder_dir(&self.root);
        if !recursive && !is_empty_folder(&dir)? {
            return Err(StructuralError::NotEmpty {
                path: path.to_string(),
            }
            .into());
        }
        fs::remove_dir_all(&dir)?;
        if let Some(parent) = path.parent() {
            prune_empty_parents(&self.root, &parent)?;
        }
        info!("Removed folder {}", path);

        let mut outcome = Outcome::with_change(path.clone());
        self.record(&mut outcome, &format!("Remove {} from store.", path));
        Ok(outcome)
    }

    /// Rename an entry or folder within its parent folder
    pub fn rename(&self, raw: &str, new_name: &str, force: bool) -> Result<Outcome> {
        let _guard = self.lock.write();
        let (source, kind) = self.validator.validate_existing(raw, PathRole::Source)?;
        let parent = source.parent().ok_or_else(|| StructuralError::StoreRoot {
            operation: "rename".to_string(),
        })?;

        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty(PathRole::Destination).into());
        }
        let dest = if trimmed.contains('/') || parent.is_root() {
            self.validator.validate(trimmed, PathRole::Destination)?
        } else {
            let joined = format!("{}/{}", parent, trimmed);
            self.validator.validate(&joined, PathRole::Destination)?
        };
        if dest.is_root() || dest.parent().as_ref() != Some(&parent) {
            return Err(StructuralError::CrossDirectoryRename {
                from: source.to_string(),
                to: dest.to_string(),
            }
            .into());
        }
        if dest == source {
            return Ok(Outcome::default());
        }

        let to = self.node_location(&dest, kind);
        self.validator.check_destination(new_name, &to)?;
        self.check_target(&dest, kind, force)?;
        self.transfer(&self.node_location(&source, kind), &to, kind)?;
        info!("Renamed {} to {}", source, dest);

        let mut outcome = Outcome::with_change(dest.clone());
        self.record(&mut outcome, &format!("Rename {} to {}.", source, dest));
        Ok(outcome)
    }

    /// Move an entry or folder, re-encrypting when its recipients change
    pub fn move_path(&self, src: &str, dest: &str, force: bool) -> Result<Outcome> {
        let _guard = self.lock.write();
        self.cancel.reset();
        let (source, kind) = self.validator.validate_existing(src, PathRole::Source)?;
        if source.is_root() {
            return Err(StructuralError::StoreRoot {
                operation: "move".to_string(),
            }
            .into());
        }
        let target = self.transfer_target(&source, kind, dest)?;
        let to = self.node_location(&target, kind);
        self.validator.check_destination(dest, &to)?;
        self.check_target(&target, kind, force)?;

        let before = self.scope_recipients(&source, kind);
        self.transfer(&self.node_location(&source, kind), &to, kind)?;
        if let Some(parent) = source.parent() {
            prune_empty_parents(&self.root, &parent)?;
        }
        info!("Moved {} to {}", source, target);

        let mut outcome = Outcome::with_change(target.clone());
        self.cascade_if_changed(&target, kind, before, &mut outcome)?;
        self.record(&mut outcome, &format!("Rename {} to {}.", source, target));
        Ok(outcome)
    }

    /// Copy an entry or folder, re-encrypting the copy when recipients differ
    pub fn copy_path(&self, src: &str, dest: &str, force: bool) -> Result<Outcome> {
        let _guard = self.lock.write();
        self.cancel.reset();
        let (source, kind) = self.validator.validate_existing(src, PathRole::Source)?;
        if source.is_root() {
            return Err(StructuralError::StoreRoot {
                operation: "copy".to_string(),
            }
            .into());
        }
        let target = self.transfer_target(&source, kind, dest)?;
        let to = self.node_location(&target, kind);
        self.validator.check_destination(dest, &to)?;
        self.check_target(&target, kind, force)?;

        let before = self.scope_recipients(&source, kind);
        let mut outcome = Outcome::with_change(target.clone());
        match kind {
            NodeKind::Entry => {
                let after = self
                    .resolver
                    .effective_recipients(&target.parent().unwrap_or_default())
                    .ok()
                    .filter(|after| {
                        before
                            .as_ref()
                            .map_or(true, |b| b.recipients != after.recipients)
                    });
                let ciphertext = fs::read(source.entry_file(&self.root))?;
                // The copy never lands on disk under the old recipients, and
                // an existing target stays until the new ciphertext is ready
                let copy = match after {
                    Some(after) => {
                        let plaintext = self.gateway.decrypt(&ciphertext)?;
                        let copy = self.gateway.encrypt(&plaintext, &after.recipients)?;
                        debug!("Re-encrypted copy of {} for [{}]", source, after.recipients);
                        copy
                    }
                    None => ciphertext,
                };
                write_atomic(&to, &copy)?;
            }
            NodeKind::Folder => {
                copy_tree_replacing(&source.folder_dir(&self.root), &to)?;
                self.cascade_if_changed(&target, kind, before, &mut outcome)?;
            }
        }
        info!("Copied {} to {}", source, target);

        self.record(&mut outcome, &format!("Copy {} to {}.", source, target));
        Ok(outcome)
    }

    /// Declare recipients for a folder and re-encrypt everything below it
    pub fn set_recipients(&self, raw: &str, recipients: &RecipientSet) -> Result<Outcome> {
        let _guard = self.lock.write();
        self.cancel.reset();
        let folder = self.folder_path(raw)?;

        let mut outcome = Outcome::default();
        self.pull_first(&mut outcome);
        self.apply_recipients(&folder, recipients, &mut outcome)?;
        self.record(
            &mut outcome,
            &format!("Set GPG id to {} ({}).", recipients, folder),
        );
        Ok(outcome)
    }

    /// Remove a folder's own declaration so it inherits again
    pub fn clear_recipients(&self, raw: &str) -> Result<Outcome> {
        let _guard = self.lock.write();
        self.cancel.reset();
        let folder = self.folder_path(raw)?;
        let parent = folder
            .parent()
            .ok_or(Error::Recipient(RecipientError::RootDeclaration))?;

        // Resolve before touching anything
        let inherited = self.resolver.effective_recipients(&parent)?;

        let mut outcome = Outcome::default();
        self.pull_first(&mut outcome);
        if !self.resolver.remove_declaration(&folder)? {
            return Ok(outcome);
        }
        outcome.changed.push(folder.clone());

        let report = self
            .cascade()
            .reencrypt(&folder, &inherited.recipients)?;
        outcome.cascade = Some(report);
        self.record(
            &mut outcome,
            &format!("Remove GPG id of {}, inheriting {}.", folder, inherited.recipients),
        );
        Ok(outcome)
    }

    /// Re-run the cascade over a folder with its effective recipients
    ///
    /// Safe to repeat: entries already encrypted correctly are skipped.
    pub fn reencrypt(&self, raw: &str) -> Result<Outcome> {
        let _guard = self.lock.write();
        self.cancel.reset();
        let folder = self.folder_path(raw)?;

        let mut outcome = Outcome::default();
        self.pull_first(&mut outcome);
        let resolved = self.resolver.effective_recipients(&folder)?;
        let report = self.cascade().reencrypt(&folder, &resolved.recipients)?;
        let any = !report.reencrypted.is_empty();
        outcome.changed.extend(report.reencrypted.iter().cloned());
        outcome.cascade = Some(report);
        if any {
            self.record(
                &mut outcome,
                &format!(
                    "Reencrypt password store using new GPG id {} ({}).",
                    resolved.recipients, folder
                ),
            );
        }
        Ok(outcome)
    }

    /// Fetch and merge remote changes
    pub fn pull(&self) -> Result<()> {
        let _guard = self.lock.write();
        Ok(self.vcs()?.pull()?)
    }

    pub fn push(&self) -> Result<()> {
        let _guard = self.lock.read();
        Ok(self.vcs()?.push()?)
    }

    fn vcs(&self) -> Result<&dyn VersionControlGateway> {
        self.vcs
            .as_deref()
            .ok_or_else(|| GitError::Unsupported("a store without version control".to_string()).into())
    }

    fn cascade(&self) -> ReEncryptionCascade<'_> {
        ReEncryptionCascade::new(&self.root, self.gateway.as_ref(), &self.resolver)
            .with_skip_current(self.options.skip_current)
            .with_cancel(&self.cancel)
            .with_progress(self.progress.as_ref())
    }

    /// Declare then cascade; the caller holds the write lock
    fn apply_recipients(
        &self,
        folder: &StorePath,
        recipients: &RecipientSet,
        outcome: &mut Outcome,
    ) -> Result<()> {
        let declared = self.resolver.declare(folder, recipients)?;
        outcome.changed.push(folder.clone());
        if let Some(warning) = declared.warning {
            outcome.warnings.push(warning);
        }
        let report = self.cascade().reencrypt(folder, recipients)?;
        outcome.cascade = Some(report);
        Ok(())
    }

    /// Re-encrypt a moved or copied node if its recipients are now different
    fn cascade_if_changed(
        &self,
        target: &StorePath,
        kind: NodeKind,
        before: Option<Resolved>,
        outcome: &mut Outcome,
    ) -> Result<()> {
        let scope = match kind {
            NodeKind::Entry => target.parent().unwrap_or_default(),
            NodeKind::Folder => target.clone(),
        };
        let after = match self.resolver.effective_recipients(&scope) {
            Ok(after) => after,
            Err(e) => {
                warn!("Not re-encrypting {}: {}", target, e);
                outcome.warnings.push(Warning::NotReencrypted {
                    path: target.clone(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };
        if before.is_some_and(|b| b.recipients == after.recipients) {
            return Ok(());
        }
        info!("Recipients of {} changed to [{}]", target, after.recipients);
        let cascade = self.cascade();
        let report = match kind {
            NodeKind::Entry => cascade.reencrypt_entry(target, &after.recipients)?,
            NodeKind::Folder => cascade.reencrypt(target, &after.recipients)?,
        };
        outcome.cascade = Some(report);
        Ok(())
    }

    /// Effective recipients of a node before it moves, if any apply
    fn scope_recipients(&self, path: &StorePath, kind: NodeKind) -> Option<Resolved> {
        let scope = match kind {
            NodeKind::Entry => path.parent().unwrap_or_default(),
            NodeKind::Folder => path.clone(),
        };
        self.resolver.effective_recipients(&scope).ok()
    }

    /// Where a moved or copied node lands
    ///
    /// An existing folder, the root, or a path ending in `/` receives the
    /// source under its own name; anything else is the new path itself.
    fn transfer_target(&self, source: &StorePath, kind: NodeKind, raw_dest: &str) -> Result<StorePath> {
        let dest = self.validator.validate(raw_dest, PathRole::Destination)?;
        let into_folder = dest.is_root()
            || PathValidator::is_folder_directed(raw_dest)
            || dest.folder_dir(&self.root).is_dir();
        let target = match (into_folder, source.name()) {
            (true, Some(name)) => dest.join(name),
            _ => dest,
        };

        if target == *source || (kind == NodeKind::Folder && target.starts_with(source)) {
            return Err(StructuralError::IntoItself {
                path: source.to_string(),
                dest: target.to_string(),
            }
            .into());
        }
        Ok(target)
    }

    /// Refuse to overwrite unless forced; nothing is removed here
    fn check_target(&self, target: &StorePath, kind: NodeKind, force: bool) -> Result<()> {
        if !self.node_location(target, kind).exists() {
            return Ok(());
        }
        if !force {
            return Err(StructuralError::AlreadyExists {
                path: target.to_string(),
                can_force: true,
            }
            .into());
        }
        debug!("Overwriting {}", target);
        Ok(())
    }

    /// Rename a node onto `to`, replacing anything already there
    fn transfer(&self, from: &Path, to: &Path, kind: NodeKind) -> Result<()> {
        match kind {
            NodeKind::Entry => {
                if let Some(dir) = to.parent() {
                    fs::create_dir_all(dir)?;
                }
                fs::rename(from, to)?;
            }
            NodeKind::Folder => replace_dir(from, to)?,
        }
        Ok(())
    }

    fn node_location(&self, path: &StorePath, kind: NodeKind) -> PathBuf {
        match kind {
            NodeKind::Entry => path.entry_file(&self.root),
            NodeKind::Folder => path.folder_dir(&self.root),
        }
    }

    fn existing_entry(&self, raw: &str) -> Result<StorePath> {
        let (path, kind) = self.validator.validate_existing(raw, PathRole::Source)?;
        if kind != NodeKind::Entry {
            return Err(PathError::NotInStore {
                path: raw.trim().to_string(),
            }
            .into());
        }
        Ok(path)
    }

    /// A path addressing a folder; it may not exist yet but must not be an entry
    fn folder_path(&self, raw: &str) -> Result<StorePath> {
        let path = self.validator.validate(raw, PathRole::Source)?;
        if !path.is_root()
            && !path.folder_dir(&self.root).is_dir()
            && path.entry_file(&self.root).is_file()
        {
            return Err(PathError::Invalid {
                path: raw.trim().to_string(),
                reason: "is an entry, not a folder".to_string(),
            }
            .into());
        }
        self.validator.check_destination(raw, &path.folder_dir(&self.root))?;
        Ok(path)
    }

    fn pull_first(&self, outcome: &mut Outcome) {
        if !self.options.auto_pull {
            return;
        }
        if let Some(vcs) = &self.vcs {
            if let Err(e) = vcs.pull() {
                warn!("Pull failed, continuing with local state: {}", e);
                outcome.warnings.push(Warning::VersionControl {
                    operation: "pull",
                    error: e,
                });
            }
        }
    }

    /// Stage, commit and optionally push; failures become warnings
    fn record(&self, outcome: &mut Outcome, message: &str) {
        let Some(vcs) = &self.vcs else {
            return;
        };
        if let Err(e) = vcs.stage_all() {
            warn!("Could not stage changes: {}", e);
            outcome.warnings.push(Warning::VersionControl {
                operation: "stage",
                error: e,
            });
            return;
        }
        if let Err(e) = vcs.commit(message) {
            warn!("Could not commit \"{}\": {}", message, e);
            outcome.warnings.push(Warning::VersionControl {
                operation: "commit",
                error: e,
            });
            return;
        }
        debug!("Committed: {}", message);
        if self.options.auto_push {
            if let Err(e) = vcs.push() {
                warn!("Could not push: {}", e);
                outcome.warnings.push(Warning::VersionControl {
                    operation: "push",
                    error: e,
                });
            }
        }
    }
}

/// Folder holding an entry; the root itself is not an entry
fn entry_parent(path: &StorePath, operation: &str) -> Result<StorePath> {
    path.parent().ok_or_else(|| {
        StructuralError::StoreRoot {
            operation: operation.to_string(),
        }
        .into()
    })
}
