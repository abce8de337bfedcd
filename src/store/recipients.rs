//! Recipient resolution from `.gpg-id` declarations

use super::engine::Warning;
use super::path::StorePath;
use super::tree::write_atomic;
use crate::crypto::{EncryptionGateway, RecipientSet};
use crate::error::{Error, RecipientError, Result};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Effective recipients of a folder and where they were declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub declared_at: StorePath,
    pub recipients: RecipientSet,
}

/// Result of writing a declaration
#[derive(Debug)]
pub struct Declared {
    /// Whether the declaration file was newly created
    pub created: bool,
    pub warning: Option<Warning>,
}

/// Reads and writes folder recipient declarations
pub struct RecipientResolver {
    root: std::path::PathBuf,
    gateway: Arc<dyn EncryptionGateway>,
}

impl RecipientResolver {
    pub fn new(root: impl Into<std::path::PathBuf>, gateway: Arc<dyn EncryptionGateway>) -> Self {
        RecipientResolver {
            root: root.into(),
            gateway,
        }
    }

    /// The folder's own declaration, if it has one
    pub fn declaration(&self, folder: &StorePath) -> Result<Option<RecipientSet>> {
        let file = folder.declaration_file(&self.root);
        match fs::read_to_string(&file) {
            Ok(content) => Ok(Some(RecipientSet::parse(&content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if file.is_dir() => {
                warn!("Ignoring directory in place of declaration {:?}: {}", file, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk from `folder` toward the root; the nearest declaration wins
    ///
    /// An empty nearest declaration does not fall through to an outer one.
    pub fn effective_recipients(&self, folder: &StorePath) -> Result<Resolved> {
        for ancestor in folder.ancestors() {
            if let Some(recipients) = self.declaration(&ancestor)? {
                if recipients.is_empty() {
                    return Err(RecipientError::Missing {
                        folder: ancestor.to_string(),
                    }
                    .into());
                }
                return Ok(Resolved {
                    declared_at: ancestor,
                    recipients,
                });
            }
        }
        Err(RecipientError::Missing {
            folder: folder.to_string(),
        }
        .into())
    }

    /// Nearest declaration for `folder` strictly below `scope`
    ///
    /// `None` means the folder inherits whatever applies at `scope`.
    pub fn declaration_below(&self, folder: &StorePath, scope: &StorePath) -> Result<Option<Resolved>> {
        for ancestor in folder.ancestors() {
            if ancestor.depth() <= scope.depth() {
                break;
            }
            if let Some(recipients) = self.declaration(&ancestor)? {
                if recipients.is_empty() {
                    return Err(RecipientError::Missing {
                        folder: ancestor.to_string(),
                    }
                    .into());
                }
                return Ok(Some(Resolved {
                    declared_at: ancestor,
                    recipients,
                }));
            }
        }
        Ok(None)
    }

    /// Write `recipients` as the folder's declaration, creating the folder
    ///
    /// Returns a warning, without failing, when no recipient has a locally
    /// available secret key.
    pub fn declare(&self, folder: &StorePath, recipients: &RecipientSet) -> Result<Declared> {
        if recipients.is_empty() {
            return Err(Error::Recipient(RecipientError::Missing {
                folder: folder.to_string(),
            }));
        }

        let keys = self.gateway.list_available_keys()?;
        let warning = if recipients.any_usable(&keys) {
            None
        } else {
            warn!(
                "None of [{}] has a local secret key; entries under {} will not be readable here",
                recipients, folder
            );
            Some(Warning::NoUsableKey {
                folder: folder.clone(),
                recipients: recipients.clone(),
            })
        };

        let file = folder.declaration_file(&self.root);
        let created = !file.exists();
        write_atomic(&file, recipients.to_file_contents().as_bytes())?;
        info!("Declared recipients [{}] for {}", recipients, folder);
        Ok(Declared { created, warning })
    }

    /// Delete the folder's own declaration; returns whether one existed
    pub fn remove_declaration(&self, folder: &StorePath) -> Result<bool> {
        if folder.is_root() {
            return Err(RecipientError::RootDeclaration.into());
        }
        let file = folder.declaration_file(&self.root);
        match fs::remove_file(&file) {
            Ok(()) => {
                info!("Removed recipient declaration of {}", folder);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} has no declaration to remove", folder);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
