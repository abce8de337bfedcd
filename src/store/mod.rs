//! Password store engine
//!
//! The store is a directory tree. Entries are `<name>.gpg` files; folders may
//! hold a `.gpg-id` declaration naming the recipients every entry below them
//! is encrypted for, until a deeper declaration takes over.

mod cascade;
mod engine;
mod path;
mod recipients;
mod tree;

pub use cascade::{
    CancelToken, CascadeFailure, CascadePhase, CascadeProgress, CascadeReport,
    ProgressCallback, ReEncryptionCascade,
};
pub use engine::{EngineOptions, ListItem, Outcome, StoreEngine, Warning};
pub use path::{NodeKind, PathValidator, StorePath};
pub use recipients::{Declared, RecipientResolver, Resolved};

/// Extension of encrypted entry files
pub const ENTRY_SUFFIX: &str = ".gpg";

/// Name of the per-folder recipient declaration file
pub const DECLARATION_FILE: &str = ".gpg-id";

/// Version control metadata directory, never part of the store's content
pub const VCS_DIR: &str = ".git";
