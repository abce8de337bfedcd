//! pass-engine - Native engine for `pass`-compatible password stores
//!
//! This library manages a directory tree of GPG-encrypted entries with
//! per-folder recipient declarations, re-encrypting subtrees whenever the
//! recipients that apply to them change. Encryption and version control are
//! delegated to external tools behind gateway traits.

pub mod config;
pub mod crypto;
pub mod error;
pub mod process;
pub mod store;
pub mod vcs;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use store::StoreEngine;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::{EncryptionGateway, RecipientSet};
    pub use crate::error::{Error, Result};
    pub use crate::store::{Outcome, StoreEngine, StorePath, Warning};
    pub use crate::vcs::VersionControlGateway;
}
