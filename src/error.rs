//! Error types for pass-engine
//!
//! Path and structural errors are raised before the store is touched.
//! Encryption and version-control errors come from the external gateways.

use std::fmt;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pass-engine
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Recipient(#[from] RecipientError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which argument of an operation a path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    Source,
    Destination,
}

impl fmt::Display for PathRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRole::Source => f.write_str("source"),
            PathRole::Destination => f.write_str("destination"),
        }
    }
}

/// Path validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("You passed an empty {0}")]
    Empty(PathRole),

    #[error("Path \"{raw}\" escapes the password store (resolves to \"{resolved}\")")]
    Escape { raw: String, resolved: String },

    #[error("\"{path}\" is not in the password store")]
    NotInStore { path: String },

    #[error("Invalid path \"{path}\": {reason}")]
    Invalid { path: String, reason: String },
}

/// Recipient resolution failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecipientError {
    #[error("No recipients declared for \"{folder}\": .gpg-id file missing or invalid")]
    Missing { folder: String },

    #[error("The recipient declaration of the store root can not be removed")]
    RootDeclaration,
}

/// Store structure violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("\"{path}\" already exists")]
    AlreadyExists { path: String, can_force: bool },

    #[error("\"{path}\" is not empty")]
    NotEmpty { path: String },

    #[error("Can not rename \"{from}\" to \"{to}\" across directories, use move instead")]
    CrossDirectoryRename { from: String, to: String },

    #[error("Can not move or copy \"{path}\" into itself (\"{dest}\")")]
    IntoItself { path: String, dest: String },

    #[error("Can not {operation} the store root")]
    StoreRoot { operation: String },
}

/// Failures reported by the encryption gateway
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("No usable key: {0}")]
    NoUsableKey(String),

    #[error("Encryption failed: {0}")]
    Failed(String),

    #[error("{program} exited with status {status}: {stderr}")]
    Tool {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the version control gateway
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Version control does not support {0}")]
    Unsupported(String),

    #[error("{program} {operation} exited with status {status}: {stderr}")]
    Tool {
        program: String,
        operation: String,
        status: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io(err.error)
    }
}

impl Error {
    /// Whether the operation could succeed if retried with the force flag
    pub fn can_force(&self) -> bool {
        matches!(
            self,
            Error::Structural(StructuralError::AlreadyExists { can_force: true, .. })
        )
    }
}
