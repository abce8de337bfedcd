//! Version control gateway
//!
//! Version control is bookkeeping, not a transaction boundary: the engine
//! reports gateway failures as warnings and never undoes a store mutation
//! because a commit or push failed.

mod git;

pub use git::GitCli;

use crate::error::GitError;

/// External stage/commit/push/pull capability
///
/// Every operation is optional; the defaults report `Unsupported`.
#[allow(unused_variables)]
pub trait VersionControlGateway: Send + Sync {
    /// Create the repository if it does not exist yet
    fn init(&self) -> Result<(), GitError> {
        Err(GitError::Unsupported("init".to_string()))
    }

    /// Stage every change in the working tree, deletions included
    fn stage_all(&self) -> Result<(), GitError> {
        Err(GitError::Unsupported("stage".to_string()))
    }

    /// Commit staged changes; an empty commit is not an error
    fn commit(&self, message: &str) -> Result<(), GitError> {
        Err(GitError::Unsupported("commit".to_string()))
    }

    fn push(&self) -> Result<(), GitError> {
        Err(GitError::Unsupported("push".to_string()))
    }

    fn pull(&self) -> Result<(), GitError> {
        Err(GitError::Unsupported("pull".to_string()))
    }
}

impl<T: VersionControlGateway + ?Sized> VersionControlGateway for std::sync::Arc<T> {
    fn init(&self) -> Result<(), GitError> {
        (**self).init()
    }

    fn stage_all(&self) -> Result<(), GitError> {
        (**self).stage_all()
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        (**self).commit(message)
    }

    fn push(&self) -> Result<(), GitError> {
        (**self).push()
    }

    fn pull(&self) -> Result<(), GitError> {
        (**self).pull()
    }
}
