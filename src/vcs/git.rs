//! git executable backend

use super::VersionControlGateway;
use crate::config::GitConfig;
use crate::error::GitError;
use crate::process::{self, ProcessFailure, ProcessOutput};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Runs `git` inside the store root
pub struct GitCli {
    executable: PathBuf,
    repo: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(config: &GitConfig, repo: impl Into<PathBuf>) -> Self {
        GitCli {
            executable: config.executable.clone(),
            repo: repo.into(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn run(&self, operation: &str, args: &[&str]) -> Result<ProcessOutput, GitError> {
        debug!("git {} in {:?}", operation, self.repo);
        process::run(&self.executable, args, Some(&self.repo), None, self.timeout).map_err(|e| {
            match e {
                ProcessFailure::Io(err) => GitError::Io(err),
                ProcessFailure::Timeout => GitError::Timeout {
                    program: self.executable.display().to_string(),
                    secs: self.timeout.as_secs(),
                },
            }
        })
    }

    fn checked(&self, operation: &str, args: &[&str]) -> Result<ProcessOutput, GitError> {
        let output = self.run(operation, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(self.tool_error(operation, &output))
        }
    }

    fn tool_error(&self, operation: &str, output: &ProcessOutput) -> GitError {
        GitError::Tool {
            program: self.executable.display().to_string(),
            operation: operation.to_string(),
            status: output.code(),
            stderr: output.stderr_lossy(),
        }
    }
}

impl VersionControlGateway for GitCli {
    fn init(&self) -> Result<(), GitError> {
        if self.repo.join(".git").exists() {
            return Ok(());
        }
        self.checked("init", &["init"])?;
        Ok(())
    }

    fn stage_all(&self) -> Result<(), GitError> {
        self.checked("add", &["add", "--all", "--", "."])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        let output = self.run("commit", &["commit", "--quiet", "-m", message])?;
        if output.success() || nothing_to_commit(&output) {
            return Ok(());
        }
        Err(self.tool_error("commit", &output))
    }

    fn push(&self) -> Result<(), GitError> {
        self.checked("push", &["push"])?;
        Ok(())
    }

    fn pull(&self) -> Result<(), GitError> {
        self.checked("pull", &["pull"])?;
        Ok(())
    }
}

fn nothing_to_commit(output: &ProcessOutput) -> bool {
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        output.stderr_lossy()
    );
    text.contains("nothing to commit") || text.contains("nothing added to commit")
}
