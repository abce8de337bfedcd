//! Configuration management for pass-engine

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default timeout for a single gpg invocation
pub const DEFAULT_GPG_TIMEOUT_SECS: u64 = 120;

/// Default timeout for a single git invocation (push/pull may hit the network)
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 300;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Password store location
    pub store: StoreConfig,

    /// Encryption tool configuration
    pub gpg: GpgConfig,

    /// Version control configuration
    pub git: GitConfig,

    /// Re-encryption behaviour
    #[serde(default)]
    pub cascade: CascadeConfig,
}

/// Password store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the store
    pub root: PathBuf,
}

/// GPG configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgConfig {
    /// Path to the gpg executable
    pub executable: PathBuf,

    /// Extra options passed to every gpg call
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Timeout per invocation in seconds
    pub timeout_secs: u64,
}

/// Git configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Commit every change to git
    pub enabled: bool,

    /// Path to the git executable
    pub executable: PathBuf,

    /// Push after every commit
    pub auto_push: bool,

    /// Pull before re-encrypting a folder
    pub auto_pull: bool,

    /// Timeout per invocation in seconds
    pub timeout_secs: u64,
}

/// Cascade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Skip entries already encrypted for their target recipients
    pub skip_current: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            gpg: GpgConfig::default(),
            git: GitConfig::default(),
            cascade: CascadeConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            root: default_store_dir(),
        }
    }
}

impl Default for GpgConfig {
    fn default() -> Self {
        GpgConfig {
            executable: find_binary_in_path("gpg2")
                .or_else(|| find_binary_in_path("gpg"))
                .unwrap_or_else(|| PathBuf::from("gpg")),
            extra_args: Vec::new(),
            timeout_secs: DEFAULT_GPG_TIMEOUT_SECS,
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            enabled: false,
            executable: find_binary_in_path("git").unwrap_or_else(|| PathBuf::from("git")),
            auto_push: false,
            auto_pull: false,
            timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        CascadeConfig { skip_current: true }
    }
}

impl Config {
    /// Load configuration from a JSON or YAML file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: Config = if is_yaml(path) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file: {}", e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file: {}", e))
            })?
        };

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PASSWORD_STORE_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.store.root = PathBuf::from(dir);
            }
        }

        if let Ok(opts) = std::env::var("PASSWORD_STORE_GPG_OPTS") {
            let opts: Vec<String> = opts.split_whitespace().map(str::to_string).collect();
            if !opts.is_empty() {
                self.gpg.extra_args = opts;
            }
        }

        if let Ok(flag) = std::env::var("PASSWORD_STORE_GIT") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.git.enabled = true,
                "0" | "false" | "no" | "off" => self.git.enabled = false,
                _ => {}
            }
        }
    }

    /// Save configuration to a file, YAML when the extension says so
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Password store root is required".to_string(),
            ));
        }

        if self.gpg.executable.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "gpg executable is required".to_string(),
            ));
        }

        if self.gpg.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "gpg timeout must be greater than 0".to_string(),
            ));
        }

        if self.git.enabled && self.git.executable.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "git executable is required when git is enabled".to_string(),
            ));
        }

        if self.git.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "git timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Ensure the store root exists
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.store.root)?;
        Ok(())
    }
}

/// Default store location: `~/.password-store`
pub fn default_store_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(windows) {
        home.join("password-store")
    } else {
        home.join(".password-store")
    }
}

/// Look up an executable on `PATH`
pub fn find_binary_in_path(binary: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.store.root = dir.path().join("store");
        config.git.enabled = true;
        config.git.auto_push = true;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(loaded.git.auto_push);
        assert!(loaded.cascade.skip_current);
    }

    #[test]
    fn test_save_yaml_and_create_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");

        let mut config = Config::default();
        config.store.root = dir.path().join("nested/store");
        config.save(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("nested/store"));

        let loaded = Config::load(&path).unwrap();
        loaded.ensure_directories().unwrap();
        assert!(dir.path().join("nested/store").is_dir());
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "store:\n  root: /srv/pass\n\
             gpg:\n  executable: /usr/bin/gpg\n  timeout_secs: 10\n\
             git:\n  enabled: false\n  executable: /usr/bin/git\n  auto_push: false\n  auto_pull: true\n  timeout_secs: 10\n",
        )
        .unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gpg.timeout_secs, 10);
        assert!(loaded.git.auto_pull);
        assert!(loaded.gpg.extra_args.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.store.root = PathBuf::from("/tmp/store");
        config.gpg.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_empty_root() {
        let mut config = Config::default();
        config.store.root = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
