//! Store-relative path canonicalization and bounds checking
//!
//! Every path that reaches the filesystem goes through [`PathValidator`]
//! first. Validation is purely lexical except for `validate_existing` and
//! `check_destination`, which also look at the disk to catch symlinks that
//! lead out of the store.

use super::{DECLARATION_FILE, ENTRY_SUFFIX, VCS_DIR};
use crate::error::{PathError, PathRole, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Canonical store-relative path
///
/// Stored as a list of segments; the empty list is the store root. Ancestors
/// are prefixes of the segment list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<StorePath> {
        if self.is_root() {
            None
        } else {
            Some(self.ancestor(self.depth() - 1))
        }
    }

    /// Prefix made of the first `depth` segments
    pub fn ancestor(&self, depth: usize) -> StorePath {
        StorePath {
            segments: self.segments[..depth.min(self.depth())].to_vec(),
        }
    }

    /// This path and every ancestor, nearest first, ending with the root
    pub fn ancestors(&self) -> impl Iterator<Item = StorePath> + '_ {
        (0..=self.depth()).rev().map(move |d| self.ancestor(d))
    }

    pub fn join(&self, name: &str) -> StorePath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        StorePath { segments }
    }

    /// Whether `self` equals `base` or lies below it
    pub fn starts_with(&self, base: &StorePath) -> bool {
        self.segments.starts_with(&base.segments)
    }

    /// Re-anchor a path below `from` to the same position below `to`
    pub fn rebase(&self, from: &StorePath, to: &StorePath) -> Option<StorePath> {
        let rest = self.segments.strip_prefix(from.segments.as_slice())?;
        let mut segments = to.segments.clone();
        segments.extend(rest.iter().cloned());
        Some(StorePath { segments })
    }

    /// Directory location of this path as a folder
    pub fn folder_dir(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }

    /// File location of this path as an entry (`<path>.gpg`)
    pub fn entry_file(&self, root: &Path) -> PathBuf {
        let mut path = self.folder_dir(root);
        if let Some(name) = self.name() {
            path.set_file_name(format!("{}{}", name, ENTRY_SUFFIX));
        }
        path
    }

    /// Recipient declaration file of this path as a folder
    pub fn declaration_file(&self, root: &Path) -> PathBuf {
        self.folder_dir(root).join(DECLARATION_FILE)
    }

    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        StorePath { segments }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.segments.join("/"))
        }
    }
}

/// What a path refers to on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Entry,
    Folder,
}

/// Validates raw paths against a store root
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
}

impl PathValidator {
    /// `root` is made absolute lexically; it does not have to exist yet
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        let root = std::fs::canonicalize(&root).unwrap_or_else(|_| normalize_lexically(&root));
        Ok(PathValidator { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the caller marked the path as a folder with a trailing separator
    pub fn is_folder_directed(raw: &str) -> bool {
        raw.trim_end().ends_with('/') || raw.trim_end().ends_with(std::path::MAIN_SEPARATOR)
    }

    /// Canonicalize `raw` without touching the disk
    pub fn validate(&self, raw: &str, role: PathRole) -> Result<StorePath> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty(role).into());
        }
        if trimmed.contains('\0') {
            return Err(invalid(raw, "contains a NUL character"));
        }

        let input = Path::new(trimmed);
        let relative: PathBuf = if input.is_absolute() {
            let absolute = normalize_lexically(input);
            match absolute.strip_prefix(&self.root) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => {
                    return Err(PathError::Escape {
                        raw: raw.to_string(),
                        resolved: absolute.display().to_string(),
                    }
                    .into())
                }
            }
        } else {
            input.to_path_buf()
        };

        let mut segments: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(PathError::Escape {
                            raw: raw.to_string(),
                            resolved: normalize_lexically(&self.root.join(&relative))
                                .display()
                                .to_string(),
                        }
                        .into());
                    }
                }
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| invalid(raw, "is not valid UTF-8"))?;
                    segments.push(part.to_string());
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Escape {
                        raw: raw.to_string(),
                        resolved: relative.display().to_string(),
                    }
                    .into());
                }
            }
        }

        // Entries are addressed without their extension
        if let Some(last) = segments.last_mut() {
            if last.len() > ENTRY_SUFFIX.len() && last.ends_with(ENTRY_SUFFIX) {
                last.truncate(last.len() - ENTRY_SUFFIX.len());
            }
        }

        if let Some(reserved) = segments
            .iter()
            .find(|s| s.as_str() == VCS_DIR || s.as_str() == DECLARATION_FILE)
        {
            return Err(invalid(raw, &format!("\"{}\" is reserved by the store", reserved)));
        }

        let path = StorePath::from_segments(segments);
        let resolved = path.folder_dir(&self.root);
        if !resolved.starts_with(&self.root) {
            return Err(PathError::Escape {
                raw: raw.to_string(),
                resolved: resolved.display().to_string(),
            }
            .into());
        }
        Ok(path)
    }

    /// Validate and require the node to exist, returning what it is
    ///
    /// A plain path prefers the entry when both `<path>.gpg` and the folder
    /// `<path>/` exist; a trailing separator selects the folder.
    pub fn validate_existing(&self, raw: &str, role: PathRole) -> Result<(StorePath, NodeKind)> {
        let path = self.validate(raw, role)?;
        let kind = self
            .locate(&path, Self::is_folder_directed(raw))
            .ok_or_else(|| PathError::NotInStore {
                path: raw.trim().to_string(),
            })?;
        let on_disk = match kind {
            NodeKind::Entry => path.entry_file(&self.root),
            NodeKind::Folder => path.folder_dir(&self.root),
        };
        self.check_contained(raw, &on_disk)?;
        Ok((path, kind))
    }

    /// Find what `path` refers to on disk, if anything
    pub fn locate(&self, path: &StorePath, folder_directed: bool) -> Option<NodeKind> {
        if path.is_root() {
            return self.root.is_dir().then_some(NodeKind::Folder);
        }
        if !folder_directed && path.entry_file(&self.root).is_file() {
            return Some(NodeKind::Entry);
        }
        if path.folder_dir(&self.root).is_dir() {
            return Some(NodeKind::Folder);
        }
        None
    }

    /// Reject a location about to be written if it would land outside the store
    ///
    /// The location need not exist; its nearest existing ancestor is resolved
    /// instead, so a symlinked folder on the way out is caught.
    pub fn check_destination(&self, raw: &str, location: &Path) -> Result<()> {
        let mut existing = location;
        while !existing.exists() {
            match existing.parent() {
                Some(parent) if parent.starts_with(&self.root) => existing = parent,
                // Nothing of the store exists yet, so nothing can be linked
                _ => return Ok(()),
            }
        }
        self.check_contained(raw, existing)
    }

    /// Reject on-disk locations whose real path leaves the store (symlinks)
    fn check_contained(&self, raw: &str, on_disk: &Path) -> Result<()> {
        let real_root = std::fs::canonicalize(&self.root)?;
        let real = std::fs::canonicalize(on_disk)?;
        if real.starts_with(&real_root) {
            Ok(())
        } else {
            Err(PathError::Escape {
                raw: raw.to_string(),
                resolved: real.display().to_string(),
            }
            .into())
        }
    }
}

fn invalid(raw: &str, reason: &str) -> crate::error::Error {
    PathError::Invalid {
        path: raw.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Resolve `.` and `..` without consulting the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    fn escape(result: Result<StorePath>) -> bool {
        matches!(result, Err(Error::Path(PathError::Escape { .. })))
    }

    #[test]
    fn test_rejects_empty() {
        let dir = tempdir().unwrap();
        let v = PathValidator::new(dir.path()).unwrap();
        assert!(matches!(
            v.validate("  ", PathRole::Source),
            Err(Error::Path(PathError::Empty(PathRole::Source)))
        ));
        assert!(matches!(
            v.validate("", PathRole::Destination),
            Err(Error::Path(PathError::Empty(PathRole::Destination)))
        ));
    }

    #[test]
    fn test_parent_segments_escaping_root() {
        let dir = tempdir().unwrap();
        let v = PathValidator::new(dir.path()).unwrap();
        for raw in ["..", "../x", "a/../../x", "a/b/../../..", "./../etc/passwd"] {
            assert!(escape(v.validate(raw, PathRole::Source)), "{} should escape", raw);
        }
    }

    #[test]
    fn test_parent_segments_inside_root() {
        let dir = tempdir().unwrap();
        let v = PathValidator::new(dir.path()).unwrap();
        let path = v.validate("a/b/../c", PathRole::Source).unwrap();
        assert_eq!(path.to_string(), "a/c");
        assert!(v.validate("a/..", PathRole::Source).unwrap().is_root());
        assert!(v.validate(".", PathRole::Source).unwrap().is_root());
    }

    #[test]
    fn test_absolute_paths() {
        let dir = tempdir().unwrap();
        let v = PathValidator::new(dir.path()).unwrap();
        let inside = v.root().join("web").join("mail.gpg");
        let path = v
            .validate(inside.to_str().unwrap(), PathRole::Source)
            .unwrap();
        assert_eq!(path.to_string(), "web/mail");

        assert!(escape(v.validate("/etc/passwd", PathRole::Source)));
    }

    #[test]
    fn test_strips_extension_and_rejects_reserved() {
        let dir = tempdir().unwrap();
        let v = PathValidator::new(dir.path()).unwrap();
        assert_eq!(
            v.validate("mail/work.gpg", PathRole::Source).unwrap().to_string(),
            "mail/work"
        );
        assert!(matches!(
            v.validate(".git/config", PathRole::Source),
            Err(Error::Path(PathError::Invalid { .. }))
        ));
        assert!(matches!(
            v.validate("team/.gpg-id", PathRole::Source),
            Err(Error::Path(PathError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_validate_existing() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/mail.gpg"), b"x").unwrap();
        let v = PathValidator::new(dir.path()).unwrap();

        let (path, kind) = v.validate_existing("web/mail", PathRole::Source).unwrap();
        assert_eq!(path.to_string(), "web/mail");
        assert_eq!(kind, NodeKind::Entry);

        let (_, kind) = v.validate_existing("web/", PathRole::Source).unwrap();
        assert_eq!(kind, NodeKind::Folder);

        assert!(matches!(
            v.validate_existing("web/missing", PathRole::Source),
            Err(Error::Path(PathError::NotInStore { .. }))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_store() {
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("loot.gpg"), b"x").unwrap();
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let v = PathValidator::new(dir.path()).unwrap();

        assert!(matches!(
            v.validate_existing("link/loot", PathRole::Source),
            Err(Error::Path(PathError::Escape { .. }))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_destination_out_of_store() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::fs::create_dir_all(dir.path().join("inside")).unwrap();
        let v = PathValidator::new(dir.path()).unwrap();

        let escaping = v.validate("link/deep/new", PathRole::Destination).unwrap();
        assert!(matches!(
            v.check_destination("link/deep/new", &escaping.entry_file(v.root())),
            Err(Error::Path(PathError::Escape { .. }))
        ));

        let fine = v.validate("inside/new/entry", PathRole::Destination).unwrap();
        v.check_destination("inside/new/entry", &fine.entry_file(v.root()))
            .unwrap();
    }

    #[test]
    fn test_destination_in_missing_store() {
        let dir = tempdir().unwrap();
        let v = PathValidator::new(dir.path().join("not-yet")).unwrap();
        let path = v.validate("a/b", PathRole::Destination).unwrap();
        v.check_destination("a/b", &path.entry_file(v.root())).unwrap();
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let path = StorePath::from_segments(vec!["a".into(), "b".into(), "c".into()]);
        let names: Vec<String> = path.ancestors().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["a/b/c", "a/b", "a", "/"]);
    }

    #[test]
    fn test_rebase() {
        let entry = StorePath::from_segments(vec!["old".into(), "x".into(), "y".into()]);
        let from = StorePath::from_segments(vec!["old".into()]);
        let to = StorePath::from_segments(vec!["new".into(), "place".into()]);
        assert_eq!(entry.rebase(&from, &to).unwrap().to_string(), "new/place/x/y");
        assert!(from.rebase(&to, &from).is_none());
    }
}
