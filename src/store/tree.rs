//! Filesystem walking and atomic writes inside the store

use super::path::{NodeKind, StorePath};
use super::{DECLARATION_FILE, ENTRY_SUFFIX, VCS_DIR};
use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// Write `contents` to a sibling temp file, then rename it over `target`
///
/// Readers see either the old file or the complete new one.
pub(crate) fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)?;
    Ok(())
}

/// Every entry at or below `folder`, in lexical path order
///
/// Symlinked directories are not followed and `.git` is skipped.
pub(crate) fn collect_entries(root: &Path, folder: &StorePath) -> Result<Vec<StorePath>> {
    let mut out = Vec::new();
    for (path, kind) in collect_tree(root, folder)? {
        if kind == NodeKind::Entry {
            out.push(path);
        }
    }
    Ok(out)
}

/// Every entry and folder below `folder` (excluding `folder` itself), sorted
pub(crate) fn collect_tree(root: &Path, folder: &StorePath) -> Result<Vec<(StorePath, NodeKind)>> {
    let mut out = Vec::new();
    let dir = folder.folder_dir(root);
    if dir.is_dir() {
        walk(&dir, folder, &mut out)?;
    }
    out.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| kind_rank(a.1).cmp(&kind_rank(b.1))));
    Ok(out)
}

fn kind_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Folder => 0,
        NodeKind::Entry => 1,
    }
}

fn walk(dir: &Path, at: &StorePath, out: &mut Vec<(StorePath, NodeKind)>) -> Result<()> {
    for item in fs::read_dir(dir)? {
        let item = item?;
        let file_type = item.file_type()?;
        let Some(name) = item.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if file_type.is_dir() {
            if name == VCS_DIR {
                continue;
            }
            let child = at.join(&name);
            out.push((child.clone(), NodeKind::Folder));
            walk(&item.path(), &child, out)?;
        } else if file_type.is_file() {
            if let Some(stem) = name.strip_suffix(ENTRY_SUFFIX) {
                if !stem.is_empty() {
                    out.push((at.join(stem), NodeKind::Entry));
                }
            }
        }
    }
    Ok(())
}

/// Whether a folder holds nothing besides its own declaration
pub(crate) fn is_empty_folder(dir: &Path) -> Result<bool> {
    for item in fs::read_dir(dir)? {
        if item?.file_name() != DECLARATION_FILE {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Remove now-empty directories from `start` up to, not including, `root`
pub(crate) fn prune_empty_parents(root: &Path, start: &StorePath) -> Result<()> {
    for ancestor in start.ancestors() {
        if ancestor.is_root() {
            break;
        }
        let dir = ancestor.folder_dir(root);
        match fs::read_dir(&dir) {
            Ok(mut items) => {
                if items.next().is_some() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
        fs::remove_dir(&dir)?;
    }
    Ok(())
}

/// Recursively copy store content (entries, declarations, folders)
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for item in fs::read_dir(from)? {
        let item = item?;
        let file_type = item.file_type()?;
        let name = item.file_name();
        let target = to.join(&name);
        if file_type.is_dir() {
            if name == VCS_DIR {
                continue;
            }
            copy_tree(&item.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(item.path(), &target)?;
        }
    }
    Ok(())
}

/// Put the directory `ready` at `target`, replacing whatever is there
///
/// An existing target is first renamed aside and only deleted once `ready`
/// is in place; if that last rename fails, the old target is put back.
pub(crate) fn replace_dir(ready: &Path, target: &Path) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    if fs::symlink_metadata(target).is_err() {
        fs::rename(ready, target)?;
        return Ok(());
    }

    let aside = Builder::new().prefix(".replaced-").tempdir_in(dir)?;
    let old = aside.path().join("old");
    fs::rename(target, &old)?;
    if let Err(e) = fs::rename(ready, target) {
        fs::rename(&old, target)?;
        return Err(e.into());
    }
    // Dropping `aside` removes the old tree
    Ok(())
}

/// Copy a folder to `target` through a staging directory beside it
///
/// Nothing at `target` is touched until the whole copy exists.
pub(crate) fn copy_tree_replacing(from: &Path, target: &Path) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let staging = Builder::new().prefix(".copy-").tempdir_in(dir)?;
    let staged = staging.path().join("tree");
    copy_tree(from, &staged)?;
    replace_dir(&staged, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_collect_entries_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.gpg");
        touch(dir.path(), "a/z.gpg");
        touch(dir.path(), "a/y.gpg");
        touch(dir.path(), "a/.gpg-id");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), ".git/objects/x.gpg");

        let entries = collect_entries(dir.path(), &StorePath::root()).unwrap();
        let names: Vec<String> = entries.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["a/y", "a/z", "b"]);
    }

    #[test]
    fn test_is_empty_folder_ignores_declaration() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "team/.gpg-id");
        assert!(is_empty_folder(&dir.path().join("team")).unwrap());
        touch(dir.path(), "team/x.gpg");
        assert!(!is_empty_folder(&dir.path().join("team")).unwrap());
    }

    #[test]
    fn test_prune_empty_parents_stops_at_content() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a/keep.gpg");
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();

        let start = StorePath::from_segments(vec!["a".into(), "b".into(), "c".into()]);
        prune_empty_parents(dir.path(), &start).unwrap();
        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a/keep.gpg").exists());
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("sub/entry.gpg");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
        assert_eq!(fs::read_dir(dir.path().join("sub")).unwrap().count(), 1);
    }

    #[test]
    fn test_replace_dir_swaps_contents() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "new/a.gpg");
        touch(dir.path(), "dest/old.gpg");

        replace_dir(&dir.path().join("new"), &dir.path().join("dest")).unwrap();
        assert!(dir.path().join("dest/a.gpg").exists());
        assert!(!dir.path().join("dest/old.gpg").exists());
        assert!(!dir.path().join("new").exists());
        // Only the replaced folder is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_replace_dir_keeps_target_when_source_missing() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "dest/old.gpg");

        assert!(replace_dir(&dir.path().join("missing"), &dir.path().join("dest")).is_err());
        assert!(dir.path().join("dest/old.gpg").exists());
    }

    #[test]
    fn test_copy_tree_replacing_leaves_no_staging() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/x.gpg");
        touch(dir.path(), "src/deep/.gpg-id");
        touch(dir.path(), "dst/stale.gpg");

        copy_tree_replacing(&dir.path().join("src"), &dir.path().join("dst")).unwrap();
        assert!(dir.path().join("dst/x.gpg").exists());
        assert!(dir.path().join("dst/deep/.gpg-id").exists());
        assert!(!dir.path().join("dst/stale.gpg").exists());
        assert!(dir.path().join("src/x.gpg").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
