//! Best-effort worktree checkout of `HEAD`.
//!
//! Walks the commit's tree and writes blobs into the worktree. This is
//! the tail end of `clone`; it does not write an index, so a subsequent
//! `git status` in the clone will re-hash the files.

use std::fs;
use std::path::Path;

use gitgres_hash::ObjectId;
use gitgres_object::{CommitInfo, ObjectType, TreeIter};

use crate::{LocalError, LocalRepository};

/// Materialise the tree of `HEAD` into the worktree. Returns the number
/// of files written. A repository with no resolvable `HEAD` (or no
/// worktree) checks out nothing.
pub(crate) fn checkout_head(repo: &LocalRepository) -> Result<usize, LocalError> {
    let Some(work_dir) = repo.work_dir().map(Path::to_path_buf) else {
        return Ok(0);
    };
    let Some(commit_oid) = repo.resolve_to_oid("HEAD")? else {
        return Ok(0);
    };

    let (obj_type, content) = repo.read(&commit_oid)?;
    if obj_type != ObjectType::Commit {
        return Err(LocalError::Corrupt {
            oid: commit_oid.to_hex(),
            reason: format!("HEAD resolves to a {obj_type}, not a commit"),
        });
    }

    let commit = CommitInfo::parse(&content)?;
    checkout_tree(repo, &commit.tree, &work_dir)
}

fn checkout_tree(
    repo: &LocalRepository,
    tree_oid: &ObjectId,
    dir: &Path,
) -> Result<usize, LocalError> {
    let (obj_type, content) = repo.read(tree_oid)?;
    if obj_type != ObjectType::Tree {
        return Err(LocalError::Corrupt {
            oid: tree_oid.to_hex(),
            reason: format!("expected tree, found {obj_type}"),
        });
    }

    let mut written = 0;
    for entry in TreeIter::new(&content) {
        let entry = entry?;
        let name = match std::str::from_utf8(entry.name) {
            Ok(name) => name,
            // Worktree paths must be valid UTF-8 here; odd names stay in
            // the object store only.
            Err(_) => continue,
        };
        let path = dir.join(name);

        match entry.mode {
            "40000" | "040000" => {
                fs::create_dir_all(&path)?;
                written += checkout_tree(repo, &entry.oid, &path)?;
            }
            "120000" => {
                let (_, target) = repo.read(&entry.oid)?;
                write_symlink(&path, &target)?;
                written += 1;
            }
            "160000" => {
                // Submodule gitlink: nothing to materialise.
            }
            mode => {
                let (_, blob) = repo.read(&entry.oid)?;
                fs::write(&path, &blob)?;
                if mode == "100755" {
                    set_executable(&path)?;
                }
                written += 1;
            }
        }
    }
    Ok(written)
}

#[cfg(unix)]
fn write_symlink(path: &Path, target: &[u8]) -> Result<(), LocalError> {
    use std::os::unix::ffi::OsStrExt;
    let target = std::ffi::OsStr::from_bytes(target);
    if path.exists() {
        fs::remove_file(path)?;
    }
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(path: &Path, target: &[u8]) -> Result<(), LocalError> {
    // Fall back to a regular file containing the link target.
    fs::write(path, target)?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), LocalError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), LocalError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitgres_hash::Hasher;

    fn tree_entry(mode: &str, name: &str, oid: &ObjectId) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(oid.as_bytes());
        out
    }

    fn commit_for(tree: &ObjectId) -> Vec<u8> {
        format!(
            "tree {}\nauthor T <t@t> 1 +0000\ncommitter T <t@t> 1 +0000\n\ncheckout test\n",
            tree.to_hex()
        )
        .into_bytes()
    }

    #[test]
    fn checks_out_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::init(dir.path().join("p"), false).unwrap();

        let blob = repo.write(ObjectType::Blob, b"file body\n").unwrap();
        let inner_tree_content = tree_entry("100644", "inner.txt", &blob);
        let inner_tree = repo.write(ObjectType::Tree, &inner_tree_content).unwrap();

        let mut root_content = tree_entry("100644", "top.txt", &blob);
        root_content.extend_from_slice(&tree_entry("40000", "sub", &inner_tree));
        let root_tree = repo.write(ObjectType::Tree, &root_content).unwrap();

        let commit = repo.write(ObjectType::Commit, &commit_for(&root_tree)).unwrap();
        repo.write_ref("refs/heads/main", &commit).unwrap();

        let written = repo.checkout_head().unwrap();
        assert_eq!(written, 2);

        let work = repo.work_dir().unwrap();
        assert_eq!(fs::read(work.join("top.txt")).unwrap(), b"file body\n");
        assert_eq!(fs::read(work.join("sub/inner.txt")).unwrap(), b"file body\n");
    }

    #[test]
    fn no_head_checks_out_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::init(dir.path().join("p"), false).unwrap();
        assert_eq!(repo.checkout_head().unwrap(), 0);
    }

    #[test]
    fn bare_repo_checks_out_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::init(dir.path().join("bare"), true).unwrap();
        let blob = repo.write(ObjectType::Blob, b"x").unwrap();
        let tree = repo
            .write(ObjectType::Tree, &tree_entry("100644", "f", &blob))
            .unwrap();
        let commit = repo.write(ObjectType::Commit, &commit_for(&tree)).unwrap();
        repo.write_ref("refs/heads/main", &commit).unwrap();

        assert_eq!(repo.checkout_head().unwrap(), 0);
    }

    #[test]
    fn executable_mode_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::init(dir.path().join("p"), false).unwrap();

        let blob = repo.write(ObjectType::Blob, b"#!/bin/sh\n").unwrap();
        let tree = repo
            .write(ObjectType::Tree, &tree_entry("100755", "run.sh", &blob))
            .unwrap();
        let commit = repo.write(ObjectType::Commit, &commit_for(&tree)).unwrap();
        repo.write_ref("refs/heads/main", &commit).unwrap();
        repo.checkout_head().unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(repo.work_dir().unwrap().join("run.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[test]
    fn tree_oids_recorded_match_written_objects() {
        // The tree bytes written above hash to the OIDs the store returns.
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepository::init(dir.path().join("p"), true).unwrap();
        let blob = repo.write(ObjectType::Blob, b"x").unwrap();
        let content = tree_entry("100644", "f", &blob);
        let tree = repo.write(ObjectType::Tree, &content).unwrap();
        assert_eq!(tree, Hasher::hash_object("tree", &content).unwrap());
    }
}
