//! Loose and packed ref reading.
//!
//! A loose ref is a file under the git dir containing either a hex OID or
//! `ref: <target>`. Packed refs live in `packed-refs`, one
//! `<hex-oid> <name>` per line, with `^<hex>` peel lines attached to the
//! preceding tag ref and loose refs taking precedence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use gitgres_backend::Reference;
use gitgres_hash::ObjectId;

use crate::LocalError;

/// Read one ref (loose first, then packed). `Ok(None)` when absent.
pub(crate) fn read_ref(git_dir: &Path, name: &str) -> Result<Option<Reference>, LocalError> {
    if let Some(r) = read_loose_ref(git_dir, name)? {
        return Ok(Some(r));
    }
    Ok(read_packed_refs(git_dir)?.remove(name).map(|oid| Reference::direct(name, oid)))
}

/// All refs under `refs/`, ordered by name. Loose refs shadow packed ones.
/// `HEAD` is not included; callers read it separately.
pub(crate) fn list_refs(git_dir: &Path) -> Result<Vec<Reference>, LocalError> {
    let mut by_name: BTreeMap<String, Reference> = BTreeMap::new();

    for (name, oid) in read_packed_refs(git_dir)? {
        by_name.insert(name.clone(), Reference::direct(name, oid));
    }

    let refs_dir = git_dir.join("refs");
    if refs_dir.is_dir() {
        let mut stack = vec![refs_dir];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    stack.push(path);
                } else if let Some(name) = ref_name_from_path(git_dir, &path) {
                    if let Some(r) = read_loose_ref(git_dir, &name)? {
                        by_name.insert(name, r);
                    }
                }
            }
        }
    }

    Ok(by_name.into_values().collect())
}

/// Resolve a ref name to an OID, following symbolic chains.
pub(crate) fn resolve_to_oid(git_dir: &Path, name: &str) -> Result<Option<ObjectId>, LocalError> {
    let mut current = name.to_string();
    // Symbolic chains longer than this are cycles in practice.
    for _ in 0..10 {
        match read_ref(git_dir, &current)? {
            None => return Ok(None),
            Some(Reference::Direct { oid, .. }) => return Ok(Some(oid)),
            Some(Reference::Symbolic { target, .. }) => current = target,
        }
    }
    Err(LocalError::SymrefLoop(name.to_string()))
}

fn read_loose_ref(git_dir: &Path, name: &str) -> Result<Option<Reference>, LocalError> {
    let path = loose_ref_path(git_dir, name);
    let contents = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LocalError::IoPath { path, source: e }),
    };

    let trimmed = contents.trim();
    if let Some(target) = trimmed.strip_prefix(b"ref: ") {
        let target = std::str::from_utf8(target.trim()).map_err(|_| LocalError::RefParse {
            name: name.to_string(),
            reason: "non-UTF-8 symbolic target".into(),
        })?;
        return Ok(Some(Reference::symbolic(name, target)));
    }

    let hex = std::str::from_utf8(trimmed).map_err(|_| LocalError::RefParse {
        name: name.to_string(),
        reason: "non-UTF-8 ref content".into(),
    })?;
    let oid = ObjectId::from_hex(hex).map_err(|e| LocalError::RefParse {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some(Reference::direct(name, oid)))
}

/// Parse `packed-refs` into name → OID. Peel lines are skipped; the ref
/// itself points at the tag object.
fn read_packed_refs(git_dir: &Path) -> Result<BTreeMap<String, ObjectId>, LocalError> {
    let path = git_dir.join("packed-refs");
    let contents = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(LocalError::IoPath { path, source: e }),
    };

    let mut refs = BTreeMap::new();
    for line in contents.lines() {
        if line.is_empty() || line.starts_with(b"#") || line.starts_with(b"^") {
            continue;
        }
        let space = line.find_byte(b' ').ok_or_else(|| LocalError::RefParse {
            name: "packed-refs".into(),
            reason: "missing space".into(),
        })?;
        let hex = std::str::from_utf8(&line[..space]).map_err(|_| LocalError::RefParse {
            name: "packed-refs".into(),
            reason: "non-UTF-8 oid".into(),
        })?;
        let oid = ObjectId::from_hex(hex).map_err(|e| LocalError::RefParse {
            name: "packed-refs".into(),
            reason: e.to_string(),
        })?;
        let name = std::str::from_utf8(&line[space + 1..])
            .map_err(|_| LocalError::RefParse {
                name: "packed-refs".into(),
                reason: "non-UTF-8 name".into(),
            })?
            .trim()
            .to_string();
        refs.insert(name, oid);
    }
    Ok(refs)
}

pub(crate) fn loose_ref_path(git_dir: &Path, name: &str) -> PathBuf {
    git_dir.join(name)
}

fn ref_name_from_path(git_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(git_dir).ok()?;
    let name = rel.to_str()?;
    // Lock files and the like are not refs.
    if name.ends_with(".lock") {
        return None;
    }
    Some(name.replace(std::path::MAIN_SEPARATOR, "/"))
}
