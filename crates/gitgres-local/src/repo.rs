//! The local repository handle.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use gitgres_backend::Reference;
use gitgres_hash::ObjectId;
use gitgres_object::ObjectType;
use gitgres_pack::PackFile;

use crate::loose::LooseStore;
use crate::{refs, LocalError};

/// A local `.git` directory opened for object and ref access.
pub struct LocalRepository {
    git_dir: PathBuf,
    loose: LooseStore,
    packs: Vec<PackFile>,
}

impl LocalRepository {
    /// Open an existing git directory (the directory itself, not the
    /// worktree).
    pub fn open(git_dir: impl AsRef<Path>) -> Result<Self, LocalError> {
        let git_dir = git_dir.as_ref().to_path_buf();
        let objects_dir = git_dir.join("objects");
        if !objects_dir.is_dir() {
            return Err(LocalError::NotARepository(git_dir));
        }

        let packs = discover_packs(&objects_dir)?;
        Ok(Self {
            loose: LooseStore::open(&objects_dir),
            git_dir,
            packs,
        })
    }

    /// Create a repository skeleton at `path` and open it.
    ///
    /// With `bare` the path itself becomes the git dir; otherwise a
    /// `.git` subdirectory is created. Re-running on an existing
    /// repository is a no-op.
    pub fn init(path: impl AsRef<Path>, bare: bool) -> Result<Self, LocalError> {
        let path = path.as_ref();
        let git_dir = if bare { path.to_path_buf() } else { path.join(".git") };

        if !git_dir.join("HEAD").is_file() {
            fs::create_dir_all(git_dir.join("objects").join("info"))?;
            fs::create_dir_all(git_dir.join("objects").join("pack"))?;
            fs::create_dir_all(git_dir.join("refs").join("heads"))?;
            fs::create_dir_all(git_dir.join("refs").join("tags"))?;

            fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")?;
            fs::write(
                git_dir.join("config"),
                format!(
                    "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = {}\n",
                    bare
                ),
            )?;
        }

        Self::open(git_dir)
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The worktree directory, if this is not a bare repository.
    pub fn work_dir(&self) -> Option<&Path> {
        if self.git_dir.file_name().is_some_and(|n| n == ".git") {
            self.git_dir.parent()
        } else {
            None
        }
    }

    /// Is the object present, loose or packed?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.loose.contains(oid) || self.packs.iter().any(|p| p.contains(oid))
    }

    /// Read an object, searching loose storage first, then packs.
    pub fn read(&self, oid: &ObjectId) -> Result<(ObjectType, Vec<u8>), LocalError> {
        if let Some((obj_type, data)) = self.loose.read(oid)? {
            return Ok((obj_type, data));
        }
        for pack in &self.packs {
            if let Some(obj) = pack.read_object(oid)? {
                return Ok((obj.obj_type, obj.data));
            }
        }
        Err(LocalError::ObjectNotFound(*oid))
    }

    /// Write an object into loose storage. Idempotent.
    pub fn write(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, LocalError> {
        self.loose.write(obj_type, content)
    }

    /// All object ids in the repository (loose and packed), deduplicated,
    /// in OID order.
    pub fn all_oids(&self) -> Result<Vec<ObjectId>, LocalError> {
        let mut oids: BTreeSet<ObjectId> = self.loose.iter()?.into_iter().collect();
        for pack in &self.packs {
            for (oid, _) in pack.index().iter() {
                oids.insert(oid);
            }
        }
        Ok(oids.into_iter().collect())
    }

    /// Read one ref (loose or packed). `Ok(None)` when absent.
    pub fn read_ref(&self, name: &str) -> Result<Option<Reference>, LocalError> {
        refs::read_ref(&self.git_dir, name)
    }

    /// All refs under `refs/`, ordered by name (HEAD excluded).
    pub fn list_refs(&self) -> Result<Vec<Reference>, LocalError> {
        refs::list_refs(&self.git_dir)
    }

    /// Resolve a ref name to an OID through any symbolic chain.
    pub fn resolve_to_oid(&self, name: &str) -> Result<Option<ObjectId>, LocalError> {
        refs::resolve_to_oid(&self.git_dir, name)
    }

    /// Write a direct loose ref.
    pub fn write_ref(&self, name: &str, oid: &ObjectId) -> Result<(), LocalError> {
        let path = refs::loose_ref_path(&self.git_dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}\n", oid.to_hex()))
            .map_err(|e| LocalError::IoPath { path, source: e })
    }

    /// Write a symbolic loose ref (`ref: <target>`).
    pub fn write_symbolic_ref(&self, name: &str, target: &str) -> Result<(), LocalError> {
        let path = refs::loose_ref_path(&self.git_dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("ref: {target}\n"))
            .map_err(|e| LocalError::IoPath { path, source: e })
    }

    /// Check out `HEAD` into the worktree: walks the commit's tree and
    /// writes blobs, symlinks, and executable bits. Bare repositories
    /// and unresolvable `HEAD`s check out nothing.
    pub fn checkout_head(&self) -> Result<usize, LocalError> {
        crate::checkout::checkout_head(self)
    }
}

fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, LocalError> {
    let pack_dir = objects_dir.join("pack");
    if !pack_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut packs = Vec::new();
    for entry in fs::read_dir(&pack_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "pack") {
            // A pack without a readable index is skipped; the objects in
            // it stay invisible rather than failing every operation.
            if let Ok(pack) = PackFile::open(&path) {
                packs.push(pack);
            }
        }
    }
    Ok(packs)
}
