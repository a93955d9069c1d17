//! Loose object storage: zlib-compressed `"<type> <size>\0<content>"`
//! files under `objects/XX/YYYY...`.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use gitgres_hash::{Hasher, ObjectId};
use gitgres_object::ObjectType;

use crate::LocalError;

/// Interface to a repository's loose objects directory.
pub struct LooseStore {
    objects_dir: PathBuf,
}

impl LooseStore {
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
        }
    }

    /// File path for a given OID.
    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read a loose object. `Ok(None)` when absent, `Err` when corrupt.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, LocalError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LocalError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).map_err(|e| LocalError::Corrupt {
            oid: oid.to_hex(),
            reason: format!("zlib: {e}"),
        })?;

        let (obj_type, size, header_len) = parse_header(&raw).ok_or_else(|| LocalError::Corrupt {
            oid: oid.to_hex(),
            reason: "bad object header".into(),
        })?;

        let content = &raw[header_len..];
        if content.len() != size {
            return Err(LocalError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("size mismatch: header says {size}, got {}", content.len()),
            });
        }

        Ok(Some((obj_type, content.to_vec())))
    }

    /// Write raw content with a known type. Idempotent; the file lands
    /// via temp-file-plus-rename so concurrent writers race safely.
    pub fn write(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, LocalError> {
        let oid = Hasher::hash_object(obj_type.name(), content)?;
        if self.contains(&oid) {
            return Ok(oid);
        }

        let final_path = self.object_path(&oid);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.objects_dir.join(format!(
            "tmp_obj_{}_{}",
            std::process::id(),
            oid.to_hex()
        ));
        {
            let file = fs::File::create(&tmp_path)?;
            let mut encoder = ZlibEncoder::new(file, flate2::Compression::default());
            encoder.write_all(format!("{} {}\0", obj_type.name(), content.len()).as_bytes())?;
            encoder.write_all(content)?;
            encoder.finish()?;
        }

        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(oid),
            Err(_) if final_path.exists() => {
                // Another writer won the race.
                let _ = fs::remove_file(&tmp_path);
                Ok(oid)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(LocalError::Io(e))
            }
        }
    }

    /// All loose OIDs, in fan-out directory order.
    pub fn iter(&self) -> Result<Vec<ObjectId>, LocalError> {
        let mut oids = Vec::new();
        if !self.objects_dir.is_dir() {
            return Ok(oids);
        }

        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&self.objects_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.len() == 2
                && name.chars().all(|c| c.is_ascii_hexdigit())
                && entry.file_type()?.is_dir()
            {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        for dir in dirs {
            let prefix = dir.file_name().unwrap().to_string_lossy().to_lowercase();
            let mut files: Vec<String> = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    files.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            files.sort();
            for file in files {
                // Skip temp files and anything else that isn't an OID tail.
                if let Ok(oid) = ObjectId::from_hex(&format!("{prefix}{file}")) {
                    oids.push(oid);
                }
            }
        }
        Ok(oids)
    }
}

/// Parse a loose object header: `"<type> <size>\0"`. Returns the type,
/// declared size, and header length.
fn parse_header(raw: &[u8]) -> Option<(ObjectType, usize, usize)> {
    let nul = raw.iter().position(|&b| b == 0)?;
    let header = std::str::from_utf8(&raw[..nul]).ok()?;
    let (type_name, size_str) = header.split_once(' ')?;
    let obj_type = ObjectType::from_bytes(type_name.as_bytes()).ok()?;
    let size: usize = size_str.parse().ok()?;
    Some((obj_type, size, nul + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let oid = store.write(ObjectType::Blob, b"hello").unwrap();
        assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert!(store.contains(&oid));

        let (obj_type, content) = store.read(&oid).unwrap().unwrap();
        assert_eq!(obj_type, ObjectType::Blob);
        assert_eq!(content, b"hello");
    }

    #[test]
    fn write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let a = store.write(ObjectType::Blob, b"same").unwrap();
        let b = store.write(ObjectType::Blob, b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.iter().unwrap().len(), 1);
    }

    #[test]
    fn missing_object_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let oid = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        assert!(store.read(&oid).unwrap().is_none());
        assert!(!store.contains(&oid));
    }

    #[test]
    fn iter_lists_all_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let mut written = vec![
            store.write(ObjectType::Blob, b"one").unwrap(),
            store.write(ObjectType::Blob, b"two").unwrap(),
            store.write(ObjectType::Tree, b"").unwrap(),
        ];
        written.sort();

        let listed = store.iter().unwrap();
        assert_eq!(listed, written); // fan-out order == sorted OID order
    }

    #[test]
    fn corrupt_object_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let oid = store.write(ObjectType::Blob, b"payload").unwrap();

        std::fs::write(store.object_path(&oid), b"not zlib at all").unwrap();
        assert!(matches!(
            store.read(&oid),
            Err(LocalError::Corrupt { .. })
        ));
    }

    #[test]
    fn header_parse() {
        assert_eq!(
            parse_header(b"blob 5\0hello"),
            Some((ObjectType::Blob, 5, 7))
        );
        assert_eq!(parse_header(b"tree 0\0"), Some((ObjectType::Tree, 0, 7)));
        assert!(parse_header(b"blob5\0x").is_none());
        assert!(parse_header(b"gift 5\0hello").is_none());
        assert!(parse_header(b"no nul here").is_none());
    }
}
