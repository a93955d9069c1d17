//! Reading indexed `.pack` files.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use gitgres_hash::ObjectId;
use gitgres_object::ObjectType;
use memmap2::Mmap;

use crate::entry::{decode_entry, PackEntry};
use crate::index::PackIndex;
use crate::{
    PackEntryType, PackError, PackedObject, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE,
    PACK_SIGNATURE, PACK_VERSION,
};

/// A memory-mapped packfile with its index.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
}

impl PackFile {
    /// Open a `.pack` file together with its sibling `.idx`.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        // SAFETY: read-only mapping of an immutable pack file.
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }

        Ok(Self {
            data,
            index,
            pack_path,
            num_objects,
        })
    }

    /// Read an object by OID. `None` if this pack does not contain it.
    pub fn read_object(&self, oid: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid) {
            Some(offset) => self.read_at_offset(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read an object at a known pack offset, resolving delta chains
    /// iteratively.
    pub fn read_at_offset(&self, offset: u64) -> Result<PackedObject, PackError> {
        // Collect the delta chain, innermost delta first, base last.
        let mut chain: Vec<Vec<u8>> = Vec::new();
        let mut current_offset = offset;

        for _ in 0..MAX_DELTA_CHAIN_DEPTH {
            let entry = decode_entry(&self.data[current_offset as usize..], current_offset)?;
            let decompressed = self.inflate_entry(&entry, current_offset)?;

            match entry.kind {
                PackEntryType::Commit
                | PackEntryType::Tree
                | PackEntryType::Blob
                | PackEntryType::Tag => {
                    let obj_type: ObjectType = entry
                        .kind
                        .to_object_type()
                        .expect("non-delta entry type");

                    let mut data = decompressed;
                    for delta in chain.iter().rev() {
                        data = crate::delta::apply_delta(&data, delta)?;
                    }
                    return Ok(PackedObject { obj_type, data });
                }
                PackEntryType::OfsDelta { base_offset } => {
                    chain.push(decompressed);
                    current_offset = base_offset;
                }
                PackEntryType::RefDelta { base_oid } => {
                    chain.push(decompressed);
                    match self.index.lookup(&base_oid) {
                        Some(base_offset) => current_offset = base_offset,
                        None => return Err(PackError::MissingBase(base_oid)),
                    }
                }
            }
        }

        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Does this pack contain the given OID?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    fn inflate_entry(&self, entry: &PackEntry, offset: u64) -> Result<Vec<u8>, PackError> {
        let compressed = &self.data[entry.payload_at as usize..];
        let mut decoder = ZlibDecoder::new(compressed);
        let mut buf = Vec::with_capacity(entry.inflated_len);
        decoder
            .read_to_end(&mut buf)
            .map_err(|_| PackError::CorruptEntry(offset))?;
        if buf.len() != entry.inflated_len {
            return Err(PackError::CorruptEntry(offset));
        }
        Ok(buf)
    }
}
