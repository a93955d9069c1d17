//! Pack index (v2) reading and lookup.
//!
//! The index provides OID → pack-offset mapping via a 256-entry fan-out
//! table and binary search over sorted OIDs:
//!
//! ```text
//! Header:  \xff tOc | version (= 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte values
//! Offsets: N × 4-byte offsets (high bit set → 64-bit table)
//! 64-bit:  M × 8-byte offsets
//! Trailer: pack checksum | index checksum
//! ```

use std::path::{Path, PathBuf};

use gitgres_hash::ObjectId;
use memmap2::Mmap;

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const OID_LEN: usize = 20;

/// Memory-mapped pack index.
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    fanout_offset: usize,
    oid_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        // SAFETY: the mapping is read-only and the file is not truncated
        // while mapped; pack and idx files are immutable once written.
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < 8 + 1024 + 2 * OID_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout_offset = 8;
        let last_fanout = fanout_offset + 255 * 4;
        let num_objects = u32::from_be_bytes([
            data[last_fanout],
            data[last_fanout + 1],
            data[last_fanout + 2],
            data[last_fanout + 3],
        ]);

        let n = num_objects as usize;
        let oid_offset = fanout_offset + 1024;
        let crc_offset = oid_offset + n * OID_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        let min_size = offset64_offset + 2 * OID_LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            num_objects,
            fanout_offset,
            oid_offset,
            offset32_offset,
            offset64_offset,
            idx_path,
        })
    }

    /// Look up an OID, returning the offset in the pack file.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let (lo, hi) = self.fanout_range(oid.first_byte());
        let target = oid.as_bytes();

        let mut low = lo;
        let mut high = hi;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at_index(mid)),
            }
        }
        None
    }

    /// All OIDs whose raw bytes start with `prefix`, with their offsets.
    pub fn lookup_prefix(&self, prefix: &[u8]) -> Vec<(ObjectId, u64)> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let (lo, hi) = self.fanout_range(prefix[0]);

        let mut results = Vec::new();
        for i in lo..hi {
            let oid_bytes = self.oid_bytes_at(i);
            if oid_bytes[..prefix.len().min(OID_LEN)] == *prefix {
                if let Ok(oid) = ObjectId::from_bytes(oid_bytes) {
                    results.push((oid, self.offset_at_index(i)));
                }
            }
        }
        results
    }

    /// Iterate all (OID, offset) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects as usize).filter_map(|i| {
            ObjectId::from_bytes(self.oid_bytes_at(i))
                .ok()
                .map(|oid| (oid, self.offset_at_index(i)))
        })
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Index range `[lo, hi)` of OIDs whose first byte matches.
    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let hi = self.fanout_at(first_byte as usize);
        let lo = if first_byte == 0 {
            0
        } else {
            self.fanout_at(first_byte as usize - 1)
        };
        (lo as usize, hi as usize)
    }

    fn fanout_at(&self, i: usize) -> u32 {
        let pos = self.fanout_offset + i * 4;
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = self.oid_offset + index * OID_LEN;
        &self.data[start..start + OID_LEN]
    }

    fn offset_at_index(&self, index: usize) -> u64 {
        let pos = self.offset32_offset + index * 4;
        let val = u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ]);

        if val & 0x8000_0000 != 0 {
            let idx64 = (val & 0x7FFF_FFFF) as usize;
            let pos64 = self.offset64_offset + idx64 * 8;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&self.data[pos64..pos64 + 8]);
            u64::from_be_bytes(buf)
        } else {
            val as u64
        }
    }
}
