//! Streaming pack ingestion.
//!
//! `PackIngester` is the trusted indexer behind the object store's
//! writepack sink: raw pack bytes stream into a staging file, and on
//! finish the whole pack is walked entry by entry, delta chains are
//! resolved, and every contained object is handed back fully materialised
//! with its recomputed OID. The store never holds deltified data.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use gitgres_hash::{Hasher, ObjectId};
use gitgres_object::ObjectType;

use crate::entry::decode_entry;
use crate::{PackEntryType, PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// A fully materialised object recovered from a pack stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedObject {
    pub oid: ObjectId,
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

/// Accumulates a raw pack stream in a staging file, then materialises it.
pub struct PackIngester {
    file: File,
    path: PathBuf,
    bytes_received: u64,
}

impl PackIngester {
    /// Create the staging file at `path` (inside a caller-owned scratch
    /// directory).
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            file,
            path,
            bytes_received: 0,
        })
    }

    /// Append a chunk of raw pack bytes.
    pub fn append(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data)?;
        self.bytes_received += data.len() as u64;
        Ok(())
    }

    /// Total bytes received so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Validate the pack and materialise every object in it.
    ///
    /// `resolve_base` supplies bases for thin-pack REF_DELTA entries whose
    /// base object is not part of the stream (typically a lookup against
    /// the destination object store).
    pub fn finish(
        mut self,
        resolve_base: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Vec<IngestedObject>, PackError> {
        self.file.flush()?;
        let data = std::fs::read(&self.path)?;
        materialize(&data, resolve_base)
    }
}

/// Walk a complete in-memory pack and materialise every entry.
pub fn materialize(
    data: &[u8],
    resolve_base: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
) -> Result<Vec<IngestedObject>, PackError> {
    if data.len() < PACK_HEADER_SIZE + 20 {
        return Err(PackError::InvalidHeader("pack too small".into()));
    }
    if &data[0..4] != PACK_SIGNATURE {
        return Err(PackError::InvalidHeader("bad PACK signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;

    // Trailing SHA-1 over everything before it.
    let body_len = data.len() - 20;
    let expected = ObjectId::from_bytes(&data[body_len..])?;
    let actual = Hasher::digest(&data[..body_len])?;
    if actual != expected {
        return Err(PackError::ChecksumMismatch { expected, actual });
    }

    let mut objects: Vec<IngestedObject> = Vec::with_capacity(num_objects);
    // Bases for delta resolution, by pack offset and by OID.
    let mut by_offset: HashMap<u64, usize> = HashMap::with_capacity(num_objects);
    let mut by_oid: HashMap<ObjectId, usize> = HashMap::with_capacity(num_objects);

    let mut pos = PACK_HEADER_SIZE as u64;
    for _ in 0..num_objects {
        if pos as usize >= body_len {
            return Err(PackError::CorruptEntry(pos));
        }
        let entry = decode_entry(&data[pos as usize..body_len], pos)?;
        let (inflated, consumed) =
            inflate(&data[entry.payload_at as usize..body_len], entry.inflated_len, pos)?;

        let (obj_type, content) = match entry.kind {
            PackEntryType::Commit | PackEntryType::Tree | PackEntryType::Blob
            | PackEntryType::Tag => {
                let obj_type = entry
                    .kind
                    .to_object_type()
                    .expect("non-delta entry type");
                (obj_type, inflated)
            }
            PackEntryType::OfsDelta { base_offset } => {
                let base_idx = by_offset
                    .get(&base_offset)
                    .copied()
                    .ok_or(PackError::CorruptEntry(pos))?;
                let base = &objects[base_idx];
                let content = crate::delta::apply_delta(&base.data, &inflated)?;
                (base.obj_type, content)
            }
            PackEntryType::RefDelta { base_oid } => {
                let (base_type, base_data) = match by_oid.get(&base_oid) {
                    Some(&idx) => {
                        let base = &objects[idx];
                        (base.obj_type, base.data.clone())
                    }
                    None => resolve_base(&base_oid).ok_or(PackError::MissingBase(base_oid))?,
                };
                let content = crate::delta::apply_delta(&base_data, &inflated)?;
                (base_type, content)
            }
        };

        // Re-hash: the OID trusted downstream comes from the materialised
        // bytes, not from anything the stream claims.
        let oid = Hasher::hash_object(obj_type.name(), &content)?;

        let idx = objects.len();
        by_offset.insert(pos, idx);
        by_oid.insert(oid, idx);
        objects.push(IngestedObject {
            oid,
            obj_type,
            data: content,
        });

        pos = entry.payload_at + consumed;
    }

    if pos as usize != body_len {
        return Err(PackError::CorruptEntry(pos));
    }

    Ok(objects)
}

/// Inflate one zlib stream, returning the data and the compressed byte
/// count consumed.
fn inflate(compressed: &[u8], expected_size: usize, offset: u64) -> Result<(Vec<u8>, u64), PackError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut buf = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut buf)
        .map_err(|_| PackError::CorruptEntry(offset))?;
    if buf.len() != expected_size {
        return Err(PackError::CorruptEntry(offset));
    }
    Ok((buf, decoder.total_in()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{encode_copy_op, encode_literal, encode_size};
    use crate::entry::{encode_base_distance, encode_header};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut enc = ZlibEncoder::new(&mut out, Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap();
        out
    }

    /// Assemble a pack from pre-encoded entries (header bytes, payload).
    fn assemble(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for entry in entries {
            pack.extend_from_slice(entry);
        }
        let checksum = Hasher::digest(&pack).unwrap();
        pack.extend_from_slice(checksum.as_bytes());
        pack
    }

    fn base_entry(kind_bits: u8, content: &[u8]) -> Vec<u8> {
        let mut out = encode_header(kind_bits, content.len() as u64);
        out.extend_from_slice(&deflate(content));
        out
    }

    #[test]
    fn single_blob() {
        let pack = assemble(&[base_entry(3, b"hello")]);
        let objects = materialize(&pack, |_| None).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].obj_type, ObjectType::Blob);
        assert_eq!(objects[0].data, b"hello");
        assert_eq!(
            objects[0].oid.to_hex(),
            "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0"
        );
    }

    #[test]
    fn mixed_types() {
        let commit = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                       author A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nm\n";
        let pack = assemble(&[
            base_entry(1, commit),
            base_entry(3, b"blob one"),
            base_entry(2, b""),
        ]);
        let objects = materialize(&pack, |_| None).unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0].obj_type, ObjectType::Commit);
        assert_eq!(objects[1].obj_type, ObjectType::Blob);
        assert_eq!(objects[2].obj_type, ObjectType::Tree);
        assert_eq!(
            objects[2].oid.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn ofs_delta_resolves_against_earlier_entry() {
        let base_content = b"the quick brown fox jumps over the lazy dog";
        let target_content = b"the quick brown cat jumps over the lazy dog";

        // delta: copy 16, splice in "cat", copy the tail
        let mut delta = encode_size(base_content.len());
        delta.extend_from_slice(&encode_size(target_content.len()));
        delta.extend_from_slice(&encode_copy_op(0, 16));
        delta.extend_from_slice(&encode_literal(b"cat"));
        delta.extend_from_slice(&encode_copy_op(19, base_content.len() - 19));

        let base = base_entry(3, base_content);
        let base_offset = PACK_HEADER_SIZE as u64;
        let delta_offset = base_offset + base.len() as u64;

        let mut delta_entry = encode_header(6, delta.len() as u64);
        delta_entry.extend_from_slice(&encode_base_distance(delta_offset - base_offset));
        delta_entry.extend_from_slice(&deflate(&delta));

        let pack = assemble(&[base, delta_entry]);
        let objects = materialize(&pack, |_| None).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].obj_type, ObjectType::Blob);
        assert_eq!(objects[1].data, target_content);
        assert_eq!(
            objects[1].oid,
            Hasher::hash_object("blob", target_content).unwrap()
        );
    }

    #[test]
    fn thin_pack_ref_delta_uses_external_resolver() {
        let external_base = b"external base content".to_vec();
        let base_oid = Hasher::hash_object("blob", &external_base).unwrap();
        let target = b"external base content plus tail";

        let mut delta = encode_size(external_base.len());
        delta.extend_from_slice(&encode_size(target.len()));
        delta.extend_from_slice(&encode_copy_op(0, external_base.len()));
        delta.extend_from_slice(&encode_literal(b" plus tail"));

        let mut entry = encode_header(7, delta.len() as u64);
        entry.extend_from_slice(base_oid.as_bytes());
        entry.extend_from_slice(&deflate(&delta));

        let pack = assemble(&[entry]);

        let objects = materialize(&pack, |oid| {
            (*oid == base_oid).then(|| (ObjectType::Blob, external_base.clone()))
        })
        .unwrap();
        assert_eq!(objects[0].data, target);

        // Without the resolver the base is missing.
        let err = materialize(&pack, |_| None).unwrap_err();
        assert!(matches!(err, PackError::MissingBase(oid) if oid == base_oid));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut pack = assemble(&[base_entry(3, b"hello")]);
        let len = pack.len();
        pack[len - 1] ^= 0xff;
        assert!(matches!(
            materialize(&pack, |_| None),
            Err(PackError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn flipped_body_byte_is_rejected() {
        let mut pack = assemble(&[base_entry(3, b"hello")]);
        pack[PACK_HEADER_SIZE + 2] ^= 0x01;
        assert!(materialize(&pack, |_| None).is_err());
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut pack = assemble(&[base_entry(3, b"x")]);
        pack[0] = b'K';
        assert!(matches!(
            materialize(&pack, |_| None),
            Err(PackError::InvalidHeader(_))
        ));
    }

    #[test]
    fn streaming_ingester_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let pack = assemble(&[base_entry(3, b"streamed"), base_entry(3, b"objects")]);

        let mut ingester = PackIngester::create(dir.path().join("incoming.pack")).unwrap();
        // Feed in awkward chunk sizes.
        for chunk in pack.chunks(7) {
            ingester.append(chunk).unwrap();
        }
        assert_eq!(ingester.bytes_received(), pack.len() as u64);

        let objects = ingester.finish(|_| None).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].data, b"streamed");
        assert_eq!(objects[1].data, b"objects");
    }
}
