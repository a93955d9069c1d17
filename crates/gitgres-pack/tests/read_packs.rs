//! PackFile + PackIndex integration: build synthetic pack/idx pairs on
//! disk and read them back.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitgres_hash::{Hasher, ObjectId};
use gitgres_object::ObjectType;
use gitgres_pack::entry::encode_header;
use gitgres_pack::{PackFile, IDX_SIGNATURE, IDX_VERSION, PACK_SIGNATURE, PACK_VERSION};

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut enc = ZlibEncoder::new(&mut out, Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap();
    out
}

/// Write a pack and matching v2 idx; returns the pack path and OIDs in
/// input order.
fn build_pack(dir: &Path, objects: &[(ObjectType, &[u8])]) -> (PathBuf, Vec<ObjectId>) {
    let pack_path = dir.join("test.pack");
    let idx_path = dir.join("test.idx");

    let mut pack = Vec::new();
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut entries: Vec<(ObjectId, u64, u32)> = Vec::new();
    for (obj_type, content) in objects {
        let offset = pack.len() as u64;
        let header = encode_header(obj_type.code() as u8, content.len() as u64);
        let compressed = deflate(content);

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&compressed);

        let oid = Hasher::hash_object(obj_type.name(), content).unwrap();

        pack.extend_from_slice(&header);
        pack.extend_from_slice(&compressed);
        entries.push((oid, offset, crc.finalize()));
    }

    let pack_checksum = Hasher::digest(&pack).unwrap();
    pack.extend_from_slice(pack_checksum.as_bytes());
    std::fs::write(&pack_path, &pack).unwrap();

    let oids: Vec<ObjectId> = entries.iter().map(|(oid, _, _)| *oid).collect();
    std::fs::write(&idx_path, build_idx(&entries, pack_checksum.as_bytes())).unwrap();

    (pack_path, oids)
}

fn build_idx(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (oid, _, _) in &sorted {
        fanout[oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }

    for (oid, _, _) in &sorted {
        buf.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in &sorted {
        buf.extend_from_slice(&crc.to_be_bytes());
    }
    for (_, offset, _) in &sorted {
        buf.extend_from_slice(&(*offset as u32).to_be_bytes());
    }

    buf.extend_from_slice(pack_checksum);
    let idx_checksum = Hasher::digest(&buf).unwrap();
    buf.extend_from_slice(idx_checksum.as_bytes());
    buf
}

#[test]
fn read_single_blob() {
    let dir = tempfile::tempdir().unwrap();
    let (pack_path, oids) = build_pack(dir.path(), &[(ObjectType::Blob, b"Hello, packfile!")]);

    let pack = PackFile::open(&pack_path).unwrap();
    assert_eq!(pack.num_objects(), 1);

    let obj = pack.read_object(&oids[0]).unwrap().unwrap();
    assert_eq!(obj.obj_type, ObjectType::Blob);
    assert_eq!(obj.data, b"Hello, packfile!");
}

#[test]
fn read_multiple_objects() {
    let dir = tempfile::tempdir().unwrap();
    let commit = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                   author T <t@t> 0 +0000\ncommitter T <t@t> 0 +0000\n\ntest\n";
    let objects: Vec<(ObjectType, &[u8])> = vec![
        (ObjectType::Blob, b"blob content"),
        (ObjectType::Blob, b"another blob"),
        (ObjectType::Commit, commit),
    ];
    let (pack_path, oids) = build_pack(dir.path(), &objects);

    let pack = PackFile::open(&pack_path).unwrap();
    assert_eq!(pack.num_objects(), 3);

    for (i, (obj_type, content)) in objects.iter().enumerate() {
        let obj = pack.read_object(&oids[i]).unwrap().unwrap();
        assert_eq!(obj.obj_type, *obj_type);
        assert_eq!(obj.data, *content);
    }
}

#[test]
fn contains_and_missing() {
    let dir = tempfile::tempdir().unwrap();
    let (pack_path, oids) = build_pack(dir.path(), &[(ObjectType::Blob, b"present")]);

    let pack = PackFile::open(&pack_path).unwrap();
    assert!(pack.contains(&oids[0]));

    let missing = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
    assert!(!pack.contains(&missing));
    assert_eq!(pack.read_object(&missing).unwrap(), None);
}

#[test]
fn index_iterates_all_objects() {
    let dir = tempfile::tempdir().unwrap();
    let (pack_path, mut oids) =
        build_pack(dir.path(), &[(ObjectType::Blob, b"a"), (ObjectType::Blob, b"b")]);

    let pack = PackFile::open(&pack_path).unwrap();
    let mut listed: Vec<ObjectId> = pack.index().iter().map(|(oid, _)| oid).collect();
    listed.sort();
    oids.sort();
    assert_eq!(listed, oids);
}

#[test]
fn prefix_lookup_by_raw_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (pack_path, oids) = build_pack(dir.path(), &[(ObjectType::Blob, b"prefix me")]);

    let pack = PackFile::open(&pack_path).unwrap();
    let matches = pack.index().lookup_prefix(&oids[0].as_bytes()[..4]);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].0, oids[0]);

    assert!(pack
        .index()
        .lookup_prefix(&[!oids[0].first_byte(), 0, 0, 0])
        .is_empty());
}

#[test]
fn object_count_mismatch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (pack_path, _) = build_pack(dir.path(), &[(ObjectType::Blob, b"x")]);

    // Corrupt the object count in the pack header.
    let mut pack = std::fs::read(&pack_path).unwrap();
    pack[11] = 9;
    std::fs::write(&pack_path, &pack).unwrap();

    assert!(PackFile::open(&pack_path).is_err());
}
