//! Known-answer vectors for the canonical object hash.

use gitgres_hash::{Hasher, ObjectId};

#[test]
fn known_blob_vectors() {
    for (content, hex) in [
        (&b""[..], "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"),
        (&b"hello"[..], "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0"),
        (&b"hello\n"[..], "ce013625030ba8dba906f756967f9e9ca394464a"),
    ] {
        let oid = Hasher::hash_object("blob", content).unwrap();
        assert_eq!(oid, ObjectId::from_hex(hex).unwrap(), "content {content:?}");
    }
}

#[test]
fn empty_tree_vector() {
    let oid = Hasher::hash_object("tree", b"").unwrap();
    assert_eq!(oid.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}

#[test]
fn size_is_content_length_not_header() {
    // The decimal length in the pre-image counts content bytes only.
    let content = vec![0u8; 1000];
    let oid = Hasher::hash_object("blob", &content).unwrap();
    let mut h = Hasher::new();
    h.update(b"blob 1000\0");
    h.update(&content);
    assert_eq!(h.finalize().unwrap(), oid);
}

#[test]
fn idempotent_across_calls() {
    let a = Hasher::hash_object_code(3, b"same bytes").unwrap();
    let b = Hasher::hash_object_code(3, b"same bytes").unwrap();
    assert_eq!(a, b);
}
