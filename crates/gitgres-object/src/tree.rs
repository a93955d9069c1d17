//! Tree object content parsing.
//!
//! Tree content is a sequence of binary records with no framing:
//!
//! ```text
//! <ascii-octal-mode> SP <name> NUL <20-byte oid>
//! ```
//!
//! The parser is a finite, forward-only iterator over the raw bytes. It
//! assumes nothing about entry order; consumers that need git's canonical
//! order sort by name themselves.

use bstr::{BStr, ByteSlice};
use gitgres_hash::ObjectId;

use crate::ObjectError;

/// A single decoded tree entry, borrowing from the tree content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry<'a> {
    /// ASCII octal mode exactly as stored (e.g. `"100644"`, `"40000"`).
    pub mode: &'a str,
    /// Entry name, raw bytes.
    pub name: &'a BStr,
    /// Object id of the entry target.
    pub oid: ObjectId,
}

/// Forward-only iterator over the entries of a tree object's content.
pub struct TreeIter<'a> {
    content: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> TreeIter<'a> {
    /// Iterate the entries of raw tree content (no object header).
    pub fn new(content: &'a [u8]) -> Self {
        Self {
            content,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = Result<TreeEntry<'a>, ObjectError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.content.len() {
            return None;
        }

        match parse_entry(self.content, self.pos) {
            Ok((entry, next)) => {
                self.pos = next;
                Some(Ok(entry))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode one entry starting at `pos`; returns the entry and the offset of
/// the next one.
fn parse_entry(content: &[u8], pos: usize) -> Result<(TreeEntry<'_>, usize), ObjectError> {
    let space = content[pos..]
        .find_byte(b' ')
        .map(|p| p + pos)
        .ok_or(ObjectError::MalformedTree {
            offset: pos,
            reason: "missing space after mode",
        })?;

    let mode = std::str::from_utf8(&content[pos..space]).map_err(|_| {
        ObjectError::MalformedTree {
            offset: pos,
            reason: "non-ASCII mode",
        }
    })?;

    let name_start = space + 1;
    let nul = content[name_start..]
        .find_byte(0)
        .map(|p| p + name_start)
        .ok_or(ObjectError::MalformedTree {
            offset: name_start,
            reason: "missing NUL after name",
        })?;

    // The 20 OID bytes must all be present; a record even one byte short
    // is truncated.
    if nul + 21 > content.len() {
        return Err(ObjectError::MalformedTree {
            offset: nul + 1,
            reason: "truncated oid",
        });
    }

    let oid = ObjectId::from_bytes(&content[nul + 1..nul + 21])?;

    Ok((
        TreeEntry {
            mode,
            name: content[name_start..nul].as_bstr(),
            oid,
        },
        nul + 21,
    ))
}

/// Rebuild raw tree content from decoded entries.
///
/// `reconstruct(TreeIter::new(content)) == content` for every well-formed
/// tree.
pub fn reconstruct<'a>(entries: impl IntoIterator<Item = TreeEntry<'a>>) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(entry.mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name);
        out.push(0);
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice;

    fn entry_bytes(mode: &str, name: &[u8], oid: &ObjectId) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(name);
        out.push(0);
        out.extend_from_slice(oid.as_bytes());
        out
    }

    fn blob_oid() -> ObjectId {
        ObjectId::from_hex("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap()
    }

    #[test]
    fn empty_tree_yields_nothing() {
        assert!(TreeIter::new(b"").next().is_none());
    }

    #[test]
    fn single_entry() {
        let oid = blob_oid();
        let data = entry_bytes("100644", b"hello.txt", &oid);
        let entries: Vec<_> = TreeIter::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mode, "100644");
        assert_eq!(entries[0].name, "hello.txt".as_bytes().as_bstr());
        assert_eq!(entries[0].oid, oid);
    }

    #[test]
    fn multiple_entries_in_stored_order() {
        let oid = blob_oid();
        let mut data = entry_bytes("100644", b"b.txt", &oid);
        data.extend_from_slice(&entry_bytes("40000", b"a-dir", &oid));
        let entries: Vec<_> = TreeIter::new(&data).collect::<Result<_, _>>().unwrap();
        // No sorting is imposed by the parser.
        assert_eq!(entries[0].name, "b.txt".as_bytes().as_bstr());
        assert_eq!(entries[1].name, "a-dir".as_bytes().as_bstr());
        assert_eq!(entries[1].mode, "40000");
    }

    #[test]
    fn names_are_raw_bytes() {
        let oid = blob_oid();
        let data = entry_bytes("100644", b"caf\xc3\xa9 \xff.txt", &oid);
        let entries: Vec<_> = TreeIter::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries[0].name.as_bytes(), b"caf\xc3\xa9 \xff.txt");
    }

    #[test]
    fn missing_space_fails() {
        let err = TreeIter::new(b"100644-no-space-here").next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ObjectError::MalformedTree { reason: "missing space after mode", .. }
        ));
    }

    #[test]
    fn missing_nul_fails() {
        let err = TreeIter::new(b"100644 name-without-nul").next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ObjectError::MalformedTree { reason: "missing NUL after name", .. }
        ));
    }

    #[test]
    fn truncated_oid_fails() {
        let oid = blob_oid();
        let mut data = entry_bytes("100644", b"f", &oid);
        data.pop(); // drop the last oid byte
        let err = TreeIter::new(&data).next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ObjectError::MalformedTree { reason: "truncated oid", .. }
        ));
    }

    #[test]
    fn exactly_20_oid_bytes_is_accepted() {
        // Boundary for the tail check: nul + 21 == len.
        let oid = blob_oid();
        let data = entry_bytes("100644", b"f", &oid);
        let entries: Vec<_> = TreeIter::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries[0].oid, oid);
    }

    #[test]
    fn error_stops_iteration() {
        let mut iter = TreeIter::new(b"100644 broken");
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn reconstruct_roundtrip() {
        let oid = blob_oid();
        let mut data = entry_bytes("100644", b"a", &oid);
        data.extend_from_slice(&entry_bytes("120000", b"link", &oid));
        data.extend_from_slice(&entry_bytes("40000", b"dir", &oid));

        let entries: Vec<_> = TreeIter::new(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(reconstruct(entries), data);
    }
}
