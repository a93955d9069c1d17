//! Commit object content parsing.
//!
//! A commit is a header block terminated by the first blank line, followed
//! by the message. Header lines are `key SP value`; the recognised keys are
//! `tree` (exactly one), `parent` (any number, order preserved), `author`
//! and `committer` (exactly one each). Everything else, including
//! `encoding`, `gpgsig` with its space-prefixed continuation lines, and
//! any future header, passes through unexamined.

use bstr::{BString, ByteSlice};
use gitgres_hash::ObjectId;

use crate::{Identity, ObjectError};

/// The decoded header of a commit object, plus its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: ObjectId,
    /// Parent OIDs in header order; empty for a root commit.
    pub parents: Vec<ObjectId>,
    pub author: Identity,
    pub committer: Identity,
    /// Everything after the blank separator line, raw bytes.
    pub message: BString,
}

impl CommitInfo {
    /// Parse raw commit content (no `"commit <size>\0"` object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Identity> = None;
        let mut committer: Option<Identity> = None;

        let mut pos = 0;
        while pos < content.len() {
            // Blank line ends the header; the message begins after it.
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            if let Some(space) = line.find_byte(b' ') {
                let key = &line[..space];
                let value = &line[space + 1..];

                match key {
                    b"tree" => {
                        if tree.is_some() {
                            return Err(ObjectError::MalformedHeader(
                                "duplicate 'tree' header".into(),
                            ));
                        }
                        tree = Some(parse_oid_value(value, "tree")?);
                    }
                    b"parent" => {
                        parents.push(parse_oid_value(value, "parent")?);
                    }
                    b"author" => {
                        if author.is_some() {
                            return Err(ObjectError::MalformedHeader(
                                "duplicate 'author' header".into(),
                            ));
                        }
                        author = Some(Identity::parse(value.as_bstr())?);
                    }
                    b"committer" => {
                        if committer.is_some() {
                            return Err(ObjectError::MalformedHeader(
                                "duplicate 'committer' header".into(),
                            ));
                        }
                        committer = Some(Identity::parse(value.as_bstr())?);
                    }
                    // Unrecognised headers (and continuation lines, whose
                    // "key" is empty) are ignored.
                    _ => {}
                }
            }

            pos = line_end + 1;
        }

        let tree =
            tree.ok_or_else(|| ObjectError::MalformedHeader("missing 'tree' header".into()))?;
        let author =
            author.ok_or_else(|| ObjectError::MalformedHeader("missing 'author' header".into()))?;
        let committer = committer
            .ok_or_else(|| ObjectError::MalformedHeader("missing 'committer' header".into()))?;

        let message = BString::from(&content[pos.min(content.len())..]);

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message,
        })
    }

    /// First parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    /// A root commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

fn parse_oid_value(value: &[u8], key: &str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::MalformedHeader(format!("non-ASCII '{key}' value")))?;
    ObjectId::from_hex(hex)
        .map_err(|e| ObjectError::MalformedHeader(format!("bad '{key}' oid: {e}")))
}
