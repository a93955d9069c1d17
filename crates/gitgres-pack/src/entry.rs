//! Pack entry headers.
//!
//! Every entry opens with a lead byte carrying the object kind (bits
//! 4-6) and the low four bits of the inflated size; the size continues
//! seven bits per byte while the high bit is set. Delta entries follow
//! with their base reference: OFS_DELTA a biased big-endian distance
//! back to the base entry, REF_DELTA the base's 20-byte id.

use gitgres_hash::ObjectId;

use crate::scan::Scanner;
use crate::{PackEntryType, PackError};

/// Decoded header of one pack entry.
#[derive(Debug, Clone)]
pub struct PackEntry {
    pub kind: PackEntryType,
    /// Size of the entry's data once inflated.
    pub inflated_len: usize,
    /// Absolute pack offset where the zlib payload starts.
    pub payload_at: u64,
    /// Bytes the header itself occupies.
    pub header_len: usize,
}

/// Decode the header of the entry starting at absolute pack offset
/// `offset`; `bytes` is the pack sliced from that offset.
pub fn decode_entry(bytes: &[u8], offset: u64) -> Result<PackEntry, PackError> {
    let mut scan = Scanner::new(bytes);
    let corrupt = || PackError::CorruptEntry(offset);

    let lead = scan.take().ok_or_else(corrupt)?;
    let kind_bits = (lead >> 4) & 0x07;
    let inflated_len = decode_entry_size(lead, &mut scan).ok_or_else(corrupt)?;

    let kind = match kind_bits {
        1 => PackEntryType::Commit,
        2 => PackEntryType::Tree,
        3 => PackEntryType::Blob,
        4 => PackEntryType::Tag,
        6 => {
            let rewind = decode_base_distance(&mut scan).ok_or_else(corrupt)?;
            // The base must sit at or after the start of the pack.
            let base_offset = offset.checked_sub(rewind).ok_or_else(corrupt)?;
            PackEntryType::OfsDelta { base_offset }
        }
        7 => {
            let raw = scan.take_n(20).ok_or_else(corrupt)?;
            let base_oid = ObjectId::from_bytes(raw).map_err(|_| corrupt())?;
            PackEntryType::RefDelta { base_oid }
        }
        _ => return Err(corrupt()),
    };

    Ok(PackEntry {
        kind,
        inflated_len,
        payload_at: offset + scan.consumed() as u64,
        header_len: scan.consumed(),
    })
}

/// The size spreads across the lead byte's low nibble and any
/// continuation bytes, least-significant bits first.
fn decode_entry_size(lead: u8, scan: &mut Scanner<'_>) -> Option<usize> {
    let mut total = (lead & 0x0f) as usize;
    let mut width = 4u32;
    let mut more = lead & 0x80 != 0;
    while more {
        let byte = scan.take()?;
        total |= ((byte & 0x7f) as usize) << width;
        width += 7;
        more = byte & 0x80 != 0;
    }
    Some(total)
}

/// The OFS_DELTA operand: big-endian groups of seven bits, where every
/// continuation adds an implicit +1 so encodings of different lengths
/// never overlap.
fn decode_base_distance(scan: &mut Scanner<'_>) -> Option<u64> {
    let mut group = scan.take()?;
    let mut distance = (group & 0x7f) as u64;
    while group & 0x80 != 0 {
        group = scan.take()?;
        distance = ((distance + 1) << 7) | (group & 0x7f) as u64;
    }
    Some(distance)
}

/// Encode an entry header for the given kind bits and inflated size.
pub fn encode_header(kind_bits: u8, inflated_len: u64) -> Vec<u8> {
    // Lead byte takes the kind and the low size nibble; further size
    // bits follow seven at a time, each earlier byte flagged as
    // continued.
    let mut out = vec![(kind_bits << 4) | (inflated_len & 0x0f) as u8];
    let mut rest = inflated_len >> 4;
    while rest > 0 {
        let last = out.len() - 1;
        out[last] |= 0x80;
        out.push((rest & 0x7f) as u8);
        rest >>= 7;
    }
    out
}

/// Encode an OFS_DELTA base distance.
pub fn encode_base_distance(distance: u64) -> Vec<u8> {
    // Collect seven-bit groups from least significant up, undoing the
    // +1 bias the decoder re-applies, then emit them most significant
    // first. Ten groups cover any u64.
    let mut groups = [0u8; 10];
    let mut used = 0;
    let mut rest = distance;
    loop {
        groups[used] = (rest & 0x7f) as u8 | if used == 0 { 0 } else { 0x80 };
        used += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
        rest -= 1;
    }
    groups[..used].iter().rev().copied().collect()
}
