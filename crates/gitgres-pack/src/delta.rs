//! Deltified object reconstruction.
//!
//! A delta stream opens with two base-128 size fields (the expected base
//! length and the promised result length) followed by a run of
//! instructions. Each instruction either copies a span of the base or
//! embeds literal bytes:
//!
//! ```text
//! 1lll_oooo ...   copy: bits select which offset/length bytes follow
//! 0nnn_nnnn ...   literal: n bytes of payload follow (n > 0)
//! ```

use crate::scan::Scanner;
use crate::PackError;

/// One decoded delta instruction. Literals borrow from the delta stream.
enum DeltaOp<'a> {
    /// Copy `len` bytes of the base starting at `from`.
    CopyBase { from: usize, len: usize },
    /// Emit these bytes as they are.
    Literal(&'a [u8]),
}

/// Reconstruct an object from its base and a delta stream.
///
/// Both declared sizes are enforced and every base copy is
/// bounds-checked, so a hostile delta cannot read outside the base or
/// lie about what it produces.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut scan = Scanner::new(delta);

    let declared_base = scan
        .size_field()
        .ok_or_else(|| malformed(&scan, "delta ends inside the base size field"))?;
    let promised = scan
        .size_field()
        .ok_or_else(|| malformed(&scan, "delta ends inside the result size field"))?;

    if declared_base != base.len() {
        return Err(malformed(
            &scan,
            format!(
                "delta was built for a {declared_base}-byte base, this one is {}",
                base.len()
            ),
        ));
    }

    let mut result = Vec::with_capacity(promised);
    while !scan.is_empty() {
        match next_op(&mut scan)? {
            DeltaOp::CopyBase { from, len } => {
                let end = from
                    .checked_add(len)
                    .filter(|&end| end <= base.len())
                    .ok_or_else(|| {
                        malformed(
                            &scan,
                            format!(
                                "copy of {len} bytes at {from} overruns the {}-byte base",
                                base.len()
                            ),
                        )
                    })?;
                result.extend_from_slice(&base[from..end]);
            }
            DeltaOp::Literal(bytes) => result.extend_from_slice(bytes),
        }
    }

    if result.len() != promised {
        return Err(malformed(
            &scan,
            format!("reconstruction produced {} bytes, delta promised {promised}", result.len()),
        ));
    }

    Ok(result)
}

/// Decode the instruction under the cursor.
fn next_op<'a>(scan: &mut Scanner<'a>) -> Result<DeltaOp<'a>, PackError> {
    let opcode = scan
        .take()
        .ok_or_else(|| malformed(scan, "empty instruction"))?;

    if opcode & 0x80 == 0 {
        if opcode == 0 {
            return Err(malformed(scan, "reserved opcode 0x00"));
        }
        let bytes = scan
            .take_n(opcode as usize)
            .ok_or_else(|| malformed(scan, "literal runs past the end of the delta"))?;
        return Ok(DeltaOp::Literal(bytes));
    }

    // Copy: opcode bits 0-3 select offset bytes, bits 4-6 length bytes.
    let from = sparse_le(scan, opcode, 0, 4)
        .ok_or_else(|| malformed(scan, "copy instruction truncated"))?;
    let len = match sparse_le(scan, opcode, 4, 3)
        .ok_or_else(|| malformed(scan, "copy instruction truncated"))?
    {
        // An all-zero length encodes the maximum span.
        0 => 0x10000,
        n => n,
    };
    Ok(DeltaOp::CopyBase { from, len })
}

/// Copy operands are stored sparsely: bit `lowest_bit + i` of the opcode
/// marks whether byte `i` of the little-endian value is present in the
/// stream at all.
fn sparse_le(scan: &mut Scanner<'_>, opcode: u8, lowest_bit: u32, width: u32) -> Option<usize> {
    let mut value = 0usize;
    for i in 0..width {
        if (opcode >> (lowest_bit + i)) & 1 != 0 {
            value |= (scan.take()? as usize) << (8 * i);
        }
    }
    Some(value)
}

fn malformed(scan: &Scanner<'_>, reason: impl Into<String>) -> PackError {
    PackError::InvalidDelta {
        offset: scan.consumed() as u64,
        reason: reason.into(),
    }
}

/// Encode a base-128 size field.
pub fn encode_size(mut value: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    loop {
        let septet = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(septet);
            return out;
        }
        out.push(septet | 0x80);
    }
}

/// Encode a copy instruction for a span of the base.
pub fn encode_copy_op(from: usize, len: usize) -> Vec<u8> {
    let mut opcode = 0x80u8;
    let mut operands = Vec::with_capacity(7);
    for i in 0..4 {
        let byte = (from >> (8 * i)) as u8;
        if byte != 0 {
            opcode |= 1 << i;
            operands.push(byte);
        }
    }
    for i in 0..3 {
        let byte = (len >> (8 * i)) as u8;
        if byte != 0 {
            opcode |= 1 << (4 + i);
            operands.push(byte);
        }
    }

    let mut out = Vec::with_capacity(1 + operands.len());
    out.push(opcode);
    out.extend_from_slice(&operands);
    out
}

/// Encode literal bytes, split into runs of at most 127.
pub fn encode_literal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 127 + 1);
    for run in data.chunks(127) {
        out.push(run.len() as u8);
        out.extend_from_slice(run);
    }
    out
}
