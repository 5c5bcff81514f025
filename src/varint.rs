// Variable-length integers used by the delta and pack formats.
//
// Three encodings share the 7-bits-per-byte, MSB-continues layout:
//
// - Size varint (delta header): plain LEB128, least-significant group first.
// - Entry header (pack): the first byte carries a 3-bit type in bits 4-6 and
//   the low 4 bits of the size; continuation bytes add 7 bits each.
// - Offset varint (offset-delta base): most-significant group first, and
//   every non-final group is biased by one so that no value has two
//   encodings.

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

/// Overflow guard for the offset varint: if these bits are set before a
/// shift, the next `<< 7` would overflow.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Size varint (LEB128)
// ---------------------------------------------------------------------------

/// Append `num` as a LEB128 varint.
pub fn write_size(out: &mut Vec<u8>, mut num: u64) {
    loop {
        let byte = (num & 0x7F) as u8;
        num >>= 7;
        if num == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a LEB128 varint from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read_size(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        let group = u64::from(byte & 0x7F);
        if shift >= 64 || (shift > 0 && group >> (64 - shift) != 0) {
            return Err(VarIntError::Overflow);
        }
        val |= group << shift;
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
        shift += 7;
    }
    Err(VarIntError::Underflow)
}

/// Encoded byte-length of a size varint.
#[inline]
pub fn sizeof_size(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

// ---------------------------------------------------------------------------
// Pack entry header
// ---------------------------------------------------------------------------

/// Append a pack entry header: 3-bit `type_code` plus the uncompressed size.
pub fn write_entry_header(out: &mut Vec<u8>, type_code: u8, mut size: u64) {
    let mut byte = ((type_code & 0x07) << 4) | (size & 0x0F) as u8;
    size >>= 4;
    while size != 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7F) as u8;
        size >>= 7;
    }
    out.push(byte);
}

/// Decode a pack entry header. Returns `(type_code, size, bytes_consumed)`.
///
/// The size is reassembled least-significant first: 4 bits from the first
/// byte, then 7 bits from each continuation byte.
pub fn read_entry_header(data: &[u8]) -> Result<(u8, u64, usize), VarIntError> {
    let first = *data.first().ok_or(VarIntError::Underflow)?;
    let type_code = (first >> 4) & 0x07;
    let mut size = u64::from(first & 0x0F);
    let mut shift = 4u32;
    let mut byte = first;
    let mut consumed = 1;
    while byte & 0x80 != 0 {
        byte = *data.get(consumed).ok_or(VarIntError::Underflow)?;
        consumed += 1;
        let group = u64::from(byte & 0x7F);
        if shift >= 64 || group >> (64 - shift) != 0 {
            return Err(VarIntError::Overflow);
        }
        size |= group << shift;
        shift += 7;
    }
    Ok((type_code, size, consumed))
}

// ---------------------------------------------------------------------------
// Offset varint (offset-delta base distance)
// ---------------------------------------------------------------------------

/// Append `num` as an offset varint.
pub fn write_offset(out: &mut Vec<u8>, mut num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let mut i = MAX_VARINT_LEN - 1;
    buf[i] = (num & 0x7F) as u8;
    num >>= 7;
    while num != 0 {
        num -= 1;
        i -= 1;
        buf[i] = 0x80 | (num & 0x7F) as u8;
        num >>= 7;
    }
    out.extend_from_slice(&buf[i..]);
}

/// Decode an offset varint. Returns `(value, bytes_consumed)`.
pub fn read_offset(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut byte = *data.first().ok_or(VarIntError::Underflow)?;
    let mut val = u64::from(byte & 0x7F);
    let mut consumed = 1;
    while byte & 0x80 != 0 {
        byte = *data.get(consumed).ok_or(VarIntError::Underflow)?;
        consumed += 1;
        val = val.checked_add(1).ok_or(VarIntError::Overflow)?;
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
    }
    Ok((val, consumed))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Not enough input bytes to complete the integer.
    Underflow,
    /// Value would overflow the target integer type.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Underflow => write!(f, "varint underflow (truncated input)"),
            VarIntError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarIntError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
