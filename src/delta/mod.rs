// Git delta codec: encode a target buffer as COPY/INSERT instructions
// against a base buffer, and replay them.
//
// Stream layout:
//   size(base) size(target)       LEB128
//   instruction*
//
// Opcode byte, high bit set = COPY:
//   bits 0-3 gate offset bytes 0-3 (little-endian)
//   bits 4-6 gate size bytes 0-2, absent size means 0x10000
// High bit clear, non-zero = INSERT of the next `opcode` literal bytes.
// A zero opcode is invalid.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod index;

pub use config::MatcherConfig;
pub use decoder::{DeltaHeader, Instruction, Instructions, instructions, patch};

use crate::varint::VarIntError;

use encoder::InstructionWriter;
use index::{BlockIndex, block_end};

bitflags::bitflags! {
    /// Bits of a COPY opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CopyFlags: u8 {
        const OFFSET0 = 0x01;
        const OFFSET1 = 0x02;
        const OFFSET2 = 0x04;
        const OFFSET3 = 0x08;
        const SIZE0 = 0x10;
        const SIZE1 = 0x20;
        const SIZE2 = 0x40;
        const COPY = 0x80;
    }
}

impl CopyFlags {
    /// Flag gating offset byte `i` (0-3).
    pub fn offset_byte(i: usize) -> Self {
        Self::from_bits_retain(Self::OFFSET0.bits() << i)
    }

    /// Flag gating size byte `i` (0-2).
    pub fn size_byte(i: usize) -> Self {
        Self::from_bits_retain(Self::SIZE0.bits() << i)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    #[error("invalid delta opcode 0x00 at offset {offset}")]
    InvalidDeltaOpcode { offset: usize },
    #[error("delta expects a {expected}-byte base, got {actual} bytes")]
    BaseLengthMismatch { expected: u64, actual: u64 },
    #[error("delta declares a {expected}-byte result, produced {actual} bytes")]
    OutputLengthMismatch { expected: u64, actual: u64 },
    #[error("instruction at offset {offset} runs past the end of the delta")]
    Truncated { offset: usize },
    #[error("copy of {len} bytes at {offset} exceeds the {base_len}-byte base")]
    CopyOutOfBounds { offset: u64, len: u64, base_len: u64 },
    #[error("delta header: {0}")]
    VarInt(#[from] VarIntError),
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// COPY offsets are 32-bit, so no copy may extend past this base position.
const COPY_REACH: u64 = 1 << 32;

/// Encode `target` as instructions against `base` with the default matcher.
pub fn diff(base: &[u8], target: &[u8]) -> Vec<u8> {
    diff_with_config(base, target, &MatcherConfig::default())
}

/// Encode `target` as instructions against `base`.
///
/// The target is walked block by block (same block rule as the base). Each
/// block is looked up in the base index; every candidate is extended forward
/// as far as base and target agree and the longest wins, earliest offset on
/// ties. Blocks without a match of at least `min_match` bytes become
/// literals.
pub fn diff_with_config(base: &[u8], target: &[u8], config: &MatcherConfig) -> Vec<u8> {
    let index = BlockIndex::new(base, config.max_block);
    let long_enough = config.long_enough(base.len());
    let reach = &base[..(base.len() as u64).min(COPY_REACH) as usize];

    let mut writer = InstructionWriter::new(base.len(), target.len());
    let mut copies = 0usize;
    let mut pos = 0;
    while pos < target.len() {
        let end = block_end(target, pos, config.max_block);
        let block = &target[pos..end];

        let mut best = (0, 0);
        for candidate in index.candidates(block) {
            let len = common_prefix(&reach[candidate..], &target[pos..]);
            if len > best.1 {
                best = (candidate, len);
                if len > long_enough {
                    break;
                }
            }
        }

        let (offset, len) = best;
        if len >= config.min_match.max(1) {
            writer.copy(offset, len);
            copies += 1;
            pos += len;
        } else {
            writer.insert(block);
            pos = end;
        }
    }

    let out = writer.finish();
    log::trace!(
        "delta: base {} bytes, target {} bytes, {} copies, {} bytes encoded",
        base.len(),
        target.len(),
        copies,
        out.len()
    );
    out
}

#[inline]
fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapped_lines() {
        let a = b"text file line 1\ntext file line 2\na";
        let b = b"text file line 2\ntext file line 1\nab";
        let delta = diff(a, b);
        assert_eq!(hex::encode(&delta), "23249111119011026162");
        assert_eq!(patch(a, &delta).unwrap(), b);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(diff(b"", b""), [0, 0]);
        let delta = diff(b"", b"new");
        assert_eq!(delta, [0, 3, 3, b'n', b'e', b'w']);
        assert_eq!(patch(b"", &delta).unwrap(), b"new");
        let delta = diff(b"old", b"");
        assert_eq!(patch(b"old", &delta).unwrap(), b"");
    }

    #[test]
    fn short_matches_become_literals() {
        // "ab\n" matches a 3-byte base block, below the 4-byte minimum.
        let delta = diff(b"ab\nxyz", b"ab\n");
        assert_eq!(delta, [6, 3, 3, b'a', b'b', b'\n']);
    }

    #[test]
    fn custom_config_lowers_min_match() {
        let config = MatcherConfig {
            min_match: 1,
            ..MatcherConfig::default()
        };
        let delta = diff_with_config(b"ab\nxyz", b"ab\n", &config);
        assert_eq!(delta, [6, 3, 0x90, 3]);
    }

    #[test]
    fn longest_candidate_wins() {
        let base = b"x\nx\nyy\n";
        let target = b"x\nyy\n";
        // "x\n" at 0 extends 2 bytes, at 2 it extends to "x\nyy\n".
        let exhaustive = MatcherConfig {
            long_enough_divisor: 0,
            ..MatcherConfig::default()
        };
        let delta = diff_with_config(base, target, &exhaustive);
        assert_eq!(delta, [7, 5, 0x91, 2, 5]);

        // With the default early exit the 2-byte match at 0 ends the search
        // and is too short to copy, as is the trailing "yy\n".
        let delta = diff(base, target);
        assert_eq!(delta, [7, 5, 5, b'x', b'\n', b'y', b'y', b'\n']);
    }

    #[test]
    fn copy_flag_helpers() {
        assert_eq!(CopyFlags::offset_byte(3), CopyFlags::OFFSET3);
        assert_eq!(CopyFlags::size_byte(2), CopyFlags::SIZE2);
    }
}
