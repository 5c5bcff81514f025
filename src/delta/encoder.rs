// Instruction emission.
//
// Literals accumulate in a buffer of at most `MAX_INSERT` bytes and are
// flushed as one INSERT when the buffer fills or right before a COPY, so
// neighbouring unmatched blocks merge into a single instruction.

use crate::varint;

use super::CopyFlags;

/// Longest literal a single INSERT can carry.
pub const MAX_INSERT: usize = 0x7F;

/// Longest copy a single COPY can carry (24-bit size field).
pub const MAX_COPY: usize = 0xFF_FFFF;

/// Builds an instruction stream for a known base and target length.
pub struct InstructionWriter {
    out: Vec<u8>,
    literal: Vec<u8>,
}

impl InstructionWriter {
    pub fn new(base_len: usize, target_len: usize) -> Self {
        let header = varint::sizeof_size(base_len as u64) + varint::sizeof_size(target_len as u64);
        let mut out = Vec::with_capacity(header + target_len / 4);
        varint::write_size(&mut out, base_len as u64);
        varint::write_size(&mut out, target_len as u64);
        Self {
            out,
            literal: Vec::with_capacity(MAX_INSERT),
        }
    }

    /// Queue literal bytes.
    pub fn insert(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let room = MAX_INSERT - self.literal.len();
            let (now, rest) = bytes.split_at(room.min(bytes.len()));
            self.literal.extend_from_slice(now);
            bytes = rest;
            if self.literal.len() == MAX_INSERT {
                self.flush_literal();
            }
        }
    }

    /// Emit a copy of `len` bytes from base `offset`, split into chunks the
    /// size field can hold. `offset` plus every chunk start must fit in 32
    /// bits.
    pub fn copy(&mut self, mut offset: usize, mut len: usize) {
        self.flush_literal();
        while len > 0 {
            let chunk = len.min(MAX_COPY);
            self.emit_copy(offset as u32, chunk as u32);
            offset += chunk;
            len -= chunk;
        }
    }

    fn emit_copy(&mut self, offset: u32, size: u32) {
        let opcode_at = self.out.len();
        self.out.push(0);
        let mut flags = CopyFlags::COPY;
        for (i, byte) in offset.to_le_bytes().into_iter().enumerate() {
            if byte != 0 {
                flags |= CopyFlags::offset_byte(i);
                self.out.push(byte);
            }
        }
        for (i, byte) in size.to_le_bytes().into_iter().take(3).enumerate() {
            if byte != 0 {
                flags |= CopyFlags::size_byte(i);
                self.out.push(byte);
            }
        }
        self.out[opcode_at] = flags.bits();
    }

    fn flush_literal(&mut self) {
        if self.literal.is_empty() {
            return;
        }
        self.out.push(self.literal.len() as u8);
        self.out.extend_from_slice(&self.literal);
        self.literal.clear();
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush_literal();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_merge_until_full() {
        let mut writer = InstructionWriter::new(0, 130);
        writer.insert(&[b'a'; 100]);
        writer.insert(&[b'b'; 30]);
        let out = writer.finish();
        // header (0, 130) = 00 82 01
        assert_eq!(&out[..3], &[0x00, 0x82, 0x01]);
        assert_eq!(out[3], 127);
        assert_eq!(out[3 + 128], 3);
        assert_eq!(out.len(), 3 + 128 + 4);
    }

    #[test]
    fn copy_omits_zero_bytes() {
        let mut writer = InstructionWriter::new(0x20000, 0x10000);
        writer.copy(0x0001_0000, 0x0100);
        let out = writer.finish();
        // 0x80 | offset byte 2 | size byte 1
        assert_eq!(&out[out.len() - 3..], &[0x80 | 0x04 | 0x20, 0x01, 0x01]);
    }

    #[test]
    fn copy_at_zero_with_small_size() {
        let mut writer = InstructionWriter::new(17, 17);
        writer.copy(0, 17);
        assert_eq!(writer.finish(), [0x11, 0x11, 0x90, 0x11]);
    }

    #[test]
    fn long_copy_is_split() {
        let mut writer = InstructionWriter::new(0, 0);
        writer.copy(0, MAX_COPY + 5);
        let out = writer.finish();
        assert_eq!(&out[2..6], &[0xF0, 0xFF, 0xFF, 0xFF]);
        // second chunk: offset 0xFFFFFF, size 5
        assert_eq!(&out[6..], &[0x80 | 0x07 | 0x10, 0xFF, 0xFF, 0xFF, 0x05]);
    }

    #[test]
    fn copy_flushes_pending_literal() {
        let mut writer = InstructionWriter::new(10, 12);
        writer.insert(b"xy");
        writer.copy(0, 10);
        assert_eq!(writer.finish(), [0x0A, 0x0C, 0x02, b'x', b'y', 0x90, 0x0A]);
    }
}
