// Instruction parsing and execution.

use crate::varint;

use super::{CopyFlags, DeltaError};

/// Size used by a COPY whose size bytes are all absent or zero.
pub const DEFAULT_COPY_SIZE: u64 = 0x10000;

/// Cap on the output buffer pre-allocated from an untrusted header.
const MAX_PREALLOC: u64 = 1 << 24;

/// The two sizes at the front of every instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaHeader {
    pub base_len: u64,
    pub target_len: u64,
}

impl DeltaHeader {
    /// Parse the header, returning it and its encoded length.
    pub fn parse(delta: &[u8]) -> Result<(Self, usize), DeltaError> {
        let (base_len, first) = varint::read_size(delta)?;
        let (target_len, second) = varint::read_size(&delta[first..])?;
        Ok((
            Self {
                base_len,
                target_len,
            },
            first + second,
        ))
    }
}

/// Parse the header and return an iterator over the instructions behind it.
pub fn instructions(delta: &[u8]) -> Result<(DeltaHeader, Instructions<'_>), DeltaError> {
    let (header, used) = DeltaHeader::parse(delta)?;
    Ok((header, Instructions::new(delta, used)))
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    Copy { offset: u64, len: u64 },
    Insert(&'a [u8]),
}

/// Iterator over the instructions after the header.
pub struct Instructions<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            failed: false,
        }
    }

    /// Byte offset of the next instruction within the stream.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn next_byte(&mut self, opcode_at: usize) -> Result<u8, DeltaError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(DeltaError::Truncated { offset: opcode_at })?;
        self.pos += 1;
        Ok(byte)
    }

    fn decode(&mut self) -> Result<Instruction<'a>, DeltaError> {
        let opcode_at = self.pos;
        let opcode = self.next_byte(opcode_at)?;
        if opcode == 0 {
            return Err(DeltaError::InvalidDeltaOpcode { offset: opcode_at });
        }
        let flags = CopyFlags::from_bits_retain(opcode);
        if !flags.contains(CopyFlags::COPY) {
            let len = usize::from(opcode);
            let literal = self
                .data
                .get(self.pos..self.pos + len)
                .ok_or(DeltaError::Truncated { offset: opcode_at })?;
            self.pos += len;
            return Ok(Instruction::Insert(literal));
        }

        let mut offset = 0u64;
        for i in 0..4 {
            if flags.contains(CopyFlags::offset_byte(i)) {
                offset |= u64::from(self.next_byte(opcode_at)?) << (8 * i);
            }
        }
        let mut len = 0u64;
        for i in 0..3 {
            if flags.contains(CopyFlags::size_byte(i)) {
                len |= u64::from(self.next_byte(opcode_at)?) << (8 * i);
            }
        }
        if len == 0 {
            len = DEFAULT_COPY_SIZE;
        }
        Ok(Instruction::Copy { offset, len })
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, DeltaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let item = self.decode();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Rebuild the target from `base` and an instruction stream.
pub fn patch(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let (header, start) = DeltaHeader::parse(delta)?;
    if header.base_len != base.len() as u64 {
        return Err(DeltaError::BaseLengthMismatch {
            expected: header.base_len,
            actual: base.len() as u64,
        });
    }

    let mut out = Vec::with_capacity(header.target_len.min(MAX_PREALLOC) as usize);
    for instruction in Instructions::new(delta, start) {
        let piece = match instruction? {
            Instruction::Insert(literal) => literal,
            Instruction::Copy { offset, len } => {
                let end = offset
                    .checked_add(len)
                    .filter(|&end| end <= base.len() as u64)
                    .ok_or(DeltaError::CopyOutOfBounds {
                        offset,
                        len,
                        base_len: base.len() as u64,
                    })?;
                &base[offset as usize..end as usize]
            }
        };
        let produced = (out.len() + piece.len()) as u64;
        if produced > header.target_len {
            return Err(DeltaError::OutputLengthMismatch {
                expected: header.target_len,
                actual: produced,
            });
        }
        out.extend_from_slice(piece);
    }

    if out.len() as u64 != header.target_len {
        return Err(DeltaError::OutputLengthMismatch {
            expected: header.target_len,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}
