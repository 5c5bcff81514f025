// Pack entry headers.
//
//   byte 0:  C TTT SSSS    C = continuation, T = type code, S = size bits 0-3
//   byte n:  C SSSSSSS     further size bits, least-significant group first
//
// Offset-delta entries follow with the backward distance to their base as an
// offset varint; reference-delta entries with the base's 20-byte id.

use crate::hash::{ID_LEN, ObjectId};
use crate::object::ObjectKind;
use crate::varint;

use super::PackError;

/// Type code of a pack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Object(ObjectKind),
    OffsetDelta,
    RefDelta,
}

impl EntryType {
    pub const OFFSET_DELTA_CODE: u8 = 6;
    pub const REF_DELTA_CODE: u8 = 7;

    pub fn code(self) -> u8 {
        match self {
            EntryType::Object(kind) => kind.type_code(),
            EntryType::OffsetDelta => Self::OFFSET_DELTA_CODE,
            EntryType::RefDelta => Self::REF_DELTA_CODE,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            Self::OFFSET_DELTA_CODE => Some(EntryType::OffsetDelta),
            Self::REF_DELTA_CODE => Some(EntryType::RefDelta),
            _ => ObjectKind::from_type_code(code).map(EntryType::Object),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntryType::Object(kind) => kind.as_str(),
            EntryType::OffsetDelta => "ofs-delta",
            EntryType::RefDelta => "ref-delta",
        }
    }
}

/// Where a delta entry finds its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaBase {
    /// Bytes back from the delta entry's own start.
    Offset(u64),
    /// Content id; the base may live outside the pack.
    Id(ObjectId),
}

/// Decoded entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub entry_type: EntryType,
    /// Uncompressed size of the entry payload (object or delta stream).
    pub size: u64,
    pub base: Option<DeltaBase>,
}

impl EntryHeader {
    pub fn object(kind: ObjectKind, size: u64) -> Self {
        Self {
            entry_type: EntryType::Object(kind),
            size,
            base: None,
        }
    }

    pub fn delta(base: DeltaBase, size: u64) -> Self {
        let entry_type = match base {
            DeltaBase::Offset(_) => EntryType::OffsetDelta,
            DeltaBase::Id(_) => EntryType::RefDelta,
        };
        Self {
            entry_type,
            size,
            base: Some(base),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        varint::write_entry_header(out, self.entry_type.code(), self.size);
        match self.base {
            Some(DeltaBase::Offset(distance)) => varint::write_offset(out, distance),
            Some(DeltaBase::Id(id)) => out.extend_from_slice(id.as_bytes()),
            None => {}
        }
    }

    /// Parse the header at the front of `data`, which starts at pack offset
    /// `offset`. Returns the header and its encoded length.
    pub fn parse(data: &[u8], offset: u64) -> Result<(Self, usize), PackError> {
        let truncated = |_| PackError::Truncated {
            offset,
            what: "entry header",
        };
        let (code, size, mut used) = varint::read_entry_header(data).map_err(truncated)?;
        let entry_type =
            EntryType::from_code(code).ok_or(PackError::InvalidPackEntryType { code, offset })?;
        let base = match entry_type {
            EntryType::Object(_) => None,
            EntryType::OffsetDelta => {
                let (distance, n) = varint::read_offset(&data[used..]).map_err(truncated)?;
                used += n;
                Some(DeltaBase::Offset(distance))
            }
            EntryType::RefDelta => {
                let id = data
                    .get(used..used + ID_LEN)
                    .and_then(ObjectId::from_slice)
                    .ok_or(PackError::Truncated {
                        offset,
                        what: "reference-delta base id",
                    })?;
                used += ID_LEN;
                Some(DeltaBase::Id(id))
            }
        };
        Ok((
            Self {
                entry_type,
                size,
                base,
            },
            used,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes() {
        assert_eq!(EntryType::Object(ObjectKind::Commit).code(), 1);
        assert_eq!(EntryType::Object(ObjectKind::Tag).code(), 4);
        assert_eq!(EntryType::from_code(6), Some(EntryType::OffsetDelta));
        assert_eq!(EntryType::from_code(7), Some(EntryType::RefDelta));
        assert_eq!(EntryType::from_code(0), None);
        assert_eq!(EntryType::from_code(5), None);
    }

    #[test]
    fn offset_delta_header() {
        let header = EntryHeader::delta(DeltaBase::Offset(200), 20);
        let mut out = Vec::new();
        header.encode(&mut out);
        // type 6, size 20 = 0b1_0100: low nibble 4 + one continuation byte
        assert_eq!(out[..2], [0x80 | 0x60 | 0x04, 0x01]);
        assert_eq!(EntryHeader::parse(&out, 0).unwrap(), (header, out.len()));
    }

    #[test]
    fn ref_delta_header() {
        let id = ObjectId::from_bytes([0xAB; ID_LEN]);
        let header = EntryHeader::delta(DeltaBase::Id(id), 5);
        let mut out = Vec::new();
        header.encode(&mut out);
        assert_eq!(out.len(), 1 + ID_LEN);
        assert_eq!(EntryHeader::parse(&out, 0).unwrap(), (header, out.len()));
        assert!(matches!(
            EntryHeader::parse(&out[..10], 99),
            Err(PackError::Truncated { offset: 99, .. })
        ));
    }

    #[test]
    fn reserved_type_is_rejected() {
        assert!(matches!(
            EntryHeader::parse(&[0x50], 12),
            Err(PackError::InvalidPackEntryType { code: 5, offset: 12 })
        ));
    }
}
