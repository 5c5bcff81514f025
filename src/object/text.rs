// Line cursor for the commit/tag text grammar.
//
// Each header field occupies one LF-terminated line starting with a fixed
// keyword and a space. Fields are read in a fixed order; a keyword mismatch
// at the expected position is `MissingField`, a bad value is
// `UnparsableField`. Values are raw bytes: git does not require messages,
// identities or extra headers to be UTF-8.

use bstr::BString;

use crate::hash::ObjectId;

use super::{ObjectError, ObjectKind};

pub(crate) struct FieldCursor<'a> {
    data: &'a [u8],
    pos: usize,
    kind: ObjectKind,
}

impl<'a> FieldCursor<'a> {
    pub fn new(kind: ObjectKind, data: &'a [u8]) -> Self {
        Self { data, pos: 0, kind }
    }

    /// The current line (without its LF), if a complete line remains.
    fn peek_line(&self) -> Option<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let lf = rest.iter().position(|&b| b == b'\n')?;
        Some(&rest[..lf])
    }

    fn value_of(&self, line: &'a [u8], field: &'static str) -> Option<&'a [u8]> {
        let key = field.as_bytes();
        if line.len() > key.len() && line.starts_with(key) && line[key.len()] == b' ' {
            Some(&line[key.len() + 1..])
        } else {
            None
        }
    }

    /// Consume a mandatory `field value` line and return the value.
    pub fn field(&mut self, field: &'static str) -> Result<&'a [u8], ObjectError> {
        match self.optional_field(field) {
            Some(value) => Ok(value),
            None => Err(ObjectError::MissingField {
                kind: self.kind,
                field,
                offset: self.pos,
            }),
        }
    }

    /// Consume a `field value` line only if the next line carries `field`.
    pub fn optional_field(&mut self, field: &'static str) -> Option<&'a [u8]> {
        let line = self.peek_line()?;
        let value = self.value_of(line, field)?;
        self.pos += line.len() + 1;
        Some(value)
    }

    /// Consume an arbitrary non-blank header line as `(key, value)`.
    /// Returns `None` at the blank separator line or at end of input.
    pub fn extra_header(&mut self) -> Option<(&'a [u8], &'a [u8])> {
        let line = self.peek_line()?;
        if line.is_empty() {
            return None;
        }
        self.pos += line.len() + 1;
        match line.iter().position(|&b| b == b' ') {
            Some(space) => Some((&line[..space], &line[space + 1..])),
            None => Some((line, &[])),
        }
    }

    /// Consume a continuation line (one starting with a space) and return
    /// it without the leading space.
    pub fn continuation(&mut self) -> Option<&'a [u8]> {
        let line = self.peek_line()?;
        let rest = line.strip_prefix(b" ")?;
        self.pos += line.len() + 1;
        Some(rest)
    }

    /// Consume the blank line separating headers from the message.
    pub fn blank_line(&mut self) -> Result<(), ObjectError> {
        if self.data.get(self.pos) == Some(&b'\n') {
            self.pos += 1;
            Ok(())
        } else {
            Err(ObjectError::MissingField {
                kind: self.kind,
                field: "blank line",
                offset: self.pos,
            })
        }
    }

    /// Everything after the current position, as the free-text message.
    pub fn message(self) -> BString {
        BString::from(&self.data[self.pos..])
    }

    pub fn unparsable(&self, field: &'static str, reason: &str) -> ObjectError {
        ObjectError::UnparsableField {
            kind: self.kind,
            field,
            offset: self.pos,
            reason: reason.to_string(),
        }
    }
}

/// Parse a 40-hex object id field value.
pub(crate) fn parse_id(
    cursor: &FieldCursor<'_>,
    field: &'static str,
    value: &[u8],
) -> Result<ObjectId, ObjectError> {
    if !value.iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)) {
        return Err(cursor.unparsable(field, "expected lowercase hex object id"));
    }
    let value = std::str::from_utf8(value).map_err(|_| cursor.unparsable(field, "not ASCII"))?;
    ObjectId::from_hex(value).map_err(|e| cursor.unparsable(field, &e.to_string()))
}

/// Append `key value\n`.
pub(crate) fn push_field(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    out.extend_from_slice(value);
    out.push(b'\n');
}
