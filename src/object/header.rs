// Loose-object header framing: `"<type> <decimal length>\0<payload>"`.
//
// Pack entries never carry this header; it only exists in the hashed form
// and in loose objects.

use super::{ObjectError, ObjectKind};

/// Longest header we are willing to scan for: "commit " + 20 digits.
const MAX_HEADER_LEN: usize = 32;

/// Render the header (including the NUL separator) for a payload.
pub fn encode(kind: ObjectKind, payload_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAX_HEADER_LEN);
    out.extend_from_slice(kind.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload_len.to_string().as_bytes());
    out.push(0);
    out
}

/// Parse and validate a header, returning the kind and the payload that
/// follows it. The declared length must equal the payload length exactly.
pub fn split(data: &[u8]) -> Result<(ObjectKind, &[u8]), ObjectError> {
    let scan = &data[..data.len().min(MAX_HEADER_LEN)];
    let nul = scan
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed("missing NUL separator"))?;
    let header = std::str::from_utf8(&data[..nul]).map_err(|_| malformed("header is not ASCII"))?;
    let (name, len) = header
        .split_once(' ')
        .ok_or_else(|| malformed("missing space between type and length"))?;
    let kind: ObjectKind = name
        .parse()
        .map_err(|_| malformed(&format!("unknown object type {name:?}")))?;
    if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(&format!("invalid length {len:?}")));
    }
    let declared: usize = len
        .parse()
        .map_err(|_| malformed(&format!("length {len} out of range")))?;
    let payload = &data[nul + 1..];
    if declared != payload.len() {
        return Err(malformed(&format!(
            "declared length {declared} but payload has {} bytes",
            payload.len()
        )));
    }
    Ok((kind, payload))
}

/// Accept `data` with or without a header.
///
/// A header is assumed present when `data` starts with `"<any kind> "`; it
/// is then validated against `kind` and the payload length.
pub fn strip(kind: ObjectKind, data: &[u8]) -> Result<&[u8], ObjectError> {
    if !starts_with_header(data) {
        return Ok(data);
    }
    let (found, payload) = split(data)?;
    if found != kind {
        return Err(malformed(&format!("expected a {kind} header, found {found}")));
    }
    Ok(payload)
}

fn starts_with_header(data: &[u8]) -> bool {
    ObjectKind::ALL.iter().any(|kind| {
        let name = kind.as_str().as_bytes();
        data.len() > name.len() && data.starts_with(name) && data[name.len()] == b' '
    })
}

fn malformed(reason: &str) -> ObjectError {
    ObjectError::MalformedHeader {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_git_format() {
        assert_eq!(encode(ObjectKind::Blob, 11), b"blob 11\0");
        assert_eq!(encode(ObjectKind::Tree, 0), b"tree 0\0");
    }

    #[test]
    fn split_validates_length() {
        let (kind, payload) = split(b"blob 3\0abc").unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(payload, b"abc");

        assert!(matches!(
            split(b"blob 4\0abc"),
            Err(ObjectError::MalformedHeader { .. })
        ));
        assert!(matches!(
            split(b"blob\0abc"),
            Err(ObjectError::MalformedHeader { .. })
        ));
        assert!(matches!(
            split(b"blob +3\0abc"),
            Err(ObjectError::MalformedHeader { .. })
        ));
        assert!(matches!(
            split(b"blurb 3\0abc"),
            Err(ObjectError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn strip_tolerates_missing_header() {
        assert_eq!(strip(ObjectKind::Blob, b"abc").unwrap(), b"abc");
        assert_eq!(strip(ObjectKind::Blob, b"blob 3\0abc").unwrap(), b"abc");
    }

    #[test]
    fn strip_rejects_inconsistent_header() {
        assert!(matches!(
            strip(ObjectKind::Tag, b"tag 99\0short"),
            Err(ObjectError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn strip_rejects_header_of_another_kind() {
        match strip(ObjectKind::Blob, b"tree 3\0abc") {
            Err(ObjectError::MalformedHeader { reason }) => {
                assert!(reason.contains("found tree"), "{reason}")
            }
            other => panic!("expected MalformedHeader, got {other:?}"),
        }
        assert_eq!(strip(ObjectKind::Blob, b"treehouse").unwrap(), b"treehouse");
    }
}
