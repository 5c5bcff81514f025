// Loose objects: one zlib stream holding the full header-prefixed encoding.

use crate::compress::CompressBackend;
use crate::hash::{self, ObjectId};

use super::{ObjectError, RawObject, header};

/// Compress an object into its loose form.
pub fn encode(raw: &RawObject, backend: &dyn CompressBackend) -> Result<Vec<u8>, ObjectError> {
    Ok(backend.compress(&raw.encode())?)
}

/// Inflate a loose object and validate its header.
///
/// Trailing bytes after the zlib stream are rejected.
pub fn decode(bytes: &[u8], backend: &dyn CompressBackend) -> Result<(RawObject, ObjectId), ObjectError> {
    let inflated = backend.decompress(bytes, bytes.len().saturating_mul(2))?;
    if inflated.consumed != bytes.len() {
        return Err(ObjectError::MalformedHeader {
            reason: format!(
                "{} trailing bytes after the compressed stream",
                bytes.len() - inflated.consumed
            ),
        });
    }
    let id = hash::digest(&inflated.data);
    let (kind, payload) = header::split(&inflated.data)?;
    log::trace!("loose {kind} {id}: {} bytes", payload.len());
    Ok((RawObject::new(kind, payload), id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::ZlibBackend;
    use crate::object::ObjectKind;

    #[test]
    fn loose_roundtrip_keeps_id() {
        let backend = ZlibBackend::default();
        let raw = RawObject::new(ObjectKind::Blob, "what is up, doc?\n");
        let bytes = encode(&raw, &backend).unwrap();
        let (decoded, id) = decode(&bytes, &backend).unwrap();
        assert_eq!(decoded, raw);
        assert_eq!(id, raw.id());
        // `echo 'what is up, doc?' | git hash-object --stdin`
        assert_eq!(id.to_hex(), "7108f7ecb345ee9d0084193f147cdad4d2998293");
    }

    #[test]
    fn header_must_match_payload() {
        let backend = ZlibBackend::default();
        let bytes = backend.compress(b"blob 99\0short").unwrap();
        assert!(matches!(
            decode(&bytes, &backend),
            Err(ObjectError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let backend = ZlibBackend::default();
        let mut bytes = encode(&RawObject::new(ObjectKind::Blob, "x"), &backend).unwrap();
        bytes.push(0);
        assert!(decode(&bytes, &backend).is_err());
    }
}
