// Annotated tag objects.
//
//   object <hex>
//   type <blob|tree|commit>
//   tag <name>
//   tagger <signature>      (optional)
//
//   <message>

use std::collections::HashMap;

use bstr::BString;

use crate::hash::ObjectId;

use super::signature::Signature;
use super::text::{FieldCursor, parse_id, push_field};
use super::{ObjectError, ObjectHandle, ObjectKind, ObjectRef, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: ObjectRef,
    /// Kind of the tagged object. Required when `target` is unresolved,
    /// otherwise taken from the referenced object.
    pub target_kind: Option<ObjectKind>,
    pub name: BString,
    pub tagger: Option<Signature>,
    pub message: BString,
}

impl Tag {
    pub fn new(
        target: impl Into<ObjectRef>,
        name: impl Into<BString>,
        tagger: Signature,
        message: impl Into<BString>,
    ) -> Self {
        Self {
            target: target.into(),
            target_kind: None,
            name: name.into(),
            tagger: Some(tagger),
            message: message.into(),
        }
    }

    pub fn with_target_kind(mut self, kind: ObjectKind) -> Self {
        self.target_kind = Some(kind);
        self
    }

    pub(crate) fn references(&self) -> impl Iterator<Item = &ObjectRef> {
        std::iter::once(&self.target)
    }

    pub(crate) fn resolve_references(&mut self, index: &HashMap<ObjectId, ObjectHandle>) {
        self.target.resolve(index);
    }

    pub(crate) fn encode(
        &self,
        mut target: impl FnMut(&ObjectRef) -> Result<Target, ObjectError>,
    ) -> Result<Vec<u8>, ObjectError> {
        let resolved = target(&self.target)?;
        let kind = match (resolved.kind, self.target_kind) {
            (Some(found), Some(declared)) if found != declared => {
                return Err(invalid(format!(
                    "declared target type {declared} but target is a {found}"
                )));
            }
            (Some(kind), _) | (None, Some(kind)) => kind,
            (None, None) => return Err(invalid("unresolved target has no type".to_string())),
        };
        if kind == ObjectKind::Tag {
            return Err(invalid("tag target must be a blob, tree or commit".to_string()));
        }
        if self.name.is_empty() || self.name.contains(&b'\n') {
            return Err(invalid(format!("invalid tag name {:?}", self.name)));
        }

        let mut out = Vec::new();
        push_field(&mut out, b"object", resolved.id.to_hex().as_bytes());
        push_field(&mut out, b"type", kind.as_str().as_bytes());
        push_field(&mut out, b"tag", &self.name);
        if let Some(tagger) = &self.tagger {
            push_field(&mut out, b"tagger", &tagger.to_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        Ok(out)
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut cursor = FieldCursor::new(ObjectKind::Tag, payload);

        let object = cursor.field("object")?;
        let object = parse_id(&cursor, "object", object)?;

        let kind = cursor.field("type")?;
        let kind = match std::str::from_utf8(kind).map(str::parse::<ObjectKind>) {
            Ok(Ok(kind)) if kind != ObjectKind::Tag => kind,
            _ => return Err(cursor.unparsable("type", "expected blob, tree or commit")),
        };

        let name = BString::from(cursor.field("tag")?);

        let tagger = match cursor.optional_field("tagger") {
            Some(value) => Some(
                Signature::parse(value)
                    .ok_or_else(|| cursor.unparsable("tagger", "invalid signature"))?,
            ),
            None => None,
        };

        cursor.blank_line()?;
        let message = cursor.message();

        Ok(Self {
            target: ObjectRef::Unresolved(object),
            target_kind: Some(kind),
            name,
            tagger,
            message,
        })
    }
}

fn invalid(reason: String) -> ObjectError {
    ObjectError::InvalidObject {
        kind: ObjectKind::Tag,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ID_LEN;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; ID_LEN])
    }

    fn unresolved(r: &ObjectRef) -> Result<Target, ObjectError> {
        match r {
            ObjectRef::Unresolved(id) => Ok(Target { kind: None, id: *id }),
            ObjectRef::Resolved(_) => unreachable!(),
        }
    }

    fn tagger() -> Signature {
        Signature::from_unix("Git Tagger", "tagger@git.com", 1_300_000_000, -180).unwrap()
    }

    #[test]
    fn encode_decode() {
        let tag = Tag::new(id(9), "v1.0", tagger(), "release\n").with_target_kind(ObjectKind::Commit);
        let bytes = tag.encode(unresolved).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(
            text,
            format!(
                "object {}\ntype commit\ntag v1.0\ntagger {}\n\nrelease\n",
                id(9),
                tagger()
            )
        );
        assert_eq!(Tag::decode(&bytes).unwrap(), tag);
    }

    #[test]
    fn unresolved_target_needs_a_kind() {
        let mut tag = Tag::new(id(9), "v1", tagger(), "");
        tag.target_kind = None;
        assert!(matches!(
            tag.encode(unresolved),
            Err(ObjectError::InvalidObject { .. })
        ));
    }

    #[test]
    fn tag_of_tag_is_rejected() {
        let tag = Tag::new(id(9), "v1", tagger(), "").with_target_kind(ObjectKind::Tag);
        assert!(tag.encode(unresolved).is_err());

        let text = format!("object {}\ntype tag\ntag v1\n\n", id(9));
        assert!(matches!(
            Tag::decode(text.as_bytes()),
            Err(ObjectError::UnparsableField { field: "type", .. })
        ));
    }

    #[test]
    fn tagger_is_optional_on_decode() {
        let text = format!("object {}\ntype blob\ntag light\n\nnote", id(4));
        let tag = Tag::decode(text.as_bytes()).unwrap();
        assert!(tag.tagger.is_none());
        assert_eq!(tag.message, "note");
        assert_eq!(tag.encode(unresolved).unwrap(), text.as_bytes());
    }

    #[test]
    fn non_utf8_tag_roundtrips() {
        let mut text = format!("object {}\ntype blob\n", id(4)).into_bytes();
        text.extend_from_slice(b"tag v\xff\ntagger T <t@x> 7 +0000\n\n\xe9t\xe9\n");
        let tag = Tag::decode(&text).unwrap();
        assert_eq!(tag.name, &b"v\xff"[..]);
        assert_eq!(tag.encode(unresolved).unwrap(), text);
    }

    #[test]
    fn missing_name_is_reported() {
        let text = format!("object {}\ntype blob\ntagger A <a@x> 1 +0000\n\n", id(4));
        assert!(matches!(
            Tag::decode(text.as_bytes()),
            Err(ObjectError::MissingField { field: "tag", .. })
        ));
    }
}
