// Commit objects.
//
// Canonical text form:
//
//   tree <hex>
//   parent <hex>            (zero or more)
//   author <signature>
//   committer <signature>
//   <extra headers>         (optional, may carry continuation lines)
//
//   <message>

use std::collections::HashMap;

use bstr::BString;

use crate::hash::ObjectId;

use super::signature::Signature;
use super::text::{FieldCursor, parse_id, push_field};
use super::{ObjectError, ObjectHandle, ObjectKind, ObjectRef, Target};

/// A snapshot of a tree plus its ancestry and authorship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectRef,
    pub parents: Vec<ObjectRef>,
    pub author: Signature,
    /// Falls back to the author when absent.
    pub committer: Option<Signature>,
    /// Headers after `committer`, in order. Multi-line values hold their
    /// continuation lines joined with `\n`.
    pub extra_headers: Vec<(BString, BString)>,
    /// Raw bytes; an `encoding` header names the charset when not UTF-8.
    pub message: BString,
}

impl Commit {
    pub fn new(tree: impl Into<ObjectRef>, author: Signature, message: impl Into<BString>) -> Self {
        Self {
            tree: tree.into(),
            parents: Vec::new(),
            author,
            committer: None,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<ObjectRef>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn with_committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn with_header(mut self, key: impl Into<BString>, value: impl Into<BString>) -> Self {
        self.extra_headers.push((key.into(), value.into()));
        self
    }

    pub fn committer(&self) -> &Signature {
        self.committer.as_ref().unwrap_or(&self.author)
    }

    pub(crate) fn references(&self) -> impl Iterator<Item = &ObjectRef> {
        std::iter::once(&self.tree).chain(self.parents.iter())
    }

    pub(crate) fn resolve_references(&mut self, index: &HashMap<ObjectId, ObjectHandle>) {
        self.tree.resolve(index);
        for parent in &mut self.parents {
            parent.resolve(index);
        }
    }

    pub(crate) fn encode(
        &self,
        mut target: impl FnMut(&ObjectRef) -> Result<Target, ObjectError>,
    ) -> Result<Vec<u8>, ObjectError> {
        let tree = target(&self.tree)?;
        expect_kind(tree, ObjectKind::Tree, "tree")?;

        let mut out = Vec::new();
        push_field(&mut out, b"tree", tree.id.to_hex().as_bytes());
        for parent in &self.parents {
            let parent = target(parent)?;
            expect_kind(parent, ObjectKind::Commit, "parent")?;
            push_field(&mut out, b"parent", parent.id.to_hex().as_bytes());
        }
        push_field(&mut out, b"author", &self.author.to_bytes());
        push_field(&mut out, b"committer", &self.committer().to_bytes());
        for (key, value) in &self.extra_headers {
            if key.is_empty() || key.contains(&b' ') || key.contains(&b'\n') {
                return Err(ObjectError::InvalidObject {
                    kind: ObjectKind::Commit,
                    reason: format!("invalid header name {key:?}"),
                });
            }
            // Continuation lines are the key's value lines after the first,
            // each prefixed with a single space.
            out.extend_from_slice(key);
            for line in value.split(|&b| b == b'\n') {
                out.push(b' ');
                out.extend_from_slice(line);
                out.push(b'\n');
            }
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        Ok(out)
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut cursor = FieldCursor::new(ObjectKind::Commit, payload);

        let tree = cursor.field("tree")?;
        let tree = parse_id(&cursor, "tree", tree)?;

        let mut parents = Vec::new();
        while let Some(parent) = cursor.optional_field("parent") {
            parents.push(ObjectRef::Unresolved(parse_id(&cursor, "parent", parent)?));
        }

        let author = cursor.field("author")?;
        let author =
            Signature::parse(author).ok_or_else(|| cursor.unparsable("author", "invalid signature"))?;
        let committer = cursor.field("committer")?;
        let committer = Signature::parse(committer)
            .ok_or_else(|| cursor.unparsable("committer", "invalid signature"))?;

        let mut extra_headers = Vec::new();
        while let Some((key, value)) = cursor.extra_header() {
            let mut value = BString::from(value);
            while let Some(more) = cursor.continuation() {
                value.push(b'\n');
                value.extend_from_slice(more);
            }
            extra_headers.push((BString::from(key), value));
        }

        cursor.blank_line()?;
        let message = cursor.message();

        Ok(Self {
            tree: ObjectRef::Unresolved(tree),
            parents,
            author,
            committer: Some(committer),
            extra_headers,
            message,
        })
    }
}

fn expect_kind(target: Target, kind: ObjectKind, field: &str) -> Result<(), ObjectError> {
    match target.kind {
        Some(found) if found != kind => Err(ObjectError::InvalidObject {
            kind: ObjectKind::Commit,
            reason: format!("{field} must reference a {kind}, found a {found}"),
        }),
        _ => Ok(()),
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

    fn author() -> Signature {
        Signature::from_unix("Git Author", "author@git.com", 1_000_000_000, 60).unwrap()
    }

    #[test]
    fn committer_defaults_to_author() {
        let commit = Commit::new(id(1), author(), "msg\n");
        let text = String::from_utf8(commit.encode(unresolved).unwrap()).unwrap();
        let expected = format!(
            "tree {}\nauthor {sig}\ncommitter {sig}\n\nmsg\n",
            id(1),
            sig = author()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn decode_with_parents_and_headers() {
        let text = format!(
            "tree {}\nparent {}\nparent {}\nauthor A <a@x> 1 +0000\ncommitter C <c@x> 2 -0100\n\
             encoding ISO-8859-1\ngpgsig -----BEGIN-----\n line two\n -----END-----\n\nhello\n",
            id(1),
            id(2),
            id(3)
        );
        let commit = Commit::decode(text.as_bytes()).unwrap();
        assert_eq!(commit.tree, ObjectRef::Unresolved(id(1)));
        assert_eq!(
            commit.parents,
            [ObjectRef::Unresolved(id(2)), ObjectRef::Unresolved(id(3))]
        );
        assert_eq!(commit.committer().name, "C");
        assert_eq!(commit.extra_headers.len(), 2);
        assert_eq!(commit.extra_headers[1].1, "-----BEGIN-----\nline two\n-----END-----");
        assert_eq!(commit.message, "hello\n");

        let again = commit.encode(unresolved).unwrap();
        assert_eq!(again, text.as_bytes());
    }

    #[test]
    fn latin1_message_and_identity_roundtrip() {
        let mut text = format!("tree {}\n", id(1)).into_bytes();
        text.extend_from_slice(b"author Ren\xe9 <r@x> 1 +0100\ncommitter Ren\xe9 <r@x> 1 +0100\n");
        text.extend_from_slice(b"encoding ISO-8859-1\n\ncaf\xe9\n");

        let commit = Commit::decode(&text).unwrap();
        assert_eq!(commit.author.name, &b"Ren\xe9"[..]);
        let encoding = (BString::from("encoding"), BString::from("ISO-8859-1"));
        assert_eq!(commit.extra_headers, [encoding]);
        assert_eq!(commit.message, &b"caf\xe9\n"[..]);
        assert_eq!(commit.encode(unresolved).unwrap(), text);
    }

    #[test]
    fn missing_tree_is_reported() {
        let err = Commit::decode(b"author A <a@x> 1 +0000\n").unwrap_err();
        assert!(matches!(
            err,
            ObjectError::MissingField { field: "tree", offset: 0, .. }
        ));
    }

    #[test]
    fn missing_committer_is_reported() {
        let text = format!("tree {}\nauthor A <a@x> 1 +0000\n\nmsg", id(1));
        let err = Commit::decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ObjectError::MissingField { field: "committer", .. }));
    }

    #[test]
    fn bad_signature_is_unparsable() {
        let text = format!("tree {}\nauthor nobody\ncommitter A <a@x> 1 +0000\n\n", id(1));
        let err = Commit::decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ObjectError::UnparsableField { field: "author", .. }));
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        let text = format!(
            "tree {}\nauthor A <a@x> 1 +0000\ncommitter A <a@x> 1 +0000\n\n",
            id(0xab).to_hex().to_uppercase()
        );
        let err = Commit::decode(text.as_bytes()).unwrap_err();
        assert!(matches!(err, ObjectError::UnparsableField { field: "tree", .. }));
    }
}
