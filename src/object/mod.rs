// Git object model: blobs, trees, commits and tags.
//
// Objects live in an `ObjectGraph` arena and reference each other through
// `ObjectRef`, which is either a handle into the arena or a bare object id
// for objects decoded without their referents. Serialization walks the graph
// depth-first and memoizes by handle, so a shared child is encoded and hashed
// once per `Serializer`.
//
// Canonical encoding of every object: "<type> <len>\0<payload>", hashed with
// SHA-1 to produce its id.

pub mod blob;
pub mod commit;
pub mod header;
pub mod loose;
pub mod signature;
pub mod tag;
pub mod tree;

mod text;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::str::FromStr;

use crate::compress::DecompressError;
use crate::delta;
use crate::hash::{self, ObjectId};

pub use blob::Blob;
pub use commit::Commit;
pub use signature::Signature;
pub use tag::Tag;
pub use tree::{EntryMode, Tree, TreeEntry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("malformed object header: {reason}")]
    MalformedHeader { reason: String },
    #[error("{kind} is missing `{field}` at offset {offset}")]
    MissingField {
        kind: ObjectKind,
        field: &'static str,
        offset: usize,
    },
    #[error("{kind} field `{field}` at offset {offset} is unparsable: {reason}")]
    UnparsableField {
        kind: ObjectKind,
        field: &'static str,
        offset: usize,
        reason: String,
    },
    #[error("invalid tree encoding at offset {offset}: {reason}")]
    InvalidTreeEncoding { offset: usize, reason: String },
    #[error("invalid {kind}: {reason}")]
    InvalidObject { kind: ObjectKind, reason: String },
    #[error("cannot diff a {target} against a {base}")]
    KindMismatch { target: ObjectKind, base: ObjectKind },
    #[error("no object with handle {0}")]
    UnknownHandle(usize),
    #[error("unknown object type {0:?}")]
    UnknownKind(String),
    #[error("loose object: {0}")]
    Decompress(#[from] DecompressError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Kinds, handles and references
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 4] = [
        ObjectKind::Commit,
        ObjectKind::Tree,
        ObjectKind::Blob,
        ObjectKind::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }

    /// Pack entry type code (1-4).
    pub fn type_code(self) -> u8 {
        match self {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Blob => 3,
            ObjectKind::Tag => 4,
        }
    }

    pub fn from_type_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ObjectKind::Commit),
            2 => Some(ObjectKind::Tree),
            3 => Some(ObjectKind::Blob),
            4 => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ObjectError::UnknownKind(s.to_string()))
    }
}

/// Stable index of an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(usize);

impl ObjectHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A reference from one object to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    /// Known only by id; the referent is not in the graph (yet).
    Unresolved(ObjectId),
    /// Points at an object in the same graph.
    Resolved(ObjectHandle),
}

impl ObjectRef {
    /// Rewrite an unresolved id to a handle if `index` knows it. Resolved
    /// references and unknown ids are left untouched.
    pub fn resolve(&mut self, index: &HashMap<ObjectId, ObjectHandle>) {
        if let ObjectRef::Unresolved(id) = self
            && let Some(&handle) = index.get(id)
        {
            *self = ObjectRef::Resolved(handle);
        }
    }

    pub fn handle(&self) -> Option<ObjectHandle> {
        match self {
            ObjectRef::Resolved(handle) => Some(*handle),
            ObjectRef::Unresolved(_) => None,
        }
    }
}

impl From<ObjectHandle> for ObjectRef {
    fn from(handle: ObjectHandle) -> Self {
        ObjectRef::Resolved(handle)
    }
}

impl From<ObjectId> for ObjectRef {
    fn from(id: ObjectId) -> Self {
        ObjectRef::Unresolved(id)
    }
}

/// What an encoder learns about a referenced object: its id, and its kind
/// when the reference is resolved.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target {
    pub kind: Option<ObjectKind>,
    pub id: ObjectId,
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tag(_) => ObjectKind::Tag,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Object::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Object::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Object::Commit(commit) => Some(commit),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Object::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    /// Every outgoing reference, in encoding order.
    pub fn references(&self) -> Vec<&ObjectRef> {
        match self {
            Object::Blob(_) => Vec::new(),
            Object::Tree(tree) => tree.references().collect(),
            Object::Commit(commit) => commit.references().collect(),
            Object::Tag(tag) => tag.references().collect(),
        }
    }

    /// Rewrite unresolved references found in `index`. Idempotent; ids
    /// missing from `index` stay unresolved.
    pub fn resolve_references(&mut self, index: &HashMap<ObjectId, ObjectHandle>) {
        match self {
            Object::Blob(_) => {}
            Object::Tree(tree) => tree.resolve_references(index),
            Object::Commit(commit) => commit.resolve_references(index),
            Object::Tag(tag) => tag.resolve_references(index),
        }
    }

    fn encode_payload(
        &self,
        target: impl FnMut(&ObjectRef) -> Result<Target, ObjectError>,
    ) -> Result<Vec<u8>, ObjectError> {
        match self {
            Object::Blob(blob) => Ok(blob.content.clone()),
            Object::Tree(tree) => tree.encode(target),
            Object::Commit(commit) => commit.encode(target),
            Object::Tag(tag) => tag.encode(target),
        }
    }

    /// Parse a payload that carries no header (the pack path).
    pub fn decode_payload(kind: ObjectKind, payload: &[u8]) -> Result<Self, ObjectError> {
        Ok(match kind {
            ObjectKind::Blob => Object::Blob(Blob::new(payload)),
            ObjectKind::Tree => Object::Tree(Tree::decode(payload)?),
            ObjectKind::Commit => Object::Commit(Commit::decode(payload)?),
            ObjectKind::Tag => Object::Tag(Tag::decode(payload)?),
        })
    }
}

impl From<Blob> for Object {
    fn from(blob: Blob) -> Self {
        Object::Blob(blob)
    }
}

impl From<Tree> for Object {
    fn from(tree: Tree) -> Self {
        Object::Tree(tree)
    }
}

impl From<Commit> for Object {
    fn from(commit: Commit) -> Self {
        Object::Commit(commit)
    }
}

impl From<Tag> for Object {
    fn from(tag: Tag) -> Self {
        Object::Tag(tag)
    }
}

/// Parse `data` as an object of `kind`, with or without a loose header.
/// Returns the object and its id.
pub fn decode(kind: ObjectKind, data: &[u8]) -> Result<(Object, ObjectId), ObjectError> {
    let payload = header::strip(kind, data)?;
    let object = Object::decode_payload(kind, payload)?;
    Ok((object, RawObject::id_of(kind, payload)))
}

/// Parse a header-prefixed encoding. The header is mandatory.
pub fn decode_loose(data: &[u8]) -> Result<(Object, ObjectId), ObjectError> {
    let (kind, payload) = header::split(data)?;
    let object = Object::decode_payload(kind, payload)?;
    Ok((object, RawObject::id_of(kind, payload)))
}

// ---------------------------------------------------------------------------
// Raw and serialized forms
// ---------------------------------------------------------------------------

/// An object's kind and header-less payload, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(kind: ObjectKind, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn id(&self) -> ObjectId {
        Self::id_of(self.kind, &self.data)
    }

    fn id_of(kind: ObjectKind, payload: &[u8]) -> ObjectId {
        hash::digest_parts(&[&header::encode(kind, payload.len()), payload])
    }

    /// Full header-prefixed encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = header::encode(self.kind, self.data.len());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(&self) -> Result<Object, ObjectError> {
        Object::decode_payload(self.kind, &self.data)
    }
}

/// Result of serializing one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedObject {
    kind: ObjectKind,
    id: ObjectId,
    data: Vec<u8>,
    payload_start: usize,
}

impl SerializedObject {
    fn new(kind: ObjectKind, payload: &[u8]) -> Self {
        let mut data = header::encode(kind, payload.len());
        let payload_start = data.len();
        data.extend_from_slice(payload);
        let id = hash::digest(&data);
        Self {
            kind,
            id,
            data,
            payload_start,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Header-prefixed encoding; the bytes that were hashed.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The encoding without its header, as stored in a pack.
    pub fn pack_payload(&self) -> &[u8] {
        &self.data[self.payload_start..]
    }

    pub fn to_raw(&self) -> RawObject {
        RawObject::new(self.kind, self.pack_payload())
    }
}

/// A delta that rebuilds one object from another of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDelta {
    pub kind: ObjectKind,
    pub base_id: ObjectId,
    pub target_id: ObjectId,
    pub instructions: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Arena owning a set of objects that reference each other by handle.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: Vec<Object>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: impl Into<Object>) -> ObjectHandle {
        self.objects.push(object.into());
        ObjectHandle(self.objects.len() - 1)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&Object> {
        self.objects.get(handle.0)
    }

    /// Mutable access. Ids computed before a mutation are stale afterwards.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object> {
        self.objects.get_mut(handle.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, object)| (ObjectHandle(i), object))
    }

    /// Start a serialization pass. Results are memoized for the lifetime of
    /// the returned serializer.
    pub fn serializer(&self) -> Serializer<'_> {
        Serializer::new(self)
    }

    pub fn serialize(&self, handle: ObjectHandle) -> Result<SerializedObject, ObjectError> {
        let mut serializer = self.serializer();
        let index = serializer.visit(handle)?;
        Ok(serializer.into_objects().swap_remove(index))
    }

    /// Every object reachable from `root`, children before parents, each once.
    pub fn serialize_all(&self, root: ObjectHandle) -> Result<Vec<SerializedObject>, ObjectError> {
        let mut serializer = self.serializer();
        serializer.visit(root)?;
        Ok(serializer.into_objects())
    }

    pub fn id(&self, handle: ObjectHandle) -> Result<ObjectId, ObjectError> {
        Ok(self.serializer().serialize(handle)?.id())
    }

    /// Delta that rebuilds `target` from `base`.
    pub fn diff(&self, target: ObjectHandle, base: ObjectHandle) -> Result<ObjectDelta, ObjectError> {
        let mut serializer = self.serializer();
        let target = serializer.visit(target)?;
        let base = serializer.visit(base)?;
        let (target, base) = (serializer.get(target), serializer.get(base));
        if target.kind != base.kind {
            return Err(ObjectError::KindMismatch {
                target: target.kind,
                base: base.kind,
            });
        }
        Ok(ObjectDelta {
            kind: target.kind,
            base_id: base.id,
            target_id: target.id,
            instructions: delta::diff(base.pack_payload(), target.pack_payload()),
        })
    }

    /// Link unresolved references to the objects `index` maps them to.
    pub fn resolve_references(&mut self, index: &HashMap<ObjectId, ObjectHandle>) {
        for object in &mut self.objects {
            object.resolve_references(index);
        }
    }
}

/// Depth-first serializer with per-handle memoization.
///
/// Serialized objects accumulate in post-order: every object appears after
/// all the objects it references.
pub struct Serializer<'g> {
    graph: &'g ObjectGraph,
    memo: HashMap<ObjectHandle, usize>,
    in_progress: HashSet<ObjectHandle>,
    done: Vec<SerializedObject>,
}

impl<'g> Serializer<'g> {
    pub fn new(graph: &'g ObjectGraph) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            done: Vec::new(),
        }
    }

    pub fn graph(&self) -> &'g ObjectGraph {
        self.graph
    }

    pub fn serialize(&mut self, handle: ObjectHandle) -> Result<&SerializedObject, ObjectError> {
        let index = self.visit(handle)?;
        Ok(&self.done[index])
    }

    /// Serialize `handle` and everything it references, returning its
    /// position in [`Serializer::objects`].
    pub fn visit(&mut self, handle: ObjectHandle) -> Result<usize, ObjectError> {
        if let Some(&index) = self.memo.get(&handle) {
            return Ok(index);
        }
        let graph = self.graph;
        let object = graph
            .get(handle)
            .ok_or(ObjectError::UnknownHandle(handle.0))?;
        if !self.in_progress.insert(handle) {
            return Err(ObjectError::InvalidObject {
                kind: object.kind(),
                reason: format!("reference cycle through handle {}", handle.0),
            });
        }
        let payload = object.encode_payload(|reference| self.target(reference));
        self.in_progress.remove(&handle);

        let serialized = SerializedObject::new(object.kind(), &payload?);
        log::trace!(
            "serialized {} {} ({} bytes)",
            serialized.kind,
            serialized.id,
            serialized.data.len()
        );
        let index = self.done.len();
        self.done.push(serialized);
        self.memo.insert(handle, index);
        Ok(index)
    }

    fn target(&mut self, reference: &ObjectRef) -> Result<Target, ObjectError> {
        match *reference {
            ObjectRef::Unresolved(id) => Ok(Target { kind: None, id }),
            ObjectRef::Resolved(handle) => {
                let index = self.visit(handle)?;
                let serialized = &self.done[index];
                Ok(Target {
                    kind: Some(serialized.kind),
                    id: serialized.id,
                })
            }
        }
    }

    pub fn get(&self, index: usize) -> &SerializedObject {
        &self.done[index]
    }

    /// Objects serialized so far, in post-order.
    pub fn objects(&self) -> &[SerializedObject] {
        &self.done
    }

    pub fn into_objects(self) -> Vec<SerializedObject> {
        self.done
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> Signature {
        Signature::from_unix("Git Author", "author@git.com", 1_000_000_000, 0).unwrap()
    }

    #[test]
    fn blob_hash_matches_git() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("hello\n"));
        let serialized = graph.serialize(blob).unwrap();
        // `printf 'hello\n' | git hash-object --stdin`
        assert_eq!(
            serialized.id().to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(serialized.data(), b"blob 6\0hello\n");
        assert_eq!(serialized.pack_payload(), b"hello\n");
    }

    #[test]
    fn shared_child_is_serialized_once() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("shared"));
        let inner = graph.insert(Tree::new().with("file", blob).unwrap());
        let mut root = Tree::new();
        root.insert("a", blob).unwrap();
        root.insert("b", blob).unwrap();
        root.insert("dir", inner).unwrap();
        let root = graph.insert(root);

        let all = graph.serialize_all(root).unwrap();
        let kinds: Vec<_> = all.iter().map(SerializedObject::kind).collect();
        assert_eq!(kinds, [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Tree]);
        assert_eq!(all[2].id(), graph.id(root).unwrap());
    }

    #[test]
    fn implicit_modes_follow_referenced_kind() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("x"));
        let sub = graph.insert(Tree::new().with("x", blob).unwrap());
        let mut root = Tree::new();
        root.insert("file", blob).unwrap();
        root.insert("sub", sub).unwrap();
        let root = graph.insert(root);

        let serialized = graph.serialize(root).unwrap();
        let payload = serialized.pack_payload();
        assert!(payload.starts_with(b"100644 file\0"));
        let second = 12 + 20;
        assert!(payload[second..].starts_with(b"40000 sub\0"));
    }

    #[test]
    fn commit_roundtrip_resolves_against_graph() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("content\n"));
        let tree = graph.insert(Tree::new().with("README", blob).unwrap());
        let first = graph.insert(Commit::new(tree, author(), "first\n"));
        let second = graph.insert(Commit::new(tree, author(), "second\n").with_parent(first));

        let serialized = graph.serialize(second).unwrap();
        let (decoded, id) = decode(ObjectKind::Commit, serialized.data()).unwrap();
        assert_eq!(id, serialized.id());

        let Object::Commit(commit) = decoded else {
            panic!("expected a commit");
        };
        assert_eq!(commit.tree, ObjectRef::Unresolved(graph.id(tree).unwrap()));
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.message, "second\n");
    }

    #[test]
    fn decode_checks_header_length() {
        assert!(matches!(
            decode(ObjectKind::Blob, b"blob 10\0short"),
            Err(ObjectError::MalformedHeader { .. })
        ));
        assert!(matches!(
            decode_loose(b"no header here"),
            Err(ObjectError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn resolve_references_is_idempotent_and_partial() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("a"));
        let blob_id = graph.id(blob).unwrap();
        let missing = ObjectId::from_bytes([7; 20]);

        let mut tree = Tree::new();
        tree.insert_with_mode("a", blob_id, EntryMode::Blob).unwrap();
        tree.insert_with_mode("b", missing, EntryMode::Blob).unwrap();
        let tree = graph.insert(tree);
        let before = graph.id(tree).unwrap();

        let index = HashMap::from([(blob_id, blob)]);
        graph.resolve_references(&index);
        graph.resolve_references(&index);

        let tree_obj = graph.get(tree).and_then(Object::as_tree).unwrap();
        assert_eq!(tree_obj.get("a").unwrap().target, ObjectRef::Resolved(blob));
        assert_eq!(tree_obj.get("b").unwrap().target, ObjectRef::Unresolved(missing));
        assert_eq!(graph.id(tree).unwrap(), before);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("a"));
        let tree = graph.insert(Tree::new().with("a", blob).unwrap());
        if let Some(Object::Tree(t)) = graph.get_mut(tree) {
            t.insert("self", tree).unwrap();
        }
        assert!(matches!(
            graph.serialize(tree),
            Err(ObjectError::InvalidObject { .. })
        ));
    }

    #[test]
    fn diff_requires_same_kind() {
        let mut graph = ObjectGraph::new();
        let blob = graph.insert(Blob::new("a"));
        let tree = graph.insert(Tree::new().with("a", blob).unwrap());
        assert!(matches!(
            graph.diff(tree, blob),
            Err(ObjectError::KindMismatch { .. })
        ));
    }

    #[test]
    fn object_delta_patches_back() {
        let mut graph = ObjectGraph::new();
        let base = graph.insert(Blob::new("line one\nline two\n"));
        let target = graph.insert(Blob::new("line one\nline two\nline three\n"));
        let delta = graph.diff(target, base).unwrap();
        assert_eq!(delta.kind, ObjectKind::Blob);
        assert_eq!(delta.target_id, graph.id(target).unwrap());

        let rebuilt = delta::patch(b"line one\nline two\n", &delta.instructions).unwrap();
        assert_eq!(rebuilt, b"line one\nline two\nline three\n");
    }

    #[test]
    fn unknown_handle() {
        let graph = ObjectGraph::new();
        let other = {
            let mut g = ObjectGraph::new();
            g.insert(Blob::new("x"))
        };
        assert!(matches!(
            graph.serialize(other),
            Err(ObjectError::UnknownHandle(0))
        ));
    }
}
