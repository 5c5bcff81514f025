// Tree objects: a name-ordered directory listing.
//
// Binary payload: repeated `<mode> <name>\0<20-byte id>` records, sorted by
// the byte order of the name.

use std::collections::BTreeMap;
use std::collections::HashMap;

use bstr::{BStr, BString, ByteSlice};

use crate::hash::{ID_LEN, ObjectId};

use super::{ObjectError, ObjectHandle, ObjectKind, ObjectRef, Target};

// ---------------------------------------------------------------------------
// Entry mode
// ---------------------------------------------------------------------------

/// File mode of a tree entry, written as octal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`).
    Blob,
    /// Executable file (`100755`).
    Executable,
    /// Symbolic link (`120000`).
    Symlink,
    /// Subdirectory (`40000`).
    Tree,
    /// Submodule commit (`160000`).
    Gitlink,
}

impl EntryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryMode::Blob => "100644",
            EntryMode::Executable => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Tree => "40000",
            EntryMode::Gitlink => "160000",
        }
    }

    pub fn parse(text: &[u8]) -> Option<Self> {
        match text {
            b"100644" => Some(EntryMode::Blob),
            b"100755" => Some(EntryMode::Executable),
            b"120000" => Some(EntryMode::Symlink),
            b"40000" => Some(EntryMode::Tree),
            b"160000" => Some(EntryMode::Gitlink),
            _ => None,
        }
    }

    /// The default mode for an entry referencing an object of `kind`.
    pub fn for_kind(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::Blob => Some(EntryMode::Blob),
            ObjectKind::Tree => Some(EntryMode::Tree),
            ObjectKind::Commit => Some(EntryMode::Gitlink),
            ObjectKind::Tag => None,
        }
    }

    /// The object kind an entry with this mode must reference.
    pub fn kind(self) -> ObjectKind {
        match self {
            EntryMode::Blob | EntryMode::Executable | EntryMode::Symlink => ObjectKind::Blob,
            EntryMode::Tree => ObjectKind::Tree,
            EntryMode::Gitlink => ObjectKind::Commit,
        }
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// One named child of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub target: ObjectRef,
    /// Explicit mode. `None` means "infer from the referenced object".
    pub mode: Option<EntryMode>,
}

/// A directory listing keyed by entry name.
///
/// Entries are kept in a `BTreeMap`, so iteration and serialization follow
/// ascending byte order of the name regardless of insertion order. Names
/// are raw bytes and need not be UTF-8.
///
/// A tree built with [`Tree::new`] must gain at least one entry before it
/// can be serialized. Git's empty tree (`4b825dc6…`) is only produced on
/// request, through [`Tree::empty`] or by decoding an empty payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: BTreeMap<BString, TreeEntry>,
    allow_empty: bool,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// The empty tree, which serializes to a zero-length payload.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            allow_empty: true,
        }
    }

    /// Add an entry whose mode is inferred at serialization time.
    pub fn insert(
        &mut self,
        name: impl Into<BString>,
        target: impl Into<ObjectRef>,
    ) -> Result<(), ObjectError> {
        self.insert_entry(name.into(), target.into(), None)
    }

    /// Add an entry with an explicit mode.
    pub fn insert_with_mode(
        &mut self,
        name: impl Into<BString>,
        target: impl Into<ObjectRef>,
        mode: EntryMode,
    ) -> Result<(), ObjectError> {
        self.insert_entry(name.into(), target.into(), Some(mode))
    }

    /// Builder form of [`Tree::insert`].
    pub fn with(mut self, name: impl Into<BString>, target: impl Into<ObjectRef>) -> Result<Self, ObjectError> {
        self.insert(name, target)?;
        Ok(self)
    }

    fn insert_entry(
        &mut self,
        name: BString,
        target: ObjectRef,
        mode: Option<EntryMode>,
    ) -> Result<(), ObjectError> {
        if !valid_name(&name) {
            return Err(ObjectError::InvalidObject {
                kind: ObjectKind::Tree,
                reason: format!("invalid entry name {name:?}"),
            });
        }
        if self.entries.contains_key(&name) {
            return Err(ObjectError::InvalidObject {
                kind: ObjectKind::Tree,
                reason: format!("duplicate entry name {name:?}"),
            });
        }
        self.entries.insert(name, TreeEntry { target, mode });
        Ok(())
    }

    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&TreeEntry> {
        self.entries.get(name.as_ref().as_bstr())
    }

    /// Entries in serialization order.
    pub fn entries(&self) -> impl Iterator<Item = (&BStr, &TreeEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_bstr(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn references(&self) -> impl Iterator<Item = &ObjectRef> {
        self.entries.values().map(|entry| &entry.target)
    }

    pub(crate) fn resolve_references(&mut self, index: &HashMap<ObjectId, ObjectHandle>) {
        for entry in self.entries.values_mut() {
            entry.target.resolve(index);
        }
    }

    pub(crate) fn encode(
        &self,
        mut target: impl FnMut(&ObjectRef) -> Result<Target, ObjectError>,
    ) -> Result<Vec<u8>, ObjectError> {
        if self.entries.is_empty() && !self.allow_empty {
            return Err(invalid("tree has no entries".to_string()));
        }
        let mut out = Vec::new();
        for (name, entry) in &self.entries {
            let resolved = target(&entry.target)?;
            let mode = match (entry.mode, resolved.kind) {
                (Some(mode), Some(kind)) if mode.kind() != kind => {
                    return Err(invalid(format!(
                        "entry {name:?} has mode {} but references a {kind}",
                        mode.as_str()
                    )));
                }
                (Some(mode), _) => mode,
                (None, Some(kind)) => EntryMode::for_kind(kind)
                    .ok_or_else(|| invalid(format!("entry {name:?} references a {kind}")))?,
                (None, None) => {
                    return Err(invalid(format!(
                        "entry {name:?} is unresolved and has no mode"
                    )));
                }
            };
            out.extend_from_slice(mode.as_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(name);
            out.push(0);
            out.extend_from_slice(resolved.id.as_bytes());
        }
        Ok(out)
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = BTreeMap::new();
        let mut pos = 0;
        while pos < payload.len() {
            let rest = &payload[pos..];
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| bad_tree(pos, "missing space after mode"))?;
            let mode = EntryMode::parse(&rest[..space])
                .ok_or_else(|| bad_tree(pos, "unknown entry mode"))?;
            let nul = rest[space..]
                .iter()
                .position(|&b| b == 0)
                .map(|i| space + i)
                .ok_or_else(|| bad_tree(pos, "missing NUL after name"))?;
            let name = &rest[space + 1..nul];
            if !valid_name(name) {
                return Err(bad_tree(pos, "invalid entry name"));
            }
            let id_start = nul + 1;
            let id = rest
                .get(id_start..id_start + ID_LEN)
                .and_then(ObjectId::from_slice)
                .ok_or_else(|| bad_tree(pos, "entry id runs past the payload"))?;
            let entry = TreeEntry {
                target: ObjectRef::Unresolved(id),
                mode: Some(mode),
            };
            if entries.insert(BString::from(name), entry).is_some() {
                return Err(bad_tree(pos, "duplicate entry name"));
            }
            pos += id_start + ID_LEN;
        }
        Ok(Self {
            allow_empty: entries.is_empty(),
            entries,
        })
    }
}

fn valid_name(name: &[u8]) -> bool {
    !name.is_empty() && !name.contains(&b'/') && !name.contains(&0)
}

fn invalid(reason: String) -> ObjectError {
    ObjectError::InvalidObject {
        kind: ObjectKind::Tree,
        reason,
    }
}

fn bad_tree(offset: usize, reason: &str) -> ObjectError {
    ObjectError::InvalidTreeEncoding {
        offset,
        reason: reason.to_string(),
    }
}
