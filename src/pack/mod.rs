// Pack streams: many objects in one checksummed byte stream.
//
// Layout:
//   "PACK" | version (u32 BE, always 2) | entry count (u32 BE)
//   entry*
//   SHA-1 of all preceding bytes
//
// Each entry is a header (see `entry`) followed by a zlib stream holding
// either the object payload or a delta against another object.

pub mod entry;
pub mod writer;

mod reader;

use std::collections::HashMap;
use std::io;

use crate::compress::{CompressBackend, DecompressError, ZlibBackend};
use crate::delta::DeltaError;
use crate::hash::ObjectId;
use crate::object::{Object, ObjectError, ObjectGraph, ObjectHandle, ObjectKind, RawObject};

pub use entry::{DeltaBase, EntryHeader, EntryType};
pub use writer::{PackOptions, PackSummary, PackWriter};

/// Stream signature.
pub const MAGIC: [u8; 4] = *b"PACK";

/// The only supported format version.
pub const VERSION: u32 = 2;

/// Signature, version and entry count.
pub const HEADER_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("stream does not start with \"PACK\"")]
    InvalidPackMagic,
    #[error("unsupported pack version {0}")]
    UnsupportedPackVersion(u32),
    #[error("invalid entry type {code} at offset {offset}")]
    InvalidPackEntryType { code: u8, offset: u64 },
    #[error("delta at offset {offset} has no resolvable base in the pack")]
    UnresolvableDelta {
        offset: u64,
        base_offset: Option<u64>,
    },
    #[error("thin pack needs base {id} but none was provided")]
    MissingBase { id: ObjectId },
    #[error("external base hashes to {actual}, expected {expected}")]
    BaseIntegrityError {
        expected: ObjectId,
        actual: ObjectId,
    },
    #[error("pack checksum mismatch: trailer says {expected}, content hashes to {actual}")]
    PackChecksumError {
        expected: ObjectId,
        actual: ObjectId,
    },
    #[error("truncated {what} at offset {offset}")]
    Truncated { offset: u64, what: &'static str },
    #[error("entry at offset {offset}: {source}")]
    Decompress {
        offset: u64,
        #[source]
        source: DecompressError,
    },
    #[error("entry at offset {offset} declares {declared} bytes but inflates to {actual}")]
    SizeMismatch {
        offset: u64,
        declared: u64,
        actual: u64,
    },
    #[error("unexpected data after the last entry at offset {offset}")]
    TrailingData { offset: u64 },
    #[error("delta at offset {offset}: {source}")]
    Delta {
        offset: u64,
        #[source]
        source: DeltaError,
    },
    #[error("{kind} at offset {offset}: {source}")]
    InvalidEntry {
        offset: u64,
        kind: ObjectKind,
        #[source]
        source: ObjectError,
    },
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Thin pack bases
// ---------------------------------------------------------------------------

/// Supplies bases that reference-deltas point at but the pack omits.
///
/// Implemented for any `FnMut(&ObjectId) -> Option<RawObject>`.
pub trait BaseResolver {
    /// Look up an object by id. `None` fails the decode.
    fn resolve(&mut self, id: &ObjectId) -> Option<RawObject>;
}

impl<F> BaseResolver for F
where
    F: FnMut(&ObjectId) -> Option<RawObject>,
{
    fn resolve(&mut self, id: &ObjectId) -> Option<RawObject> {
        self(id)
    }
}

// ---------------------------------------------------------------------------
// Decoded pack
// ---------------------------------------------------------------------------

/// One object that was stored in the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub handle: ObjectHandle,
    /// Entry start within the stream.
    pub offset: u64,
    /// Number of deltas applied to reach this object; 0 for full entries.
    pub depth: usize,
}

/// Objects decoded from a pack, linked to each other where possible.
#[derive(Debug, Clone)]
pub struct Pack {
    graph: ObjectGraph,
    objects: Vec<PackedObject>,
    index: HashMap<ObjectId, ObjectHandle>,
    checksum: ObjectId,
}

impl Pack {
    /// Number of objects stored in the pack.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Stored objects in stream order.
    pub fn objects(&self) -> &[PackedObject] {
        &self.objects
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.index.get(id).and_then(|&handle| self.graph.get(handle))
    }

    pub fn handle(&self, id: &ObjectId) -> Option<ObjectHandle> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackedObject, &Object)> {
        self.objects
            .iter()
            .filter_map(|packed| Some((packed, self.graph.get(packed.handle)?)))
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn into_graph(self) -> ObjectGraph {
        self.graph
    }

    /// The pack trailer.
    pub fn checksum(&self) -> ObjectId {
        self.checksum
    }
}

/// Decode a self-contained pack with the zlib backend.
pub fn decode(bytes: &[u8]) -> Result<Pack, PackError> {
    decode_with(bytes, &ZlibBackend::default(), None)
}

/// Decode a pack whose reference-deltas may point outside it.
pub fn decode_with_resolver(bytes: &[u8], mut resolver: impl BaseResolver) -> Result<Pack, PackError> {
    decode_with(bytes, &ZlibBackend::default(), Some(&mut resolver))
}

/// Decode with an explicit compression backend and optional thin-pack
/// resolver.
pub fn decode_with(
    bytes: &[u8],
    backend: &dyn CompressBackend,
    resolver: Option<&mut dyn BaseResolver>,
) -> Result<Pack, PackError> {
    let (resolved, checksum) = reader::resolve_stream(bytes, backend, resolver)?;

    let mut graph = ObjectGraph::new();
    let mut objects = Vec::with_capacity(resolved.len());
    let mut index = HashMap::with_capacity(resolved.len());
    for entry in resolved {
        let object = Object::decode_payload(entry.kind, &entry.data).map_err(|source| {
            PackError::InvalidEntry {
                offset: entry.offset,
                kind: entry.kind,
                source,
            }
        })?;
        let handle = graph.insert(object);
        index.entry(entry.id).or_insert(handle);
        objects.push(PackedObject {
            id: entry.id,
            kind: entry.kind,
            handle,
            offset: entry.offset,
            depth: entry.depth,
        });
    }
    graph.resolve_references(&index);

    Ok(Pack {
        graph,
        objects,
        index,
        checksum,
    })
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Layout of one entry, as reported by [`inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub offset: u64,
    pub entry_type: EntryType,
    /// Declared uncompressed size.
    pub size: u64,
    /// Header plus compressed payload.
    pub stored_len: usize,
    pub base: Option<DeltaBase>,
}

/// Verify the trailer and list entry layouts without resolving deltas.
pub fn inspect(bytes: &[u8]) -> Result<Vec<EntryInfo>, PackError> {
    inspect_with(bytes, &ZlibBackend::default())
}

pub fn inspect_with(bytes: &[u8], backend: &dyn CompressBackend) -> Result<Vec<EntryInfo>, PackError> {
    let (count, body, _) = reader::open(bytes)?;
    let mut scanner = reader::EntryScanner::new(body, count, backend);
    let mut entries = Vec::new();
    for entry in scanner.by_ref() {
        let entry = entry?;
        entries.push(EntryInfo {
            offset: entry.offset,
            entry_type: entry.header.entry_type,
            size: entry.header.size,
            stored_len: entry.header_len + entry.compressed_len,
            base: entry.header.base,
        });
    }
    scanner.finish()?;
    Ok(entries)
}
