// Pack stream encoding.
//
// Objects are queued first (`add`, `add_delta`) and written in queue order
// by `finish`/`write_to`. Queueing serializes through one `Serializer`, so a
// shared object is encoded and hashed once per writer, and the queue is
// deduplicated by content id.
//
// Every byte goes through a `HashingWriter`; the trailer is the digest it
// accumulated, appended without being hashed itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;

use crate::compress::{CompressBackend, ZlibBackend};
use crate::delta;
use crate::hash::{HashingWriter, ID_LEN, ObjectId};
use crate::object::{ObjectError, ObjectGraph, ObjectHandle, SerializedObject, Serializer};

use super::entry::{DeltaBase, EntryHeader};
use super::{MAGIC, PackError, VERSION};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Pack writer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Zlib level for entry payloads (0-9).
    pub compression_level: u32,
    /// Emit offset-deltas when the base precedes the delta in the stream.
    /// Otherwise every delta is a reference-delta.
    pub offset_deltas: bool,
    /// Number of preceding entries each queued object is diffed against.
    /// 0 stores every `add`ed object whole.
    pub delta_window: usize,
    /// Longest delta chain the window search may build.
    pub max_delta_depth: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
            offset_deltas: true,
            delta_window: 0,
            max_delta_depth: 16,
        }
    }
}

/// What `write_to` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    pub entries: usize,
    pub offset_deltas: usize,
    pub ref_deltas: usize,
    pub bytes: u64,
    pub checksum: ObjectId,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// A queued entry; indices point into the serializer's objects.
#[derive(Debug, Clone, Copy)]
enum Queued {
    Whole(usize),
    Delta { target: usize, base: usize },
}

pub struct PackWriter<'g> {
    serializer: Serializer<'g>,
    options: PackOptions,
    backend: Box<dyn CompressBackend>,
    queue: Vec<Queued>,
    queued: HashSet<ObjectId>,
}

impl<'g> PackWriter<'g> {
    pub fn new(graph: &'g ObjectGraph) -> Self {
        Self::with_options(graph, PackOptions::default())
    }

    pub fn with_options(graph: &'g ObjectGraph, options: PackOptions) -> Self {
        Self {
            serializer: graph.serializer(),
            options,
            backend: Box::new(ZlibBackend::new(options.compression_level)),
            queue: Vec::new(),
            queued: HashSet::new(),
        }
    }

    /// Replace the zlib backend.
    pub fn with_backend(mut self, backend: Box<dyn CompressBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue `handle` and every object it references, children first.
    /// Objects already queued are skipped.
    pub fn add(&mut self, handle: ObjectHandle) -> Result<ObjectId, PackError> {
        for index in self.reachable(handle)? {
            if self.queued.insert(self.serializer.get(index).id()) {
                self.queue.push(Queued::Whole(index));
            }
        }
        Ok(self.serializer.serialize(handle)?.id())
    }

    /// Queue `target` as a delta against `base`.
    ///
    /// `base` itself is not queued; leaving it out produces a thin pack.
    /// Objects referenced by `target` are not queued either.
    pub fn add_delta(&mut self, target: ObjectHandle, base: ObjectHandle) -> Result<ObjectId, PackError> {
        let target = self.serializer.visit(target)?;
        let base = self.serializer.visit(base)?;
        let (t, b) = (self.serializer.get(target), self.serializer.get(base));
        if t.kind() != b.kind() {
            return Err(ObjectError::KindMismatch {
                target: t.kind(),
                base: b.kind(),
            }
            .into());
        }
        let id = t.id();
        if self.queued.insert(id) {
            self.queue.push(Queued::Delta { target, base });
        }
        Ok(id)
    }

    fn reachable(&mut self, root: ObjectHandle) -> Result<Vec<usize>, ObjectError> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        self.collect(root, &mut seen, &mut order)?;
        Ok(order)
    }

    fn collect(
        &mut self,
        handle: ObjectHandle,
        seen: &mut HashSet<ObjectHandle>,
        order: &mut Vec<usize>,
    ) -> Result<(), ObjectError> {
        if !seen.insert(handle) {
            return Ok(());
        }
        let graph = self.serializer.graph();
        let object = graph
            .get(handle)
            .ok_or(ObjectError::UnknownHandle(handle.index()))?;
        for child in object.references().into_iter().filter_map(|r| r.handle()) {
            self.collect(child, seen, order)?;
        }
        order.push(self.serializer.visit(handle)?);
        Ok(())
    }

    /// Write the pack into a buffer.
    pub fn finish(self) -> Result<Vec<u8>, PackError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Write the pack to `sink`.
    pub fn write_to<W: Write>(self, sink: W) -> Result<PackSummary, PackError> {
        let mut out = HashingWriter::new(sink);
        out.write_all(&MAGIC)?;
        out.write_all(&VERSION.to_be_bytes())?;
        let count = u32::try_from(self.queue.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many objects for one pack")
        })?;
        out.write_all(&count.to_be_bytes())?;

        let mut state = EmitState::default();
        for &entry in &self.queue {
            let offset = out.written();
            let (header, payload, id) = match entry {
                Queued::Whole(index) => {
                    let object = self.serializer.get(index);
                    match self.window_delta(index, &state) {
                        Some((base, instructions)) => {
                            let distance = offset - state.offsets[&base.id()];
                            let depth = state.depth[&base.id()] + 1;
                            state.depth.insert(object.id(), depth);
                            state.offset_deltas += 1;
                            let size = instructions.len() as u64;
                            let header = EntryHeader::delta(DeltaBase::Offset(distance), size);
                            (header, instructions, object.id())
                        }
                        None => {
                            state.depth.insert(object.id(), 0);
                            let payload = object.pack_payload().to_vec();
                            let header = EntryHeader::object(object.kind(), payload.len() as u64);
                            (header, payload, object.id())
                        }
                    }
                }
                Queued::Delta { target, base } => {
                    let (target, base) = (self.serializer.get(target), self.serializer.get(base));
                    let instructions = delta::diff(base.pack_payload(), target.pack_payload());
                    let base_at = state.offsets.get(&base.id()).copied();
                    let depth = base_at.map_or(1, |_| state.depth[&base.id()] + 1);
                    state.depth.insert(target.id(), depth);
                    let base_ref = match base_at {
                        Some(at) if self.options.offset_deltas => {
                            state.offset_deltas += 1;
                            DeltaBase::Offset(offset - at)
                        }
                        _ => {
                            state.ref_deltas += 1;
                            DeltaBase::Id(base.id())
                        }
                    };
                    let header = EntryHeader::delta(base_ref, instructions.len() as u64);
                    (header, instructions, target.id())
                }
            };

            let mut buf = Vec::with_capacity(32 + payload.len() / 2);
            header.encode(&mut buf);
            buf.extend_from_slice(&self.backend.compress(&payload)?);
            out.write_all(&buf)?;
            log::trace!("entry {offset}: {} {id}", header.entry_type.name());

            state.offsets.insert(id, offset);
            if let Queued::Whole(index) = entry {
                state.recent.push_back(index);
                if state.recent.len() > self.options.delta_window {
                    state.recent.pop_front();
                }
            }
        }

        let body_len = out.written();
        let (mut sink, checksum) = out.into_parts();
        sink.write_all(checksum.as_bytes())?;
        sink.flush()?;

        let summary = PackSummary {
            entries: self.queue.len(),
            offset_deltas: state.offset_deltas,
            ref_deltas: state.ref_deltas,
            bytes: body_len + ID_LEN as u64,
            checksum,
        };
        log::debug!(
            "pack: wrote {} entries ({} ofs-delta, {} ref-delta), checksum {}",
            summary.entries,
            summary.offset_deltas,
            summary.ref_deltas,
            checksum
        );
        Ok(summary)
    }

    /// Best offset-delta for a whole object against the recent window, if
    /// one is worth storing.
    fn window_delta<'s>(
        &'s self,
        index: usize,
        state: &EmitState,
    ) -> Option<(&'s SerializedObject, Vec<u8>)> {
        if self.options.delta_window == 0 || !self.options.offset_deltas {
            return None;
        }
        let object = self.serializer.get(index);
        let payload = object.pack_payload();
        let mut best: Option<(&SerializedObject, Vec<u8>)> = None;
        for &candidate in state.recent.iter().rev() {
            let base = self.serializer.get(candidate);
            if base.kind() != object.kind() || state.depth[&base.id()] >= self.options.max_delta_depth {
                continue;
            }
            let instructions = delta::diff(base.pack_payload(), payload);
            let smaller = best.as_ref().is_none_or(|(_, b)| instructions.len() < b.len());
            if instructions.len() < payload.len() / 2 && smaller {
                best = Some((base, instructions));
            }
        }
        best
    }
}

#[derive(Default)]
struct EmitState {
    offsets: HashMap<ObjectId, u64>,
    depth: HashMap<ObjectId, usize>,
    recent: VecDeque<usize>,
    offset_deltas: usize,
    ref_deltas: usize,
}
