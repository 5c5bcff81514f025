// Pack stream decoding.
//
// Decoding runs in three passes over one stream:
//
//   1. Trailer check: the last 20 bytes must be the SHA-1 of everything
//      before them. Nothing is parsed from a stream that fails this.
//   2. Entry scan: headers are parsed and payloads inflated in order. Full
//      objects become bases immediately; a delta whose base is not known yet
//      waits in a pending queue keyed by the base's offset or id. Every new
//      base drains the queues waiting on it, so chains resolve transitively
//      and regardless of entry order.
//   3. Thin bases: ids still pending are fetched from the caller's
//      `BaseResolver`, checked against the requested id and registered as
//      bases without being reported as pack members.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::compress::CompressBackend;
use crate::delta;
use crate::hash::{self, ID_LEN, ObjectId};
use crate::object::{ObjectKind, header};

use super::entry::{DeltaBase, EntryHeader, EntryType};
use super::{BaseResolver, HEADER_LEN, MAGIC, PackError, VERSION};

// ---------------------------------------------------------------------------
// Stream framing
// ---------------------------------------------------------------------------

/// Verify the trailer and the fixed header. Returns the entry count and the
/// body (header plus entries, trailer excluded).
pub(crate) fn open(bytes: &[u8]) -> Result<(u32, &[u8], ObjectId), PackError> {
    if bytes.len() < HEADER_LEN + ID_LEN {
        if bytes.len() >= 4 && bytes[..4] != MAGIC {
            return Err(PackError::InvalidPackMagic);
        }
        return Err(PackError::Truncated {
            offset: bytes.len() as u64,
            what: "pack header and trailer",
        });
    }
    let (body, trailer) = bytes.split_at(bytes.len() - ID_LEN);
    let expected = ObjectId::from_slice(trailer).ok_or(PackError::Truncated {
        offset: body.len() as u64,
        what: "pack trailer",
    })?;
    let actual = hash::digest(body);
    if actual != expected {
        return Err(PackError::PackChecksumError { expected, actual });
    }

    if body[..4] != MAGIC {
        return Err(PackError::InvalidPackMagic);
    }
    let version = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    if version != VERSION {
        return Err(PackError::UnsupportedPackVersion(version));
    }
    let count = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);
    Ok((count, body, expected))
}

/// One entry as it appears in the stream, payload inflated.
pub(crate) struct RawEntry {
    pub offset: u64,
    pub header: EntryHeader,
    pub header_len: usize,
    pub compressed_len: usize,
    pub data: Vec<u8>,
}

/// Walks the entries of a verified pack body.
pub(crate) struct EntryScanner<'a> {
    body: &'a [u8],
    pos: usize,
    remaining: u32,
    backend: &'a dyn CompressBackend,
}

impl<'a> EntryScanner<'a> {
    pub fn new(body: &'a [u8], count: u32, backend: &'a dyn CompressBackend) -> Self {
        Self {
            body,
            pos: HEADER_LEN,
            remaining: count,
            backend,
        }
    }

    fn read_entry(&mut self) -> Result<RawEntry, PackError> {
        let offset = self.pos as u64;
        let rest = &self.body[self.pos..];
        let (header, header_len) = EntryHeader::parse(rest, offset)?;
        let compressed = &rest[header_len..];
        let inflated = self
            .backend
            .decompress(compressed, header.size.min(usize::MAX as u64) as usize)
            .map_err(|source| PackError::Decompress { offset, source })?;
        if inflated.data.len() as u64 != header.size {
            return Err(PackError::SizeMismatch {
                offset,
                declared: header.size,
                actual: inflated.data.len() as u64,
            });
        }
        self.pos += header_len + inflated.consumed;
        Ok(RawEntry {
            offset,
            header,
            header_len,
            compressed_len: inflated.consumed,
            data: inflated.data,
        })
    }

    /// Check that the declared entries covered the body exactly.
    pub fn finish(&self) -> Result<(), PackError> {
        if self.pos != self.body.len() {
            return Err(PackError::TrailingData {
                offset: self.pos as u64,
            });
        }
        Ok(())
    }
}

impl Iterator for EntryScanner<'_> {
    type Item = Result<RawEntry, PackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = self.read_entry();
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }
}

// ---------------------------------------------------------------------------
// Delta resolution
// ---------------------------------------------------------------------------

/// A resolved object usable as a delta base.
#[derive(Clone)]
struct Base {
    kind: ObjectKind,
    data: Rc<[u8]>,
    depth: usize,
}

/// A delta entry waiting for its base.
struct Pending {
    offset: u64,
    instructions: Vec<u8>,
}

/// An object resolved from the stream.
pub(crate) struct Resolved {
    pub offset: u64,
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub data: Rc<[u8]>,
    pub depth: usize,
}

/// Where a new base came from.
enum Origin {
    /// An entry of the pack at this offset.
    Entry(u64),
    /// Supplied by the caller for a thin pack.
    External(ObjectId),
}

#[derive(Default)]
pub(crate) struct DeltaResolver {
    by_offset: HashMap<u64, Base>,
    by_id: HashMap<ObjectId, Base>,
    pending_by_offset: HashMap<u64, Vec<Pending>>,
    pending_by_id: BTreeMap<ObjectId, Vec<Pending>>,
    resolved: Vec<Resolved>,
    thin_bases: usize,
}

impl DeltaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stream entry.
    pub fn add_entry(&mut self, entry: RawEntry) -> Result<(), PackError> {
        let RawEntry {
            offset,
            header,
            data,
            ..
        } = entry;
        match (header.entry_type, header.base) {
            (EntryType::Object(kind), _) => {
                let base = Base {
                    kind,
                    data: data.into(),
                    depth: 0,
                };
                self.register(base, Origin::Entry(offset))
            }
            (_, Some(DeltaBase::Offset(distance))) => {
                // The base must start strictly before this entry and after
                // the pack header.
                let base_offset = offset
                    .checked_sub(distance)
                    .filter(|&base| distance > 0 && base >= HEADER_LEN as u64)
                    .ok_or(PackError::UnresolvableDelta {
                        offset,
                        base_offset: None,
                    })?;
                let pending = Pending {
                    offset,
                    instructions: data,
                };
                match self.by_offset.get(&base_offset).cloned() {
                    Some(base) => self.apply(&base, pending),
                    None => {
                        log::trace!("entry {offset}: waiting for base at {base_offset}");
                        self.pending_by_offset
                            .entry(base_offset)
                            .or_default()
                            .push(pending);
                        Ok(())
                    }
                }
            }
            (_, Some(DeltaBase::Id(id))) => {
                let pending = Pending {
                    offset,
                    instructions: data,
                };
                match self.by_id.get(&id).cloned() {
                    Some(base) => self.apply(&base, pending),
                    None => {
                        log::trace!("entry {offset}: waiting for base {id}");
                        self.pending_by_id.entry(id).or_default().push(pending);
                        Ok(())
                    }
                }
            }
            (_, None) => Err(PackError::UnresolvableDelta {
                offset,
                base_offset: None,
            }),
        }
    }

    /// Resolve reference-deltas whose bases are not in the stream, then fail
    /// on anything still waiting.
    pub fn finish(
        mut self,
        mut resolver: Option<&mut dyn BaseResolver>,
    ) -> Result<Vec<Resolved>, PackError> {
        while let Some((&id, _)) = self.pending_by_id.first_key_value() {
            let Some(resolver) = resolver.as_deref_mut() else {
                return Err(PackError::MissingBase { id });
            };
            let raw = resolver.resolve(&id).ok_or(PackError::MissingBase { id })?;
            let actual = raw.id();
            if actual != id {
                return Err(PackError::BaseIntegrityError {
                    expected: id,
                    actual,
                });
            }
            log::debug!("thin pack: resolved external base {id} ({})", raw.kind);
            self.thin_bases += 1;
            let base = Base {
                kind: raw.kind,
                data: raw.data.into(),
                depth: 0,
            };
            self.register(base, Origin::External(id))?;
        }

        if let Some((&base_offset, waiting)) = self.pending_by_offset.iter().min_by_key(|(k, _)| **k) {
            let offset = waiting.first().map_or(base_offset, |p| p.offset);
            return Err(PackError::UnresolvableDelta {
                offset,
                base_offset: Some(base_offset),
            });
        }

        let mut resolved = self.resolved;
        resolved.sort_by_key(|r| r.offset);
        log::debug!(
            "resolved {} objects ({} thin bases)",
            resolved.len(),
            self.thin_bases
        );
        Ok(resolved)
    }

    fn apply(&mut self, base: &Base, pending: Pending) -> Result<(), PackError> {
        let data = patch_entry(base, &pending)?;
        let target = Base {
            kind: base.kind,
            data: data.into(),
            depth: base.depth + 1,
        };
        self.register(target, Origin::Entry(pending.offset))
    }

    /// Make `base` available and resolve everything waiting on it. Uses an
    /// explicit worklist so long chains do not recurse.
    fn register(&mut self, base: Base, origin: Origin) -> Result<(), PackError> {
        let mut work = vec![(base, origin)];
        while let Some((base, origin)) = work.pop() {
            let id = match origin {
                Origin::External(id) => id,
                Origin::Entry(_) => hash::digest_parts(&[
                    &header::encode(base.kind, base.data.len()),
                    &base.data,
                ]),
            };

            let mut waiting = Vec::new();
            if let Origin::Entry(offset) = origin {
                log::trace!("entry {offset}: {} {id} (depth {})", base.kind, base.depth);
                self.resolved.push(Resolved {
                    offset,
                    id,
                    kind: base.kind,
                    data: Rc::clone(&base.data),
                    depth: base.depth,
                });
                self.by_offset.insert(offset, base.clone());
                waiting.extend(self.pending_by_offset.remove(&offset).unwrap_or_default());
            }
            self.by_id.entry(id).or_insert_with(|| base.clone());
            waiting.extend(self.pending_by_id.remove(&id).unwrap_or_default());

            // Reversed so dependents pop in arrival order.
            for pending in waiting.into_iter().rev() {
                let data = patch_entry(&base, &pending)?;
                let target = Base {
                    kind: base.kind,
                    data: data.into(),
                    depth: base.depth + 1,
                };
                work.push((target, Origin::Entry(pending.offset)));
            }
        }
        Ok(())
    }
}

fn patch_entry(base: &Base, pending: &Pending) -> Result<Vec<u8>, PackError> {
    delta::patch(&base.data, &pending.instructions).map_err(|source| PackError::Delta {
        offset: pending.offset,
        source,
    })
}

/// Decode a complete stream into resolved objects.
pub(crate) fn resolve_stream(
    bytes: &[u8],
    backend: &dyn CompressBackend,
    resolver: Option<&mut dyn BaseResolver>,
) -> Result<(Vec<Resolved>, ObjectId), PackError> {
    let (count, body, checksum) = open(bytes)?;
    log::debug!("pack: {count} entries, {} bytes", bytes.len());

    let mut scanner = EntryScanner::new(body, count, backend);
    let mut deltas = DeltaResolver::new();
    for entry in scanner.by_ref() {
        deltas.add_entry(entry?)?;
    }
    scanner.finish()?;
    Ok((deltas.finish(resolver)?, checksum))
}
