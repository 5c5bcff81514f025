#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipack::hash;
use oxipack::object::{self, ObjectKind, RawObject};
use oxipack::pack;

fuzz_target!(|data: &[u8]| {
    let _ = pack::decode(data);
    let _ = object::decode_loose(data);

    // Most inputs fail the trailer check. Seal them so the entry parser and
    // the delta resolver see the bytes too.
    let mut sealed = b"PACK".to_vec();
    sealed.extend_from_slice(data);
    if sealed.len() < 12 {
        return;
    }
    sealed[4..8].copy_from_slice(&2u32.to_be_bytes());
    let checksum = hash::digest(&sealed);
    sealed.extend_from_slice(checksum.as_bytes());

    let _ = pack::inspect(&sealed);
    let _ = pack::decode_with_resolver(&sealed, |_: &hash::ObjectId| {
        Some(RawObject::new(ObjectKind::Blob, data.to_vec()))
    });
});
