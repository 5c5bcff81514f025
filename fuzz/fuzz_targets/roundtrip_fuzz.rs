#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipack::delta::{self, MatcherConfig};
use oxipack::object::{Blob, ObjectGraph};
use oxipack::pack::{self, PackOptions, PackWriter};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte tunes the matcher and the writer.
    let flags = data[0];
    let payload = &data[1..];
    let split = payload.len() / 2;
    let (base, target) = payload.split_at(split);

    let config = MatcherConfig {
        max_block: 1 + usize::from(flags & 0x7F),
        min_match: 1 + usize::from(flags >> 5),
        long_enough_divisor: usize::from(flags & 0x07),
    };
    let encoded = delta::diff_with_config(base, target, &config);
    assert_eq!(delta::patch(base, &encoded).unwrap(), target);

    let mut graph = ObjectGraph::new();
    let first = graph.insert(Blob::new(base.to_vec()));
    let second = graph.insert(Blob::new(target.to_vec()));
    let options = PackOptions {
        delta_window: usize::from(flags & 0x03),
        offset_deltas: flags & 0x80 == 0,
        ..PackOptions::default()
    };
    let mut writer = PackWriter::with_options(&graph, options);
    writer.add(first).unwrap();
    writer.add(second).unwrap();
    let bytes = writer.finish().unwrap();

    let unpacked = pack::decode(&bytes).unwrap();
    let second_id = graph.id(second).unwrap();
    let blob = unpacked.get(&second_id).and_then(|o| o.as_blob()).unwrap();
    assert_eq!(blob.content(), target);
});
