#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipack::delta;

fuzz_target!(|data: &[u8]| {
    // Arbitrary instruction streams must only ever produce errors.
    let _ = delta::patch(&[], data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (base, instructions) = data.split_at(split);
        let _ = delta::patch(base, instructions);
        if let Ok((_, iter)) = delta::instructions(instructions) {
            for instruction in iter {
                if instruction.is_err() {
                    break;
                }
            }
        }
    }
});
