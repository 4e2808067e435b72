#![no_main]

use libfuzzer_sys::fuzz_target;

const MAX_INPUT_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_INPUT_BYTES {
        return;
    }
    if let Err(violation) = dv_conformance::fuzz_select_prune_bytes(data) {
        panic!("select prune left the shape inconsistent: {violation}");
    }
});
