#![no_main]

use libfuzzer_sys::fuzz_target;

/// Deeply nested JSON only exercises the decoder's recursion limit.
const MAX_INPUT_BYTES: usize = 16 * 1024;

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_INPUT_BYTES {
        return;
    }
    if let Err(violation) = dv_conformance::fuzz_expr_equality_bytes(data) {
        panic!("expression equality law violated: {violation}");
    }
});
