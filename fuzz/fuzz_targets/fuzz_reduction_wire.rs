#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Err(violation) = dv_conformance::fuzz_reduction_bytes(data) {
        panic!("reduction wire record invalid: {violation}");
    }
});
