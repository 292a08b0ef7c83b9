#![no_main]

use hubcheck::harness::{ProtocolVerdict, classify};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any byte string classifies; failures keep the (lossily decoded) output whole
    if let ProtocolVerdict::Fail(output) = classify(data) {
        assert_eq!(output, String::from_utf8_lossy(data));
    }
});
