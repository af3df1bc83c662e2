//! Fuzz target: observation and stored-record decoding
//!
//! Arbitrary bytes must decode to an error or to an observation that
//! re-encodes without panicking. Whatever decodes must decode again from
//! its own encoding.
//!
//! cargo fuzz run fuzz_observation_decoder

#![no_main]

use ghs_peripheral::observation::{decode, decode_stored, encode_stored};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(obs) = decode(data) {
        let bytes = obs.to_bytes();
        assert!(decode(&bytes).is_ok(), "re-encoded observation must decode");
    }

    if let Ok((record_number, obs)) = decode_stored(data) {
        let bytes = encode_stored(record_number, &obs);
        let (again, _) = decode_stored(&bytes).expect("re-encoded record must decode");
        assert_eq!(again, record_number);
    }
});
