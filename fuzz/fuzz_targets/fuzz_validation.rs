//! Fuzz testing for request header parsing.
//!
//! Every signed-request header passes through `validate_header_value` and the
//! timestamp through `parse_timestamp` before any cryptographic work, so both
//! see raw attacker input. They must never panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use privacy_inspector::validation::{
    MAX_CLIENT_ID_LENGTH, MAX_NONCE_LENGTH, MAX_SIGNATURE_LENGTH, MAX_TIMESTAMP_LENGTH,
    parse_timestamp, validate_header_value,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        for max_len in [
            MAX_CLIENT_ID_LENGTH,
            MAX_NONCE_LENGTH,
            MAX_SIGNATURE_LENGTH,
            MAX_TIMESTAMP_LENGTH,
        ] {
            let _ = validate_header_value(s, max_len);
        }

        // Accepted timestamps always fit the header bound
        if validate_header_value(s, MAX_TIMESTAMP_LENGTH).is_ok() {
            let _ = parse_timestamp(s);
        }
    }
});
