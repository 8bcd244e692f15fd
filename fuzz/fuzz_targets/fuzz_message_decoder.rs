//! Fuzz target: `decode_message`
//!
//! Arbitrary bytes must decode to a message or a frame error, never a
//! panic.  Anything that decodes must survive a re-encode.
//!
//! cargo fuzz run fuzz_message_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use simlink::rpc::codec::{decode_message, encode_message};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = decode_message(data) {
        let text = encode_message(&message).expect("decoded message re-encodes");
        let again = decode_message(text.as_bytes()).expect("re-encoded message decodes");
        assert_eq!(again, message);
    }
});
