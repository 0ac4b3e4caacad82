#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use shardpack_core::{decode_physical, has_magic, MAGIC};

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to the physical record decoder.
    // It should reject every malformed input with an error:
    // - Missing magic
    // - Records too short for a digest
    // - Bad MD5 trailers
    // - Truncated or garbage protobuf bodies
    // - Key indexes past the end of the tables
    let _ = has_magic(data);

    for verify_digest in [true, false] {
        if let Ok(decoded) = decode_physical(Bytes::copy_from_slice(data), verify_digest) {
            decoded.iter().for_each(drop);
        }
    }

    // Same bytes behind a valid magic, without digest checks, to reach the body parser
    let mut framed = MAGIC.to_vec();
    framed.extend_from_slice(data);
    if let Ok(decoded) = decode_physical(Bytes::from(framed), false) {
        let _ = decoded.into_user_records();
    }
});
