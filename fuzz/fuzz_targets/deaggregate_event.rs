#![no_main]

use libfuzzer_sys::fuzz_target;
use shardpack_client::{deaggregate_all, parse_records};

fuzz_target!(|data: &[u8]| {
    // Fuzz envelope parsing and deaggregation end to end.
    // Malformed JSON must fail to parse; anything that parses must deaggregate
    // without panicking, whatever the payloads contain.
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(records) = parse_records(json) {
        for record in deaggregate_all(records) {
            let _ = record.kinesis.decode_data();
        }
    }
});
