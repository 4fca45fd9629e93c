#![no_main]

use hftest::protocol;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Console output is treated as text (ignore invalid UTF-8)
    if let Ok(raw) = std::str::from_utf8(data) {
        let lines = protocol::extract_log_lines(raw);
        let _ = protocol::classify(&lines);
        let _ = protocol::failure_message(&lines);
        let _ = protocol::parse_catalog(&lines);
    }
});
