#![no_main]

use histon_ingest::auth::{extract_token_from_payload, separate_payload_strict};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Some((payload, rest)) = separate_payload_strict(line) {
            // 분리 결과를 합치면 원본 길이를 넘을 수 없다
            assert!(payload.len() + rest.len() <= line.len());
            if let Some((token, cleaned)) = extract_token_from_payload(&payload) {
                assert!(!token.is_empty());
                assert!(cleaned.len() < payload.len());
            }
        }
    }
});
