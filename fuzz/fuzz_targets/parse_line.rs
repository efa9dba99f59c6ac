#![no_main]

use histon_ingest::parse_line;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        // 어떤 입력에도 패닉 없이 이벤트와 매칭 종류를 돌려줘야 한다
        let (ev, _) = parse_line("0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d", line);
        assert!(!ev.session_id.is_empty() || !ev.parse_ok);
    }
});
