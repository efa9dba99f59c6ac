#![no_main]

use histon_ingest::spool::build_record;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let record = build_record(42, line);
        // 레코드는 항상 정확히 한 줄이어야 한다 (말미 LF 하나)
        assert!(record.ends_with('\n'));
        assert_eq!(record.matches('\n').count(), 1);
        assert!(record.starts_with("42\t"));
    }
});
