//! 라인 파서 벤치마크

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use histon_ingest::parse_line;

const TENANT: &str = "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d";

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");

    group.bench_function("strict_with_cwd", |b| {
        b.iter(|| {
            parse_line(
                black_box(TENANT),
                black_box("20240115.103005 - a1b2c3d4 - host.example [cwd=/home/user/work] > git log --oneline -20"),
            )
        })
    });

    group.bench_function("strict_minimal", |b| {
        b.iter(|| {
            parse_line(
                black_box(TENANT),
                black_box("20240115.103005 - a1b2c3d4 - host > ls"),
            )
        })
    });

    group.bench_function("legacy_two_space", |b| {
        b.iter(|| {
            parse_line(
                black_box(TENANT),
                black_box("20240115.103005 - a1b2c3d4 - host.example  make -j8 all"),
            )
        })
    });

    group.bench_function("no_match_fallthrough", |b| {
        b.iter(|| {
            parse_line(
                black_box(TENANT),
                black_box("completely unstructured noise without timestamp"),
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parse_line);
criterion_main!(benches);
