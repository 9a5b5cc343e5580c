use criterion::{criterion_group, criterion_main, Criterion};

#[path = "../tests/common/mod.rs"]
mod common;

use mailbinder::document::fingerprint::fingerprint;
use mailbinder::document::fragment::{embed_document, merge_fragments};

fn bench_fingerprint(c: &mut Criterion) {
    let payload = common::sample_pdf(50, "fingerprint bench");

    c.bench_function("fingerprint_50_page_pdf", |b| {
        b.iter(|| fingerprint(&payload))
    });
}

fn bench_merge(c: &mut Criterion) {
    let fragments: Vec<_> = (0..20)
        .map(|n| embed_document(&common::sample_pdf(5, &format!("part {n}"))).unwrap())
        .collect();

    c.bench_function("merge_20_fragments", |b| {
        b.iter(|| merge_fragments(&fragments).unwrap())
    });
}

criterion_group!(benches, bench_fingerprint, bench_merge);
criterion_main!(benches);
