//! Share proxy forwarding cost: unbound rejection, local acknowledgement and
//! forwarding to a bound resource

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use ion_mgnt::mock::EchoResource;
use ion_mgnt::{ShareProxy, SHARE_MODE_CMD};

fn bench_forwarding(c: &mut Criterion) {
    let mut group = c.benchmark_group("share_proxy");

    let unbound = ShareProxy::new();
    group.bench_function("unbound", |b| {
        b.iter(|| unbound.ioctl(black_box(0x10), black_box(0)))
    });

    group.bench_function("share_mode_ack", |b| {
        b.iter(|| unbound.ioctl(black_box(SHARE_MODE_CMD), black_box(0)))
    });

    let bound = ShareProxy::new();
    bound
        .bind(Arc::new(EchoResource::new()))
        .expect("fresh proxy");
    group.bench_function("forward", |b| {
        b.iter(|| bound.ioctl(black_box(0x10), black_box(0x2000)))
    });

    group.finish();
}

criterion_group!(benches, bench_forwarding);
criterion_main!(benches);
