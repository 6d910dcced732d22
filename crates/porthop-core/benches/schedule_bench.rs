//! Port schedule benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use porthop_core::{PortSchedule, ScheduleParams, TimeWindow, TotpGenerator, derive_port};

fn bench_derive_port(c: &mut Criterion) {
    let totp = TotpGenerator::from_base32("JBSWY3DPEHPK3PXP").unwrap();

    c.bench_function("derive_port", |b| {
        b.iter(|| derive_port(&totp, black_box(1_700_000_010), 30, 3000, 1000))
    });
}

fn bench_window(c: &mut Criterion) {
    c.bench_function("time_window_compute", |b| {
        b.iter(|| TimeWindow::compute(black_box(-15), 30, 15, black_box(1_700_000_021)))
    });
}

fn bench_valid_ports(c: &mut Criterion) {
    let totp = TotpGenerator::from_base32("JBSWY3DPEHPK3PXP").unwrap();
    let schedule = PortSchedule::new(
        totp,
        ScheduleParams {
            period: 30,
            extension: 15,
            base_port: 3000,
            port_range: 1000,
            offsets: vec![-30, -15, 0, 15, 30],
        },
    )
    .unwrap();

    c.bench_function("valid_ports_5_offsets", |b| {
        b.iter(|| schedule.valid_ports(black_box(1_700_000_021)))
    });
}

criterion_group!(benches, bench_derive_port, bench_window, bench_valid_ports);
criterion_main!(benches);
