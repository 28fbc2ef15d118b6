//! Benchmarks for format detection and option binding.
//!
//! Benchmark targets:
//! - Prefix detection over the built-in formats: <10us
//! - Binding a small option map: <50us

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use atomio::io::binder;
use atomio::io::formats::xyz::XyzImportOptions;
use atomio::{FormatRegistry, Location, OptionMap};
use serde_json::json;

// ============================================================================
// Detection Benchmarks
// ============================================================================

const XYZ_PREFIX: &str = "3\nwater\nO 0.0 0.0 0.0\nH 0.757 0.586 0.0\nH -0.757 0.586 0.0\n";
const LAMMPS_PREFIX: &str =
    "ITEM: TIMESTEP\n100\nITEM: NUMBER OF ATOMS\n2\nITEM: BOX BOUNDS pp pp pp\n0 10\n0 10\n0 10\n";
const UNKNOWN_PREFIX: &str = "This file is not in any known particle format.\n";

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_prefix");
    group.measurement_time(Duration::from_secs(5));

    let registry = FormatRegistry::with_builtin_formats();
    let location = Location::local("sample.dat");

    for (name, prefix) in [
        ("xyz", XYZ_PREFIX),
        ("lammps_dump", LAMMPS_PREFIX),
        ("unknown", UNKNOWN_PREFIX),
    ] {
        group.throughput(Throughput::Bytes(prefix.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), prefix, |b, prefix| {
            b.iter(|| registry.detect_prefix(black_box(prefix.as_bytes()), &location));
        });
    }

    group.finish();
}

// ============================================================================
// Binding Benchmarks
// ============================================================================

fn bench_binding(c: &mut Criterion) {
    let mut group = c.benchmark_group("bind_options");

    let mut options = OptionMap::new();
    options.insert("multiple_frames".to_string(), json!(true));
    options.insert(
        "columns".to_string(),
        json!(["Particle Type", "Position.X", "Position.Y", "Position.Z"]),
    );

    group.bench_function("xyz_import_options", |b| {
        b.iter(|| {
            let mut target = XyzImportOptions::default();
            binder::bind(&mut target, black_box(&options), "XYZ importer").unwrap();
            target
        });
    });

    group.finish();
}

criterion_group!(benches, bench_detection, bench_binding);
criterion_main!(benches);
