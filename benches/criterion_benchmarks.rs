use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::fs;
use std::path::Path;
use verdelta::delta::{apply, diff_dense, diff_sparse};
use verdelta::integrity::{HashAlgorithm, attach_hash, verify};
use verdelta::snapshot::{SharedSnapshot, Snapshot};
use verdelta::wire::{from_wire, to_wire};

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

fn write_size_snapshot() {
    let source = gen_data(2 * 1024 * 1024, 123);
    let mut csv = String::from("stride,sparse_bytes,dense_bytes,target_bytes,ratio\n");
    for stride in [1usize, 2, 8, 64, 512, 4096] {
        let target = mutate(&source, stride);
        let sparse = to_wire(&diff_sparse(Some(&source), &target)).unwrap();
        let dense = to_wire(&diff_dense(Some(&target))).unwrap();
        let ratio = sparse.len() as f64 / target.len() as f64;
        csv.push_str(&format!(
            "{stride},{},{},{},{}\n",
            sparse.len(),
            dense.len(),
            target.len(),
            ratio
        ));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("delta_size_snapshot.csv"), csv);
}

fn bench_diff_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("diff_sparse_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let source = gen_data(size, 1);
        let target = mutate(&source, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let delta = diff_sparse(
                    Some(black_box(source.as_slice())),
                    black_box(target.as_slice()),
                );
                black_box(delta);
            });
        });
    }
    g.finish();
}

fn bench_apply_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("apply_sparse_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let source = gen_data(size, 2);
        let target = mutate(&source, 2048);
        let delta = diff_sparse(Some(&source), &target);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(apply(Some(black_box(source.as_slice())), black_box(&delta))));
        });
    }
    g.finish();
}

fn bench_change_density(c: &mut Criterion) {
    write_size_snapshot();
    let mut g = c.benchmark_group("diff_vs_change_density");
    let source = gen_data(2 * 1024 * 1024, 3);
    for stride in [1usize, 8, 512, 4096] {
        let target = mutate(&source, stride);
        g.bench_with_input(BenchmarkId::from_parameter(stride), &stride, |b, _| {
            b.iter(|| black_box(diff_sparse(Some(&source), &target)));
        });
    }
    g.finish();
}

fn bench_integrity(c: &mut Criterion) {
    let mut g = c.benchmark_group("integrity_mb_s");
    let size = 4 * 1024 * 1024usize;
    let target = gen_data(size, 4);
    g.throughput(Throughput::Bytes(size as u64));
    for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
        let delta = attach_hash(diff_dense(Some(&target)), &target, alg);
        g.bench_function(alg.name(), |b| {
            b.iter(|| black_box(verify(&delta, Some(black_box(target.as_slice())))));
        });
    }
    g.finish();
}

fn bench_wire(c: &mut Criterion) {
    let mut g = c.benchmark_group("wire_roundtrip");
    for size in [64 * 1024usize, 1024 * 1024] {
        let source = gen_data(size, 5);
        let target = mutate(&source, 256);
        let delta = attach_hash(diff_sparse(Some(&source), &target), &target, HashAlgorithm::Sha256);
        let bytes = to_wire(&delta).unwrap();
        g.throughput(Throughput::Bytes(bytes.len() as u64));
        g.bench_with_input(BenchmarkId::new("encode", size), &size, |b, _| {
            b.iter(|| black_box(to_wire(black_box(&delta)).unwrap()));
        });
        g.bench_with_input(BenchmarkId::new("decode", size), &size, |b, _| {
            b.iter(|| black_box(from_wire(black_box(bytes.as_slice()), delta.layout()).unwrap()));
        });
    }
    g.finish();
}

fn bench_replication(c: &mut Criterion) {
    let mut g = c.benchmark_group("replication_scenarios");
    let scenarios = [
        ("config_blob", 16 * 1024usize, 64usize),
        ("document_versioning", 512 * 1024usize, 256usize),
        ("game_state", 1024 * 1024usize, 4096usize),
    ];

    for (name, size, stride) in scenarios {
        let base = gen_data(size, size as u64);
        let next = mutate(&base, stride);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_function(name, |b| {
            b.iter(|| {
                let mut writer = Snapshot::new(Some(base.clone()));
                let mut reader = Snapshot::new(Some(base.clone()));
                let delta = writer.change_data(&next);
                reader.increment_data(&delta, false).unwrap();
                black_box(reader);
            });
        });
    }

    let shared = SharedSnapshot::new(Snapshot::new(Some(gen_data(64 * 1024, 6))));
    let payloads = [gen_data(64 * 1024, 7), gen_data(64 * 1024, 8)];
    g.bench_function("shared_change_data", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i ^= 1;
            black_box(shared.change_data(&payloads[i]));
        });
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_diff_speed,
    bench_apply_speed,
    bench_change_density,
    bench_integrity,
    bench_wire,
    bench_replication
);
criterion_main!(benches);
