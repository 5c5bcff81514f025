use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use oxipack::delta::{self, MatcherConfig, index::BlockIndex};
use oxipack::object::{Blob, ObjectGraph, ObjectHandle, Tree};
use oxipack::pack::{self, PackOptions, PackWriter};
use std::fs;
use std::path::Path;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

/// Line-oriented text, the shape the block matcher is tuned for.
fn gen_text(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size + 64);
    while out.len() < size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        let width = 8 + (s >> 58) as usize;
        for i in 0..width {
            out.push(b'a' + ((s >> (i % 32)) % 26) as u8);
        }
        out.push(b'\n');
    }
    out.truncate(size);
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

/// A tree of `files` text blobs, each a small edit of the previous one.
fn gen_tree(files: usize, size: usize) -> (ObjectGraph, ObjectHandle) {
    let mut graph = ObjectGraph::new();
    let mut tree = Tree::new();
    let mut content = gen_text(size, 42);
    for i in 0..files {
        content = mutate(&content, size / 4 + i);
        let blob = graph.insert(Blob::new(content.clone()));
        tree.insert(format!("file-{i:04}"), blob).unwrap();
    }
    let root = graph.insert(tree);
    (graph, root)
}

fn pack_with(graph: &ObjectGraph, root: ObjectHandle, options: PackOptions) -> Vec<u8> {
    let mut writer = PackWriter::with_options(graph, options);
    writer.add(root).unwrap();
    writer.finish().unwrap()
}

fn write_ratio_snapshot() {
    let (graph, root) = gen_tree(64, 16 * 1024);
    let mut csv = String::from("window,pack_bytes\n");
    for window in [0usize, 1, 4, 10, 32] {
        let options = PackOptions {
            delta_window: window,
            ..PackOptions::default()
        };
        let bytes = pack_with(&graph, root, options);
        csv.push_str(&format!("{window},{}\n", bytes.len()));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("pack_window_snapshot.csv"), csv);
}

fn bench_diff_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("diff_speed_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let base = gen_text(size, 1);
        let target = mutate(&base, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let encoded = delta::diff(black_box(&base), black_box(&target));
                black_box(encoded);
            });
        });
    }
    g.finish();
}

fn bench_diff_binary(c: &mut Criterion) {
    let mut g = c.benchmark_group("diff_binary_mb_s");
    for size in [64 * 1024usize, 1024 * 1024] {
        let base = gen_data(size, 5);
        let target = mutate(&base, 4096);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(delta::diff(black_box(&base), black_box(&target))));
        });
    }
    g.finish();
}

fn bench_patch_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("patch_speed_vs_output");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let base = gen_text(size, 2);
        let target = mutate(&base, 2048);
        let encoded = delta::diff(&base, &target);
        g.throughput(Throughput::Bytes(target.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let out = delta::patch(black_box(&base), black_box(&encoded)).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

fn bench_block_index(c: &mut Criterion) {
    let mut g = c.benchmark_group("block_index_build");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let base = gen_text(size, 3);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let index = BlockIndex::new(black_box(&base), MatcherConfig::default().max_block);
                black_box(index.len());
            });
        });
    }
    g.finish();
}

fn bench_pack_encode(c: &mut Criterion) {
    write_ratio_snapshot();
    let mut g = c.benchmark_group("pack_encode");
    let (graph, root) = gen_tree(64, 16 * 1024);
    for window in [0usize, 10] {
        let options = PackOptions {
            delta_window: window,
            ..PackOptions::default()
        };
        g.bench_with_input(BenchmarkId::new("window", window), &window, |b, _| {
            b.iter(|| black_box(pack_with(&graph, root, options)));
        });
    }
    g.finish();
}

fn bench_pack_decode(c: &mut Criterion) {
    let mut g = c.benchmark_group("pack_decode");
    let (graph, root) = gen_tree(64, 16 * 1024);
    for window in [0usize, 10] {
        let options = PackOptions {
            delta_window: window,
            ..PackOptions::default()
        };
        let bytes = pack_with(&graph, root, options);
        g.throughput(Throughput::Bytes(bytes.len() as u64));
        g.bench_with_input(BenchmarkId::new("window", window), &window, |b, _| {
            b.iter(|| {
                let unpacked = pack::decode(black_box(&bytes)).unwrap();
                black_box(unpacked.len());
            });
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_diff_speed,
    bench_diff_binary,
    bench_patch_speed,
    bench_block_index,
    bench_pack_encode,
    bench_pack_decode
);
criterion_main!(benches);
