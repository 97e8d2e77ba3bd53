use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shardsift_dedup::records::{signature_path, RecordWriter};
use shardsift_dedup::{DuplicateFinder, HashSignature, SignatureConfig, SignatureGenerator};
use tempfile::TempDir;

fn generate_document(sentences: usize, seed: usize) -> String {
    (0..sentences)
        .map(|i| {
            format!(
                "Sentence {} of document {} talks about topic {} in some detail.",
                i,
                seed,
                (i + seed) % 7
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signatures");
    let generator = SignatureGenerator::new(&SignatureConfig::default()).unwrap();

    for sentences in [10usize, 100, 1000] {
        let text = generate_document(sentences, 1);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("document", sentences), &text, |b, text| {
            b.iter(|| generator.document_signatures(black_box(text), 0))
        });
    }

    group.finish();
}

fn write_shards(dir: &std::path::Path, shards: usize, per_shard: usize) {
    for shard in 0..shards {
        let mut sigs: Vec<HashSignature> = (0..per_shard)
            .map(|i| {
                // every tenth hash repeats across shards
                let hash = if i % 10 == 0 { i as u64 } else { (shard * per_shard + i) as u64 * 31 };
                HashSignature::new(hash, i as u32, 0)
            })
            .collect();
        sigs.sort_unstable();
        let mut writer = RecordWriter::create(signature_path(dir, shard)).unwrap();
        for sig in &sigs {
            writer.write(sig).unwrap();
        }
        writer.finish().unwrap();
    }
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(20);

    for shards in [4usize, 16] {
        let dir = TempDir::new().unwrap();
        let sigs = dir.path().join("sigs");
        let dups = dir.path().join("dups");
        let per_shard = 10_000;
        write_shards(&sigs, shards, per_shard);

        group.throughput(Throughput::Elements((shards * per_shard) as u64));
        group.bench_with_input(BenchmarkId::new("shards", shards), &shards, |b, _| {
            let finder = DuplicateFinder::new(&sigs, &dups);
            b.iter(|| finder.run().unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_signatures, bench_merge);
criterion_main!(benches);
