/// Pattern-fill and chunked-write throughput benchmarks.
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mediatest::patterns::fill_chunk;
use mediatest::TestPattern;
use std::io::{Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

const BUFFER_SIZE: usize = 4 * 1024 * 1024;

fn bench_pattern_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_fill");
    group.throughput(Throughput::Bytes(BUFFER_SIZE as u64));

    let mut rng = rand::thread_rng();
    let mut buf = vec![0u8; BUFFER_SIZE];

    for pattern in [TestPattern::Zeros, TestPattern::Ones, TestPattern::Random] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", pattern)),
            &pattern,
            |b, &pattern| {
                b.iter(|| fill_chunk(pattern, &mut buf, &mut rng));
            },
        );
    }
    group.finish();
}

fn bench_chunked_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunked_write");
    let total = 16 * 1024 * 1024u64;
    group.throughput(Throughput::Bytes(total));
    group.sample_size(20);

    for chunk_mb in [1usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}MiB", chunk_mb)),
            &chunk_mb,
            |b, &chunk_mb| {
                let chunk = vec![0xAAu8; chunk_mb * 1024 * 1024];
                b.iter(|| {
                    let mut file = NamedTempFile::new().unwrap();
                    let mut written = 0u64;
                    while written < total {
                        file.as_file_mut()
                            .seek(SeekFrom::Start(written))
                            .unwrap();
                        let len = (total - written).min(chunk.len() as u64);
                        file.as_file_mut().write_all(&chunk[..len as usize]).unwrap();
                        written += len;
                    }
                    file.as_file_mut().flush().unwrap();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_pattern_fill, bench_chunked_write);
criterion_main!(benches);
