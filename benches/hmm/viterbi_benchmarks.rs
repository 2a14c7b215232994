use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fhmm_nilm::hmm::{viterbi, ApplianceHmm, JointHmm};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn appliance(k: usize, scale: f64) -> ApplianceHmm {
    let stay = 0.9;
    let leave = (1.0 - stay) / (k - 1) as f64;
    let transition = (0..k)
        .map(|i| (0..k).map(|j| if i == j { stay } else { leave }).collect())
        .collect();
    ApplianceHmm::from_vecs(
        vec![1.0 / k as f64; k],
        transition,
        (0..k).map(|s| s as f64 * scale).collect(),
        vec![4.0; k],
    )
    .unwrap()
}

fn models(n: usize) -> Vec<ApplianceHmm> {
    (0..n).map(|i| appliance(3, 50.0 * (i + 1) as f64)).collect()
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine");
    for n in [2, 3, 4, 5] {
        let ms = models(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &ms, |b, ms| {
            b.iter(|| black_box(JointHmm::combine(black_box(ms), 5.0).unwrap()))
        });
    }
    group.finish();
}

fn bench_viterbi(c: &mut Criterion) {
    let mut group = c.benchmark_group("viterbi");
    group.sample_size(20);
    for n in [2, 3, 4] {
        let ms = models(n);
        let joint = JointHmm::combine(&ms, 5.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut mains = vec![0.0; 1440];
        for m in &ms {
            let (_, readings) = m.sample(mains.len(), &mut rng);
            for (total, r) in mains.iter_mut().zip(readings) {
                *total += r;
            }
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &mains, |b, mains| {
            b.iter(|| black_box(viterbi(&joint, black_box(mains)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_combine, bench_viterbi);
criterion_main!(benches);
