use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tabular_mdp::{EvaluationMethod, GridWorld};

const SIDES: &[usize] = &[4, 8, 16];

fn grid(side: usize) -> GridWorld {
    GridWorld::new(side, side, &[0, side * side - 1]).unwrap()
}

fn bench_value_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_iteration");
    for &side in SIDES {
        let gw = grid(side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &gw, |b, gw| {
            b.iter(|| black_box(gw.mdp().value_iteration().nth(100)));
        });
    }
    group.finish();
}

fn bench_policy_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_iteration");
    for &side in SIDES {
        let gw = grid(side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &gw, |b, gw| {
            b.iter(|| black_box(gw.mdp().policy_iteration(None).unwrap().nth(100)));
        });
    }
    group.finish();
}

fn bench_policy_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_evaluation");
    for &side in SIDES {
        let gw = grid(side);
        group.bench_with_input(BenchmarkId::new("solve", side), &gw, |b, gw| {
            b.iter(|| {
                let mut steps = gw
                    .mdp()
                    .evaluate_policy(None, Some(EvaluationMethod::Solve))
                    .unwrap();
                black_box(steps.next())
            });
        });
        group.bench_with_input(BenchmarkId::new("iter", side), &gw, |b, gw| {
            b.iter(|| {
                let steps = gw
                    .mdp()
                    .evaluate_policy(None, Some(EvaluationMethod::Iter))
                    .unwrap();
                black_box(steps.take(100).last())
            });
        });
    }
    group.finish();
}

fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");
    for &side in SIDES {
        let gw = grid(side);
        let (_, policy, _) = gw.mdp().policy_iteration(None).unwrap().nth(200).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        group.bench_with_input(BenchmarkId::from_parameter(side), &gw, |b, gw| {
            b.iter(|| black_box(gw.mdp().sample_with_rng(&mut rng, Some(&policy), None)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_value_iteration,
    bench_policy_iteration,
    bench_policy_evaluation,
    bench_sample
);
criterion_main!(benches);
