//! Criterion benchmarks for the activation engine.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use nemabot::connectome::Connectome;
use nemabot::engine::{SensoryInput, SimConfig, Simulation, TraversalOrder};
use nemabot::prng::Prng;
use nemabot::storage::{BinaryStepLog, CsvStepLog};

/// Random wiring of `n` interneurons plus the stock sensory neurons.
fn synthetic(n: usize, fanout: usize, seed: u64) -> Connectome {
    let mut rng = Prng::new(seed);
    let sensory = nemabot::engine::FOOD_NEURONS
        .iter()
        .chain(nemabot::engine::TOUCH_NEURONS.iter())
        .map(|s| s.to_string());
    let names: Vec<String> = sensory.chain((0..n).map(|i| format!("N{i:05}"))).collect();

    let mut b = Connectome::builder();
    for name in &names {
        let synapses: Vec<(&str, f32)> = (0..fanout)
            .map(|_| {
                let t = rng.gen_range_usize(0, names.len());
                (names[t].as_str(), rng.gen_range_f32(-4.0, 12.0).round())
            })
            .collect();
        b = b.neuron(name, &synapses);
    }
    b.build().expect("synthetic wiring is valid")
}

fn bench_step_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_size");

    for size in [256usize, 1024, 4096].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("masked", size), size, |b, &size| {
            let cfg = SimConfig::default().with_seed(42);
            let mut sim = Simulation::new(synthetic(size, 12, 7), cfg).unwrap();
            let input = SensoryInput::food(20.0);
            b.iter(|| {
                sim.tick(&input);
                black_box(sim.drive())
            });
        });
    }

    group.finish();
}

fn bench_traversal_orders(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");

    for (label, order) in [
        ("masked", TraversalOrder::MaskedXor),
        ("shuffle", TraversalOrder::Shuffle),
        ("declaration", TraversalOrder::Declaration),
    ] {
        group.bench_function(label, |b| {
            let cfg = SimConfig::default().with_seed(3).with_traversal(order);
            let mut sim = Simulation::new(Connectome::sample().unwrap(), cfg).unwrap();
            sim.set_function_active("Locomotion", true).unwrap();
            b.iter(|| {
                sim.tick(&SensoryInput::food(20.0));
                black_box(sim.segments()[0])
            });
        });
    }

    group.finish();
}

fn bench_step_logs(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_log");

    group.bench_function("csv", |b| {
        let cfg = SimConfig::default().with_seed(5);
        let mut sim = Simulation::new(Connectome::sample().unwrap(), cfg).unwrap();
        sim.attach_log(Box::new(CsvStepLog::new(std::io::sink()))).unwrap();
        b.iter(|| sim.tick(&SensoryInput::food(20.0)));
    });

    group.bench_function("binary", |b| {
        let cfg = SimConfig::default().with_seed(5);
        let mut sim = Simulation::new(Connectome::sample().unwrap(), cfg).unwrap();
        sim.attach_log(Box::new(BinaryStepLog::new(std::io::sink()))).unwrap();
        b.iter(|| sim.tick(&SensoryInput::food(20.0)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_step_sizes,
    bench_traversal_orders,
    bench_step_logs
);
criterion_main!(benches);
