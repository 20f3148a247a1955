//! Criterion benchmarks for delayed lookups and reflex evaluation.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use proprio::channel::{ChannelArena, StretchVelocitySensor, TendonLengthSensor};
use proprio::controller::{ReflexConfig, ReflexController};
use proprio::history::SignalHistory;
use proprio::host::{Controls, Process, SimState};

const DT: f64 = 1e-3;

fn filled_history(samples: usize) -> SignalHistory {
    let mut history = SignalHistory::new("bench");
    for i in 0..samples {
        let t = i as f64 * DT;
        history.add_point(t, (t * 7.0).sin());
    }
    history
}

/// Benchmark delayed_value() against history length.
fn bench_lookup_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("delayed_lookup");

    for size in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("committed", size), size, |b, &size| {
            let history = filled_history(size);
            let end = size as f64 * DT;
            let mut q = 0.0;
            b.iter(|| {
                q = (q + 0.37) % end;
                black_box(history.delayed_value(black_box(q), 0.03))
            });
        });
    }

    group.finish();
}

/// Benchmark in-order appends with and without a retention window.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("unbounded", |b| {
        b.iter(|| black_box(filled_history(10_000).len()));
    });

    group.bench_function("retention_100ms", |b| {
        b.iter(|| {
            let mut history = SignalHistory::new("bench").with_retention(0.1);
            for i in 0..10_000 {
                let t = i as f64 * DT;
                history.add_point(t, t);
            }
            black_box(history.len())
        });
    });

    group.finish();
}

struct Frame(f64);

impl SimState for Frame {
    fn time(&self) -> f64 {
        self.0
    }
}

struct Stretched {
    name: String,
}

impl Process for Stretched {
    type State = Frame;

    fn name(&self) -> &str {
        &self.name
    }

    fn length(&self, state: &Frame) -> f64 {
        0.2 + 0.01 * (state.0 * 3.0).sin()
    }

    fn lengthening_speed(&self, state: &Frame) -> f64 {
        0.03 * (state.0 * 3.0).cos()
    }

    fn tendon_length(&self, state: &Frame) -> f64 {
        0.1 + 0.002 * (state.0 * 3.0).sin()
    }

    fn optimal_fiber_length(&self) -> f64 {
        0.2
    }

    fn tendon_slack_length(&self) -> f64 {
        0.1
    }

    fn max_contraction_velocity(&self) -> f64 {
        10.0
    }
}

/// Benchmark a full evaluate + commit cycle as a host would run it.
fn bench_controller_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller_cycle");

    for muscles in [1, 8, 32].iter() {
        group.throughput(Throughput::Elements(*muscles as u64));

        group.bench_with_input(BenchmarkId::new("split_gain", muscles), muscles, |b, &n| {
            let processes: Vec<Stretched> = (0..n)
                .map(|i| Stretched {
                    name: format!("m{i}"),
                })
                .collect();

            let mut arena = ChannelArena::new();
            for i in 0..n {
                let name = format!("m{i}");
                let spindle = StretchVelocitySensor::new(format!("spindle_{i}"), name.as_str(), 1.0, 0.03)
                    .expect("spindle")
                    .with_retention(0.1)
                    .expect("retention covers delay");
                let gto = TendonLengthSensor::new(format!("gto_{i}"), name.as_str(), 0.03)
                    .expect("golgi")
                    .with_retention(0.1)
                    .expect("retention covers delay");
                arena.add(spindle).expect("unique spindle");
                arena.add(gto).expect("unique golgi");
            }
            let mut controller = ReflexController::new(
                "reflex",
                ReflexConfig::split(1.0, 0.5)
                    .with_spindles(["ALL"])
                    .with_golgis(["ALL"]),
            )
            .expect("controller");
            arena.connect(&processes).expect("channels connect");
            controller.connect(&arena, &processes).expect("controller connects");

            let mut t = 0.0;
            let mut controls = Controls::new(n);
            b.iter(|| {
                t += DT;
                controls.reset();
                let eval = controller
                    .compute_controls(&arena, &processes, &Frame(t), &mut controls)
                    .expect("evaluation");
                controller.commit(&mut arena, &eval);
                black_box(controls.get(0))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lookup_sizes, bench_append, bench_controller_cycle);
criterion_main!(benches);
