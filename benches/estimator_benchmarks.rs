use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pi_sentry::config::{BatteryCurve, LiveConfig};
use pi_sentry::runtime::ewma;
use pi_sentry::runtime::illumination::blink_frequency;
use pi_sentry::runtime::telemetry::{battery_percent, distance_warning};
use pi_sentry::state::{SharedState, StateSnapshot};
use pi_sentry::store::{Sample, Store};

/// Benchmark the state-of-charge estimate at several bus voltages
fn bench_battery_percent(c: &mut Criterion) {
    let curve = BatteryCurve {
        voltage_full: 4.2,
        voltage_empty: 3.3,
        internal_resistance_ohm: 0.15,
    };

    for voltage in [3.3, 3.7, 4.2].iter() {
        c.bench_with_input(
            BenchmarkId::new("battery_percent", voltage),
            voltage,
            |b, &voltage| b.iter(|| battery_percent(&curve, voltage, 0.42)),
        );
    }
}

/// Benchmark smoothing a burst of ranging samples
fn bench_ewma_chain(c: &mut Criterion) {
    let samples: Vec<f64> = (0..64).map(|i| 2.5 - 0.03 * i as f64).collect();

    c.bench_function("ewma_chain_64", |b| {
        b.iter(|| {
            let mut smoothed = None;
            for &sample in &samples {
                smoothed = Some(ewma(smoothed, sample, 0.7));
            }
            smoothed
        })
    });
}

/// Benchmark the per-tick warning rule
fn bench_distance_warning(c: &mut Criterion) {
    c.bench_function("distance_warning", |b| {
        b.iter(|| distance_warning(Some(2.0), Some(1.6), 1.5))
    });
}

/// Benchmark the blink frequency mapping across the ranging band
fn bench_blink_frequency(c: &mut Criterion) {
    let cfg = LiveConfig::default();

    c.bench_function("blink_frequency_sweep", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            let mut distance = 0.1;
            while distance < 4.0 {
                acc += blink_frequency(&cfg, distance);
                distance += 0.1;
            }
            acc
        })
    });
}

/// Benchmark JSON serialization of state snapshots
fn bench_snapshot_serialization(c: &mut Criterion) {
    let state = SharedState::new();
    state.set_distance(1.234);
    let snapshot = state.snapshot();

    c.bench_function("snapshot_serialization", |b| {
        b.iter(|| serde_json::to_string(&snapshot).expect("Should serialize"))
    });

    let json_string = serde_json::to_string(&snapshot).expect("Should serialize");
    c.bench_function("snapshot_deserialization", |b| {
        b.iter(|| {
            serde_json::from_str::<StateSnapshot>(&json_string).expect("Should deserialize")
        })
    });
}

/// Benchmark telemetry sample inserts against an in-memory store
fn bench_sample_insert(c: &mut Criterion) {
    let store = Store::open_in_memory().expect("Should open in-memory store");
    let mut ts = 0i64;

    c.bench_function("sample_insert", |b| {
        b.iter(|| {
            ts += 1;
            let sample = Sample {
                ts,
                distance_m: Some(1.234),
                ambient_rate: None,
                bus_voltage_v: Some(3.9),
                shunt_voltage_v: Some(0.018),
                current_a: Some(0.18),
                power_w: Some(0.7),
            };
            store.insert_sample(&sample).expect("Should insert sample")
        })
    });
}

criterion_group!(
    benches,
    bench_battery_percent,
    bench_ewma_chain,
    bench_distance_warning,
    bench_blink_frequency,
    bench_snapshot_serialization,
    bench_sample_insert
);
criterion_main!(benches);
