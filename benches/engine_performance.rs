//! Engine Performance Benchmarks
//!
//! Two kinds of work have deadlines:
//!
//! - the per-buffer processors (sample-and-hold reducer, grain playback) run
//!   inside the audio callback and must finish well within
//!   `buffer_size / sample_rate`
//! - curve regeneration and mode switches run on the UI thread and should stay
//!   below one display frame (~16 ms) so sliders and mode buttons feel immediate
//!
//! | Sample Rate | Buffer 128 | Buffer 256 | Buffer 512 |
//! |-------------|------------|------------|------------|
//! | 44.1 kHz    | 2.90 ms    | 5.80 ms    | 11.61 ms   |
//! | 48 kHz      | 2.67 ms    | 5.33 ms    | 10.67 ms   |

use core::time::Duration;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tiltsynth::prelude::*;

const SAMPLE_RATES: [f64; 2] = [44100.0, 48000.0];
const BUFFER_SIZES: [usize; 3] = [128, 256, 512];
const CURVE_RESOLUTIONS: [usize; 3] = [1024, 8192, 44100];

// ============================================================================
// Helper Functions
// ============================================================================

fn running_session(sample_rate: f64) -> EngineSession {
    let config = SessionConfig {
        sample_rate,
        seed: Some(1),
        ..SessionConfig::default()
    };
    let mut session = EngineSession::new(config).unwrap();
    session.request_start();
    session.engine_started(Ok(())).unwrap();
    session
}

fn test_signal(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i as f32) * 0.05).sin()).collect()
}

// ============================================================================
// Audio Callback Benchmarks
// ============================================================================

fn bench_sample_reducer(c: &mut Criterion) {
    let mut group = c.benchmark_group("reducer");

    for buffer_size in BUFFER_SIZES {
        let input = test_signal(buffer_size);
        let mut output = vec![0.0; buffer_size];

        group.throughput(Throughput::Elements(buffer_size as u64));
        group.bench_with_input(
            BenchmarkId::new("hold_23", buffer_size),
            &buffer_size,
            |b, _| {
                let mut reducer = SampleReducer::new(23);
                b.iter(|| reducer.process_block(black_box(&input), &mut output));
            },
        );
    }

    group.finish();
}

fn bench_grain_playback(c: &mut Criterion) {
    let mut group = c.benchmark_group("grains");

    for sample_rate in SAMPLE_RATES {
        for buffer_size in BUFFER_SIZES {
            let name = format!("{}kHz/{}samples", sample_rate as u32 / 1000, buffer_size);
            let input = test_signal(buffer_size);
            let mut output = vec![0.0; buffer_size];

            group.throughput(Throughput::Elements(buffer_size as u64));
            group.bench_with_input(
                BenchmarkId::new("full_voices", &name),
                &sample_rate,
                |b, &sr| {
                    let config = GrainConfig::default();
                    let mut grains = GrainScheduler::new(config, sr);
                    let mut rng = Rng::from_seed(3);
                    grains.set_grain_seconds(0.2);
                    grains.start(Duration::ZERO);

                    // Fill the recorder and every voice slot
                    grains.record(&vec![0.5; (config.buffer_seconds * sr) as usize]);
                    for i in 1..=config.max_voices as u64 {
                        grains.poll(Duration::from_millis(i * config.period_ms), &mut rng);
                    }

                    b.iter(|| grains.process_block(black_box(&input), &mut output));
                },
            );
        }
    }

    group.finish();
}

// ============================================================================
// Control Path Benchmarks
// ============================================================================

fn bench_curve_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("curves");
    let kinds = [
        ("distortion", CurveKind::Distortion { amount: 800.0 }),
        ("fold", CurveKind::Fold),
        (
            "bitcrush",
            CurveKind::Bitcrush {
                crush: 12,
                dither: true,
            },
        ),
        ("noise", CurveKind::Noise { percent: 75.0 }),
    ];

    for resolution in CURVE_RESOLUTIONS {
        for (name, kind) in kinds {
            group.bench_with_input(BenchmarkId::new(name, resolution), &resolution, |b, &n| {
                let mut rng = Rng::from_seed(5);
                b.iter(|| black_box(generate_curve(kind, n, &mut rng)));
            });
        }
    }

    group.finish();
}

fn bench_mode_switch(c: &mut Criterion) {
    c.bench_function("session/mode_cycle", |b| {
        let mut session = running_session(44100.0);
        b.iter(|| {
            for mode in Mode::ALL {
                black_box(session.switch_mode(mode).unwrap());
            }
            session.drain_events();
        });
    });
}

fn bench_orientation(c: &mut Criterion) {
    let mut group = c.benchmark_group("session/orientation");

    for sets in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("glitch", sets), &sets, |b, &n| {
            let mut session = running_session(44100.0);
            session.switch_mode(Mode::Glitch).unwrap();
            for _ in 1..n {
                session.add_oscillator_set();
            }
            let mut angle = 0.0;
            b.iter(|| {
                angle = (angle + 1.0) % 360.0;
                session.handle_orientation(Some(angle), Some(angle - 180.0), Some(45.0));
                session.drain_events();
            });
        });
    }

    group.finish();
}

criterion_group!(audio_benches, bench_sample_reducer, bench_grain_playback,);

criterion_group!(
    control_benches,
    bench_curve_generation,
    bench_mode_switch,
    bench_orientation,
);

criterion_main!(audio_benches, control_benches);
