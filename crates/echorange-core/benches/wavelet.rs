use criterion::{black_box, criterion_group, criterion_main, Criterion};
use echorange_core::device::simulated::SimulatedRoom;
use echorange_core::{SignalProcessor, SonarConfig, Stripe};

fn recording(config: &SonarConfig) -> echorange_core::SampleBuffer {
    SimulatedRoom::new(config.clone())
        .with_reflection(2.0, 0.15)
        .render(true)
}

fn bench_stripe(c: &mut Criterion) {
    let config = SonarConfig::default();
    let sample = recording(&config);

    c.bench_function("stripe_from_sample", |b| {
        b.iter(|| Stripe::from_sample(black_box(&sample), &config))
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let config = SonarConfig::default();
    let sample = recording(&config);
    let processor = SignalProcessor::new(config);

    c.bench_function("process_recording", |b| {
        b.iter(|| processor.process(black_box(&sample)))
    });
}

criterion_group!(benches, bench_stripe, bench_pipeline);
criterion_main!(benches);
