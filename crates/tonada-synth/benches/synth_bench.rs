//! Criterion benchmarks for the tonada synthesis engine
//!
//! Run with: cargo bench -p tonada-synth
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tonada_core::{EnvelopeDescriptor, Waveform};
use tonada_synth::{
    DescriptorList, GeneratorDescriptor, Patch, PcmSample, SampleStore, SinglePatch, Synthesizer,
};

const SAMPLE_RATE: u32 = 48000;

fn sine_patch() -> Arc<Patch> {
    let descriptors = DescriptorList {
        generators: vec![GeneratorDescriptor::waveform(Waveform::Saw)],
        envelopes: vec![EnvelopeDescriptor::adsr(0.005, 0.1, 0.7, 0.2)],
        ..DescriptorList::default()
    };
    Arc::new(Patch::Single(
        SinglePatch::load("saw", &descriptors, &SampleStore::new()).unwrap(),
    ))
}

fn sampled_patch() -> Arc<Patch> {
    let mut store = SampleStore::new();
    let frames: Vec<f32> = (0..8192).map(|i| (i as f32 * 0.011).sin() * 0.5).collect();
    store.insert(
        PcmSample::from_frames("wave", frames, f64::from(SAMPLE_RATE), 60)
            .with_loop(512.0, 7680.0),
    );
    let descriptors = DescriptorList {
        generators: vec![GeneratorDescriptor::sample("wave")],
        envelopes: vec![EnvelopeDescriptor::adsr(0.005, 0.1, 0.7, 0.2)],
        ..DescriptorList::default()
    };
    Arc::new(Patch::Single(
        SinglePatch::load("wave", &descriptors, &store).unwrap(),
    ))
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("Synthesizer");

    for (label, patch) in [("waveform", sine_patch()), ("sampled", sampled_patch())] {
        for &voices in &[1usize, 8, 32] {
            group.bench_with_input(
                BenchmarkId::new(format!("render_{label}"), voices),
                &voices,
                |b, &voices| {
                    let mut synth = Synthesizer::new(SAMPLE_RATE, 2, 64);
                    synth.set_patch(0, 0, patch.clone());
                    for i in 0..voices {
                        synth.note_on(0, 36 + (i as u8 * 3) % 48, 100);
                    }
                    let mut buffer = vec![0.0f32; 2 * 512];
                    b.iter(|| {
                        buffer.fill(0.0);
                        synth.render(black_box(&mut buffer));
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_note_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("NoteEvents");

    group.bench_function("note_on_off_cycle", |b| {
        let mut synth = Synthesizer::new(SAMPLE_RATE, 2, 32);
        synth.set_patch(0, 0, sine_patch());
        let mut buffer = vec![0.0f32; 2 * 64];
        let mut key = 0u8;
        b.iter(|| {
            key = (key + 7) % 96;
            synth.note_on(0, 24 + key, 100);
            synth.render(&mut buffer);
            synth.note_off(0, 24 + key);
            synth.render(black_box(&mut buffer));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render, bench_note_events);
criterion_main!(benches);
