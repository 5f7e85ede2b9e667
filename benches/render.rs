//! Benchmarks for the synthesis engine's render hot path
//!
//! Run with: cargo bench --bench render

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mt32emu::{Synth, SynthOptions};
use std::hint::black_box;

fn sized_roms() -> (Vec<u8>, Vec<u8>) {
    (vec![0u8; 64 * 1024], vec![0u8; 64 * 1024])
}

fn open_synth() -> Synth {
    let (control_rom, pcm_rom) = sized_roms();
    let mut synth = Synth::new();
    synth.open(&control_rom, &pcm_rom, SynthOptions::default()).unwrap();
    synth
}

fn bench_render_silence(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_silence");

    for frames in [882, 4410, 44100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(frames), frames, |b, &frames| {
            let mut synth = open_synth();
            let mut out = vec![0i16; frames * 2];
            b.iter(|| {
                synth.render(black_box(&mut out)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_render_full_polyphony(c: &mut Criterion) {
    c.bench_function("render_32_partials_441_frames", |b| {
        let mut synth = open_synth();
        for key in 0..32u8 {
            synth.play_msg_immediate(0x90_00_64 | ((key as u32) << 8)).unwrap();
        }
        let mut out = vec![0i16; 441 * 2];
        b.iter(|| {
            synth.render(black_box(&mut out)).unwrap();
        });
    });
}

fn bench_note_on_off_churn(c: &mut Criterion) {
    c.bench_function("note_on_off_churn", |b| {
        let mut synth = open_synth();
        let mut out = vec![0i16; 128 * 2];
        b.iter(|| {
            synth.play_msg_immediate(black_box(0x90_3c_64)).unwrap();
            synth.render(&mut out).unwrap();
            synth.play_msg_immediate(black_box(0x80_3c_40)).unwrap();
            synth.render(&mut out).unwrap();
        });
    });
}

fn bench_sysex_dispatch(c: &mut Criterion) {
    c.bench_function("sysex_reverb_mode_change", |b| {
        let mut synth = open_synth();
        let payload = [0x41, 0x10, 0x16, 0x12, 0x10, 0x00, 0x01, 0x01, 0x6E];
        b.iter(|| {
            synth.play_sysex_immediate(black_box(&payload)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_render_silence,
    bench_render_full_polyphony,
    bench_note_on_off_churn,
    bench_sysex_dispatch
);
criterion_main!(benches);
