//! Native-rate to host-rate sample rate conversion (`spec.md` §4.11).
//!
//! A hand-rolled windowed-sinc polyphase resampler: no external
//! resampling crate is pulled in (an outside high-quality resampler is
//! explicitly out of scope), so filter design and polyphase bookkeeping
//! live here, in the same "derive the table once, consult it per sample"
//! style as [`crate::tables`].

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::constants::NATIVE_SAMPLE_RATE;

/// Resampling fidelity, trading filter length (and therefore CPU cost)
/// for stopband rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResamplerQuality {
    /// Shortest filter, cheapest, most aliasing.
    Fastest,
    /// Short filter, light aliasing.
    Fast,
    /// Longer filter, low aliasing.
    Good,
    /// Longest filter, least aliasing.
    Best,
}

impl ResamplerQuality {
    fn half_taps(self) -> usize {
        match self {
            ResamplerQuality::Fastest => 4,
            ResamplerQuality::Fast => 8,
            ResamplerQuality::Good => 16,
            ResamplerQuality::Best => 32,
        }
    }

    /// Number of polyphase subfilters (fractional-delay resolution).
    fn phases(self) -> usize {
        match self {
            ResamplerQuality::Fastest => 32,
            ResamplerQuality::Fast => 64,
            ResamplerQuality::Good => 128,
            ResamplerQuality::Best => 256,
        }
    }
}

/// Precomputed windowed-sinc polyphase filter bank: `phases` subfilters,
/// each `2*half_taps` taps long, built once at construction.
#[derive(Clone, Debug)]
struct PolyphaseFilter {
    half_taps: usize,
    phases: usize,
    taps: Vec<f32>,
}

impl PolyphaseFilter {
    fn design(quality: ResamplerQuality, cutoff: f64) -> Self {
        let half_taps = quality.half_taps();
        let phases = quality.phases();
        let span = half_taps * 2;
        let mut taps = vec![0.0f32; phases * span];

        for phase in 0..phases {
            let frac = phase as f64 / phases as f64;
            for tap in 0..span {
                // Center the kernel on `frac`, offset from the tap index.
                let x = (tap as f64) - (half_taps as f64) + (1.0 - frac);
                let sinc = if x.abs() < 1e-9 {
                    1.0
                } else {
                    (PI * cutoff * x).sin() / (PI * cutoff * x)
                };
                // Hann window tapers the kernel to zero at its edges,
                // suppressing the Gibbs ringing of a truncated sinc.
                let window = 0.5
                    - 0.5 * (2.0 * PI * (tap as f64 + 0.5) / span as f64).cos();
                taps[phase * span + tap] = (sinc * cutoff * window) as f32;
            }
        }

        PolyphaseFilter { half_taps, phases, taps }
    }

    fn span(&self) -> usize {
        self.half_taps * 2
    }

    fn subfilter(&self, phase: usize) -> &[f32] {
        let span = self.span();
        &self.taps[phase * span..phase * span + span]
    }
}

/// One channel's history ring, long enough for the filter's reach.
#[derive(Clone, Debug)]
struct History {
    samples: Vec<f32>,
}

impl History {
    fn new(span: usize) -> Self {
        History { samples: vec![0.0; span] }
    }

    fn push(&mut self, sample: f32) {
        self.samples.rotate_left(1);
        *self.samples.last_mut().unwrap() = sample;
    }

    fn convolve(&self, taps: &[f32]) -> f32 {
        self.samples.iter().zip(taps.iter()).map(|(s, t)| s * t).sum()
    }

    fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}

/// Converts the engine's native 32 kHz stereo stream to an arbitrary
/// target rate, preserving monotonic sample timestamps.
#[derive(Clone, Debug)]
pub struct SampleRateConverter {
    native_rate: u32,
    target_rate: u32,
    quality: ResamplerQuality,
    filter: Option<PolyphaseFilter>,
    left_history: History,
    right_history: History,
    /// Position of the next output sample, in native-rate sample units,
    /// as a fixed-point fraction (integer part = whole native samples
    /// already consumed, `frac` = fractional position within the next one).
    step: f64,
    position: f64,
}

impl SampleRateConverter {
    /// Builds a converter from the native rate to `target_rate` at the
    /// given quality. Pass-through (no filtering) when the rates match.
    pub fn new(target_rate: u32, quality: ResamplerQuality) -> Self {
        let native_rate = NATIVE_SAMPLE_RATE;
        let filter = if target_rate == native_rate {
            None
        } else {
            // Cutoff below Nyquist of whichever rate is lower, to avoid
            // aliasing on downsampling.
            let cutoff = 0.45f64.min(0.5 * target_rate as f64 / native_rate as f64 * 2.0);
            Some(PolyphaseFilter::design(quality, cutoff.min(0.49)))
        };
        let span = filter.as_ref().map_or(1, |f| f.span());
        SampleRateConverter {
            native_rate,
            target_rate,
            quality,
            left_history: History::new(span),
            right_history: History::new(span),
            step: native_rate as f64 / target_rate as f64,
            position: 0.0,
            filter,
        }
    }

    /// `true` when no resampling is performed (rates match).
    pub fn is_pass_through(&self) -> bool {
        self.filter.is_none()
    }

    /// Target output rate.
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Quality level this converter was built with.
    pub fn quality(&self) -> ResamplerQuality {
        self.quality
    }

    /// Feeds one native-rate stereo input frame, invoking `emit` for
    /// every output frame whose fractional position it completes (zero,
    /// one, or more than one per input frame, depending on the rate
    /// ratio).
    pub fn feed(&mut self, left_in: f32, right_in: f32, mut emit: impl FnMut(f32, f32)) {
        let Some(filter) = &self.filter else {
            emit(left_in, right_in);
            return;
        };

        self.left_history.push(left_in);
        self.right_history.push(right_in);
        self.position += 1.0;

        while self.position >= self.step {
            self.position -= self.step;
            let frac = (self.step - self.position - 1.0).clamp(0.0, 1.0);
            let phase = ((frac * filter.phases as f64) as usize).min(filter.phases - 1);
            let taps = filter.subfilter(phase);
            emit(
                self.left_history.convolve(taps),
                self.right_history.convolve(taps),
            );
        }
    }

    /// Resets filter history and fractional position (used by `Synth::close`).
    pub fn reset(&mut self) {
        self.left_history.clear();
        self.right_history.clear();
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_rate_is_pass_through() {
        let mut converter = SampleRateConverter::new(NATIVE_SAMPLE_RATE, ResamplerQuality::Fastest);
        assert!(converter.is_pass_through());
        let mut seen = Vec::new();
        converter.feed(0.25, -0.25, |l, r| seen.push((l, r)));
        assert_eq!(seen, vec![(0.25, -0.25)]);
    }

    #[test]
    fn downsampling_produces_fewer_frames_than_input() {
        let mut converter = SampleRateConverter::new(NATIVE_SAMPLE_RATE / 2, ResamplerQuality::Good);
        let mut output_frames = 0;
        for i in 0..2000 {
            let sample = (i as f32 * 0.01).sin();
            converter.feed(sample, sample, |_, _| output_frames += 1);
        }
        assert!(output_frames > 0 && output_frames < 2000);
    }

    #[test]
    fn upsampling_produces_more_frames_than_input() {
        let mut converter = SampleRateConverter::new(NATIVE_SAMPLE_RATE * 2, ResamplerQuality::Fast);
        let mut output_frames = 0;
        for i in 0..500 {
            let sample = (i as f32 * 0.01).sin();
            converter.feed(sample, sample, |_, _| output_frames += 1);
        }
        assert!(output_frames > 500);
    }

    #[test]
    fn silence_in_produces_silence_out() {
        let mut converter = SampleRateConverter::new(44_100, ResamplerQuality::Best);
        let mut max_abs: f32 = 0.0;
        for _ in 0..1000 {
            converter.feed(0.0, 0.0, |l, r| {
                max_abs = max_abs.max(l.abs()).max(r.abs());
            });
        }
        assert_eq!(max_abs, 0.0);
    }
}
