//! IEEE-float variant of the LA32 wave generator.
//!
//! Implements the same synth/PCM mapping as [`super::LA32WaveGenerator`]
//! in floating point instead of fixed-point log tables, for renderers that
//! prefer float DSP over the bit-exact integer path. Selected once at
//! `Synth::open` via [`crate::la32::RendererType`]; the two variants are
//! not intended to be swapped mid-render.

use crate::la32::{PartialTimbreParams, WaveGeneratorInput};
use crate::rom::PcmRom;
use crate::tables::Tables;
use std::f32::consts::PI;

/// Float-domain LA32 oscillator for one partial.
#[derive(Clone, Debug, Default)]
pub struct LA32FloatWaveGenerator {
    params: PartialTimbreParams,
    phase: f32,
    pcm_phase: f32,
    resonance_phase: f32,
    resonance_decay: f32,
}

impl LA32FloatWaveGenerator {
    /// Creates a generator bound to the given timbre parameters.
    pub fn new(params: PartialTimbreParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Updates the bound timbre parameters without resetting phase.
    pub fn set_params(&mut self, params: PartialTimbreParams) {
        self.params = params;
    }

    /// Produces the next sample as a normalized float in `[-1.0, 1.0]`.
    pub fn next_sample(&mut self, _tables: &Tables, pcm: &PcmRom, input: WaveGeneratorInput) -> f32 {
        if self.params.pcm_mode {
            self.next_pcm_sample(pcm, input)
        } else {
            self.next_synth_sample(input)
        }
    }

    fn freq_hz(pitch: u16) -> f32 {
        110.0 * 2.0f32.powf(pitch as f32 / (256.0 * 12.0))
    }

    fn next_synth_sample(&mut self, input: WaveGeneratorInput) -> f32 {
        const SAMPLE_RATE: f32 = 32_000.0;
        let freq = Self::freq_hz(input.pitch);
        self.phase += freq / SAMPLE_RATE;
        self.phase -= self.phase.floor();

        let sine = (self.phase * 2.0 * PI).sin();
        let square = if self.phase < 0.5 { 1.0 } else { -1.0 };

        let pw = self.params.pulse_width.min(100) as f32 / 100.0;
        let blended = sine * (1.0 - pw) + square * pw;

        let cutoff_gain = 1.0 - (input.cutoff as f32 / 65535.0);
        let amp_gain = 1.0 - (input.amp as f32 / 65535.0);

        let mut out = blended * cutoff_gain * amp_gain;

        if self.phase < freq / SAMPLE_RATE {
            self.resonance_phase = 0.0;
            self.resonance_decay = 1.0;
        }
        if self.params.resonance > 0 {
            let res_gain = self.params.resonance.min(30) as f32 / 30.0;
            self.resonance_phase += freq / SAMPLE_RATE;
            self.resonance_decay *= 0.999;
            out += (self.resonance_phase * 2.0 * PI).sin() * res_gain * self.resonance_decay * 0.5;
        }

        out.clamp(-1.0, 1.0)
    }

    fn next_pcm_sample(&mut self, pcm: &PcmRom, input: WaveGeneratorInput) -> f32 {
        const SAMPLE_RATE: f32 = 32_000.0;
        let freq = Self::freq_hz(input.pitch);
        self.pcm_phase += freq / SAMPLE_RATE;

        let wave = pcm.wave(self.params.pcm_wave_index);
        let len = wave.samples.len().max(1) as f32;

        if self.pcm_phase >= len {
            if self.params.pcm_looped {
                let loop_start = (wave.loop_start as f32).min(len - 1.0);
                let span = (len - loop_start).max(1.0);
                self.pcm_phase = loop_start + (self.pcm_phase - loop_start) % span;
            } else {
                self.pcm_phase = len - 1.0;
            }
        }

        let index = self.pcm_phase as usize % wave.samples.len().max(1);
        let raw = wave.samples.get(index).copied().unwrap_or(0) as f32 / 32768.0;

        let cutoff_gain = 1.0 - (input.cutoff as f32 / 65535.0);
        let amp_gain = 1.0 - (input.amp as f32 / 65535.0);
        (raw * cutoff_gain * amp_gain).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::{PcmRom, PcmWave};

    #[test]
    fn synth_mode_stays_in_unit_range() {
        let t = Tables::build();
        let pcm = PcmRom::empty();
        let mut gen = LA32FloatWaveGenerator::new(PartialTimbreParams {
            pulse_width: 40,
            resonance: 5,
            ..Default::default()
        });
        for _ in 0..4000 {
            let s = gen.next_sample(
                &t,
                &pcm,
                WaveGeneratorInput {
                    amp: 0,
                    cutoff: 0,
                    pitch: 256,
                },
            );
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn pcm_mode_reads_from_rom_wave() {
        let t = Tables::build();
        let pcm = PcmRom::from_waves(vec![PcmWave {
            samples: vec![1000; 64],
            loop_start: 0,
        }]);
        let mut gen = LA32FloatWaveGenerator::new(PartialTimbreParams {
            pcm_mode: true,
            pcm_looped: true,
            ..Default::default()
        });
        for _ in 0..200 {
            gen.next_sample(
                &t,
                &pcm,
                WaveGeneratorInput {
                    amp: 0,
                    cutoff: 0,
                    pitch: 0,
                },
            );
        }
    }
}
