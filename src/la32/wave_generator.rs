//! Fixed-point (bit-accurate) LA32 wave generator.

use crate::la32::PartialTimbreParams;
use crate::rom::PcmRom;
use crate::tables::{Tables, WAVE_TABLE_SIZE};

/// Per-step inputs driving the wave generator, gathered by the owning
/// `Partial` from its ramps and `TVP` before each sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaveGeneratorInput {
    /// Current TVA ramp value (log-domain amplitude, larger = quieter).
    pub amp: u32,
    /// Current TVF ramp value (log-domain cutoff, larger = more closed).
    pub cutoff: u32,
    /// Current pitch, 16-bit LA32 pitch units.
    pub pitch: u16,
}

/// Integer (fixed-point) LA32 oscillator for one partial.
#[derive(Clone, Debug, Default)]
pub struct LA32WaveGenerator {
    params: PartialTimbreParams,
    phase_accum: u32,
    pcm_phase: u32,
    resonance_phase: u32,
    resonance_decay: u16,
}

impl LA32WaveGenerator {
    /// Creates a generator bound to the given timbre parameters. Re-call
    /// with updated parameters whenever the owning partial's timbre
    /// memory region is rewritten (dirty-hook broadcast, per `spec.md` §3).
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

    /// Produces the next signed 16-bit sample.
    pub fn next_sample(&mut self, tables: &Tables, pcm: &PcmRom, input: WaveGeneratorInput) -> i16 {
        if self.params.pcm_mode {
            self.next_pcm_sample(tables, pcm, input)
        } else {
            self.next_synth_sample(tables, input)
        }
    }

    fn phase_step(pitch: u16) -> u32 {
        // Pitch is 16-bit LA32 units; map to a phase increment over
        // WAVE_TABLE_SIZE such that pitch unit 0 corresponds to the
        // engine's reference frequency.
        let freq_scale = 2.0f64.powf(pitch as f64 / (256.0 * 12.0));
        let base_step = (WAVE_TABLE_SIZE as f64) * 110.0 / 32_000.0 * 65536.0;
        (base_step * freq_scale) as u32
    }

    fn next_synth_sample(&mut self, tables: &Tables, input: WaveGeneratorInput) -> i16 {
        let step = Self::phase_step(input.pitch);
        self.phase_accum = self.phase_accum.wrapping_add(step);
        let table_index = ((self.phase_accum >> 16) as usize) % WAVE_TABLE_SIZE;

        let sine_log = tables.log_sin[table_index] as u32;
        let square_log = tables.log_square[table_index] as u32;

        // Blend square/saw by pulse width: 0 = pure sine-derived saw-ish
        // wave, 100 = pure square, matching the documented LA32 blend.
        let pw = self.params.pulse_width.min(100) as u32;
        let blended_log = (sine_log * (100 - pw) + square_log * pw) / 100;

        let mut total_log = blended_log + input.cutoff / 16 + input.amp;

        // Resonance: a decaying sine at cutoff frequency, retriggered
        // every wave period (phase wraparound).
        if (self.phase_accum >> 16) < step >> 16 {
            self.resonance_phase = 0;
            self.resonance_decay = 4096;
        }
        if self.params.resonance > 0 {
            let res_index = (self.resonance_phase as usize / 256) % WAVE_TABLE_SIZE;
            let res_log = tables.log_sin[res_index] as u32;
            let res_gain = (30 - self.params.resonance.min(30) as u32) * 64
                + self.resonance_decay as u32 / 8;
            total_log = total_log.saturating_sub(res_gain.saturating_sub(res_log) / 8);
            self.resonance_phase = self.resonance_phase.wrapping_add(step >> 8);
            self.resonance_decay = self.resonance_decay.saturating_sub(8);
        }

        let exp_index = (total_log as usize).min(tables.exp.len() - 1);
        let magnitude = tables.exp[exp_index] as i32;

        // Sign from which half of the table we're in (square-ish
        // quadrant convention matching the log tables above).
        let sign = if table_index < WAVE_TABLE_SIZE / 2 { 1 } else { -1 };
        (magnitude * sign).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    fn next_pcm_sample(&mut self, tables: &Tables, pcm: &PcmRom, input: WaveGeneratorInput) -> i16 {
        let step = Self::phase_step(input.pitch).max(1 << 8);
        self.pcm_phase = self.pcm_phase.wrapping_add(step >> 8);

        let wave = pcm.wave(self.params.pcm_wave_index);
        let len = wave.len().max(1) as u32;
        let mut index = (self.pcm_phase >> 8) % len;

        if self.pcm_phase >> 8 >= len {
            if self.params.pcm_looped {
                let loop_start = wave.loop_start.min(len - 1) as u32;
                let span = len - loop_start;
                self.pcm_phase = (loop_start + (self.pcm_phase >> 8) % span.max(1)) << 8;
                index = self.pcm_phase >> 8;
            } else {
                index = len - 1;
            }
        }

        // Nearest-neighbour playback, matching the hardware; no
        // interpolation filter is modelled beyond this.
        let raw = wave.samples.get(index as usize).copied().unwrap_or(0);

        let exp_index = ((input.amp + input.cutoff / 32) as usize).min(tables.exp.len() - 1);
        let gain = tables.exp[exp_index] as i32;
        ((raw as i32 * gain) >> 13).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::{PcmRom, PcmWave};

    fn tables() -> Tables {
        Tables::build()
    }

    #[test]
    fn synth_mode_clips_to_i16_range() {
        let t = tables();
        let pcm = PcmRom::empty();
        let mut gen = LA32WaveGenerator::new(PartialTimbreParams {
            pulse_width: 50,
            resonance: 10,
            ..Default::default()
        });
        for _ in 0..4000 {
            let sample = gen.next_sample(
                &t,
                &pcm,
                WaveGeneratorInput {
                    amp: 0,
                    cutoff: 0,
                    pitch: 0,
                },
            );
            assert!(sample >= i16::MIN && sample <= i16::MAX);
        }
    }

    #[test]
    fn full_amplitude_attenuation_is_quiet() {
        let t = tables();
        let pcm = PcmRom::empty();
        let mut gen = LA32WaveGenerator::new(PartialTimbreParams::default());
        let mut peak = 0i32;
        for _ in 0..4000 {
            let sample = gen.next_sample(
                &t,
                &pcm,
                WaveGeneratorInput {
                    amp: 65535,
                    cutoff: 0,
                    pitch: 0,
                },
            );
            peak = peak.max(sample.unsigned_abs() as i32);
        }
        assert!(peak < 1000, "fully attenuated partial should be near silent, got {peak}");
    }

    #[test]
    fn pcm_mode_reads_from_rom_wave() {
        let t = tables();
        let pcm = PcmRom::from_waves(vec![PcmWave {
            samples: vec![1000; 64],
            loop_start: 0,
        }]);
        let mut gen = LA32WaveGenerator::new(PartialTimbreParams {
            pcm_mode: true,
            pcm_wave_index: 0,
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
