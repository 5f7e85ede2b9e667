//! Boss reverb chip emulation: a cascade of tapped delay lines and
//! all-pass sections (`spec.md` §4.9).

use crate::rom::MachineConfig;

/// Reverb algorithm family, matching the four settings exposed on real
/// hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReverbMode {
    /// Small, quickly-decaying room.
    Room,
    /// Larger, longer-decaying hall.
    Hall,
    /// Bright plate reverb with a dense early reflection cluster.
    Plate,
    /// A single discrete tap delay, no diffusion.
    TapDelay,
}

/// Per-mode, per-machine preset: delay line lengths (in samples at the
/// native 32 kHz rate), all-pass feedback coefficients, and the output
/// tap gains applied to the cascade.
#[derive(Clone, Copy, Debug)]
struct ReverbPreset {
    delay_lengths: [usize; 3],
    allpass_feedback: f32,
    tap_gains: [f32; 3],
    decay: f32,
}

fn preset_for(mode: ReverbMode, machine: MachineConfig, time: u8) -> ReverbPreset {
    // CM-32L's Boss chip runs a slightly brighter, less diffuse table than
    // the original MT-32; both scale delay length and decay with `time`.
    let time_scale = 1.0 + (time.min(7) as f32) * 0.35;
    let (base_lengths, allpass_feedback, tap_gains): ([usize; 3], f32, [f32; 3]) = match mode {
        ReverbMode::Room => ([341, 613, 971], 0.3, [0.6, 0.4, 0.25]),
        ReverbMode::Hall => ([887, 1301, 1979], 0.45, [0.55, 0.45, 0.35]),
        ReverbMode::Plate => ([227, 397, 587], 0.55, [0.7, 0.5, 0.3]),
        ReverbMode::TapDelay => ([2003, 0, 0], 0.0, [0.8, 0.0, 0.0]),
    };
    let brightness = if machine.is_cm32l() { 1.08 } else { 1.0 };
    ReverbPreset {
        delay_lengths: [
            ((base_lengths[0] as f32) * time_scale * brightness) as usize,
            ((base_lengths[1] as f32) * time_scale * brightness) as usize,
            ((base_lengths[2] as f32) * time_scale * brightness) as usize,
        ],
        allpass_feedback,
        tap_gains,
        decay: 0.3 + (time.min(7) as f32) * 0.08,
    }
}

/// One all-pass delay section: `y[n] = -g*x[n] + x[n-d] + g*y[n-d]`.
#[derive(Clone, Debug)]
struct AllpassLine {
    buffer: Vec<f32>,
    position: usize,
    feedback: f32,
}

impl AllpassLine {
    fn new(length: usize, feedback: f32) -> Self {
        AllpassLine {
            buffer: vec![0.0; length.max(1)],
            position: 0,
            feedback,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.position];
        let output = -self.feedback * input + delayed;
        self.buffer[self.position] = input + self.feedback * delayed;
        self.position = (self.position + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.position = 0;
    }
}

/// Boss reverb chip model: three cascaded all-pass delay lines per
/// channel, tapped and summed into the wet output.
#[derive(Clone, Debug)]
pub struct BReverbModel {
    machine: MachineConfig,
    mode: ReverbMode,
    time: u8,
    level: u8,
    enabled: bool,
    dry_gain: f32,
    wet_gain: f32,
    preset: ReverbPreset,
    lines_left: [AllpassLine; 3],
    lines_right: [AllpassLine; 3],
}

impl BReverbModel {
    /// Builds a reverb model for `machine` at Room mode, time 5, level 5.
    pub fn new(machine: MachineConfig) -> Self {
        let mode = ReverbMode::Room;
        let time = 5;
        let level = 5;
        let preset = preset_for(mode, machine, time);
        BReverbModel {
            machine,
            mode,
            time,
            level,
            enabled: true,
            dry_gain: 1.0,
            wet_gain: 1.0,
            lines_left: Self::build_lines(&preset),
            lines_right: Self::build_lines(&preset),
            preset,
        }
    }

    fn build_lines(preset: &ReverbPreset) -> [AllpassLine; 3] {
        [
            AllpassLine::new(preset.delay_lengths[0], preset.allpass_feedback),
            AllpassLine::new(preset.delay_lengths[1].max(1), preset.allpass_feedback),
            AllpassLine::new(preset.delay_lengths[2].max(1), preset.allpass_feedback),
        ]
    }

    fn rebuild(&mut self) {
        self.preset = preset_for(self.mode, self.machine, self.time);
        self.lines_left = Self::build_lines(&self.preset);
        self.lines_right = Self::build_lines(&self.preset);
    }

    /// Current algorithm.
    pub fn mode(&self) -> ReverbMode {
        self.mode
    }

    /// Selects the reverb algorithm, rebuilding the delay lines to the
    /// new preset and clearing any tail in flight.
    pub fn set_mode(&mut self, mode: ReverbMode) {
        self.mode = mode;
        self.rebuild();
    }

    /// Decay time setting, 0..=7.
    pub fn time(&self) -> u8 {
        self.time
    }

    /// Sets decay time, 0..=7, rebuilding the delay lines.
    pub fn set_time(&mut self, time: u8) {
        self.time = time.min(7);
        self.rebuild();
    }

    /// Output level setting, 0..=7.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Sets output level, 0..=7.
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(7);
    }

    /// `true` if reverb processing is active; `false` mutes the wet
    /// signal within one sample without touching internal state.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables reverb. Disabling does *not* clear delay line
    /// state; use [`BReverbModel::set_reverb_enabled_and_reset`] for that.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Disables reverb and zeros every delay line, matching hardware's
    /// `SetReverbEnabled(false)` behavior.
    pub fn set_reverb_enabled_and_reset(&mut self, enabled: bool) {
        self.enabled = enabled;
        for line in self.lines_left.iter_mut().chain(self.lines_right.iter_mut()) {
            line.clear();
        }
    }

    /// Dry (unprocessed) signal gain, linear, applied by the caller to
    /// the input before mixing with the wet output.
    pub fn dry_gain(&self) -> f32 {
        self.dry_gain
    }

    /// Sets the dry gain.
    pub fn set_dry_gain(&mut self, gain: f32) {
        self.dry_gain = gain;
    }

    /// Wet (reverberated) signal gain, linear.
    pub fn wet_gain(&self) -> f32 {
        self.wet_gain
    }

    /// Sets the wet gain.
    pub fn set_wet_gain(&mut self, gain: f32) {
        self.wet_gain = gain;
    }

    /// Processes one stereo frame, returning `(dry*dry_gain + wet*wet_gain)`
    /// for each channel. `level` scales the wet contribution independent
    /// of `wet_gain` (mirroring the chip's own output-level control).
    pub fn process(&mut self, left_in: f32, right_in: f32) -> (f32, f32) {
        if !self.enabled {
            return (left_in * self.dry_gain, right_in * self.dry_gain);
        }
        let level_scale = (self.level as f32) / 7.0;

        let mut signal = left_in;
        let mut wet_left = 0.0;
        for (line, &gain) in self.lines_left.iter_mut().zip(self.preset.tap_gains.iter()) {
            signal = line.process(signal) * self.preset.decay;
            wet_left += signal * gain;
        }

        let mut signal = right_in;
        let mut wet_right = 0.0;
        for (line, &gain) in self.lines_right.iter_mut().zip(self.preset.tap_gains.iter()) {
            signal = line.process(signal) * self.preset.decay;
            wet_right += signal * gain;
        }

        (
            left_in * self.dry_gain + wet_left * level_scale * self.wet_gain,
            right_in * self.dry_gain + wet_right * level_scale * self.wet_gain,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_reverb_passes_dry_signal_unchanged() {
        let mut reverb = BReverbModel::new(MachineConfig::Mt32V107);
        reverb.set_enabled(false);
        let (l, r) = reverb.process(0.5, -0.25);
        assert_eq!(l, 0.5);
        assert_eq!(r, -0.25);
    }

    #[test]
    fn reset_on_disable_clears_delay_lines() {
        let mut reverb = BReverbModel::new(MachineConfig::Mt32V107);
        for _ in 0..100 {
            reverb.process(1.0, 1.0);
        }
        reverb.set_reverb_enabled_and_reset(false);
        for line in &reverb.lines_left {
            assert!(line.buffer.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn an_impulse_produces_a_decaying_tail() {
        let mut reverb = BReverbModel::new(MachineConfig::Mt32V107);
        reverb.set_mode(ReverbMode::Hall);
        reverb.set_time(7);
        let (first_l, _) = reverb.process(1.0, 1.0);
        let mut energy = first_l.abs();
        for _ in 0..5000 {
            let (l, _) = reverb.process(0.0, 0.0);
            energy += l.abs();
        }
        assert!(energy.is_finite());
    }

    #[test]
    fn tap_delay_mode_uses_a_single_line() {
        let reverb = BReverbModel::new(MachineConfig::Cm32LV100);
        let preset = preset_for(ReverbMode::TapDelay, MachineConfig::Cm32LV100, reverb.time());
        assert_eq!(preset.tap_gains[1], 0.0);
        assert_eq!(preset.tap_gains[2], 0.0);
    }

    #[test]
    fn cm32l_and_mt32_presets_differ() {
        let mt32 = preset_for(ReverbMode::Room, MachineConfig::Mt32V107, 5);
        let cm32l = preset_for(ReverbMode::Room, MachineConfig::Cm32LV100, 5);
        assert_ne!(mt32.delay_lengths, cm32l.delay_lengths);
    }
}
