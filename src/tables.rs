//! Precomputed lookup tables shared by the ramp, wave generator and
//! envelope generators.
//!
//! The real LA32 chip and its surrounding firmware consult tables baked
//! into the Control ROM (envelope step sizes, log-domain sine/square
//! waveforms, key-follow curves, ...). Those exact byte values are
//! ROM-specific and are not guessed here (see `DESIGN.md`'s Open
//! Questions); instead this module derives tables with the documented
//! *shape* of the originals at crate-load time, once, into an immutable
//! [`Tables`] context that every component borrows a reference to. No
//! component mutates global state.

use std::f64::consts::PI;

/// Size of the logarithmic envelope-time table (7-bit index from a ramp
/// `increment` byte, per `LA32Ramp`).
pub const ENV_TIME_TABLE_SIZE: usize = 128;

/// Size of the log-domain sine/square phase tables (one full period).
pub const WAVE_TABLE_SIZE: usize = 256;

/// Number of discrete pan positions (0 = full left .. 14 = full right, per
/// the MT-32's 15-step pan parameter).
pub const PAN_TABLE_SIZE: usize = 15;

/// Number of discrete key-follow amounts.
pub const KEYFOLLOW_TABLE_SIZE: usize = 17;

/// Fixed count before a completed ramp's interrupt fires, once `current`
/// has snapped to `target`. Matches the firmware's documented constant.
pub const INTERRUPT_TIME: u8 = 1;

/// Last entries of the envelope-time table that the real firmware's log
/// conversion saturates; see the `NextPhase` FIXME in `spec.md` §9. The
/// saturated entries are clamped to `i8::MIN` (interpreted as -128) rather
/// than letting the log conversion overflow, reproducing the documented
/// firmware quirk without guessing the exact ROM crossover point beyond
/// what `DESIGN.md` records as the chosen, conservative cutover.
pub const ENV_TIME_SATURATED_ENTRIES: usize = 22;

/// Master immutable table context, built once and shared by reference.
#[derive(Debug)]
pub struct Tables {
    /// `step[i]` is the signed 24-bit (stored widened to i32) ramp step
    /// associated with increment index `i` (0..=127), logarithmic in `i`.
    pub env_time_steps: [i32; ENV_TIME_TABLE_SIZE],

    /// Log-domain sine table over one period, `WAVE_TABLE_SIZE` entries,
    /// 16-bit log-magnitude domain (larger = quieter, matching the LA32's
    /// inverted-log convention).
    pub log_sin: [u16; WAVE_TABLE_SIZE],

    /// Log-domain square table, same domain as `log_sin`.
    pub log_square: [u16; WAVE_TABLE_SIZE],

    /// Exponentiation table mapping a 16-bit log-domain magnitude back to
    /// a 13-bit linear magnitude (the inverse of `log_sin`/`log_square`'s
    /// domain), used by the wave generator's final stage.
    pub exp: [u16; 4096],

    /// Per-key-position bias attenuation curve (see TVA `Reset`, §4.3),
    /// indexed by `|key - biasPoint|` clamped to the table length.
    pub bias_amp: [u8; 128],

    /// Key-follow pitch offsets, coarse steps from -2 to +2 octaves across
    /// [`KEYFOLLOW_TABLE_SIZE`] discrete amounts.
    pub keyfollow: [i16; KEYFOLLOW_TABLE_SIZE],

    /// Pan gain pairs (left, right), 15 steps, equal-power law.
    pub pan_gains: [(f32, f32); PAN_TABLE_SIZE],

    /// MIDI note number (0..=127) to pitch delta in LA32 pitch units
    /// relative to A-440 at note 69.
    pub note_to_pitch: [i32; 128],
}

impl Tables {
    /// Builds the table context. Cheap enough to call once at `Synth::open`
    /// and hold for the engine's lifetime; never rebuilt per-sample.
    pub fn build() -> Self {
        Tables {
            env_time_steps: build_env_time_steps(),
            log_sin: build_log_sine(),
            log_square: build_log_square(),
            exp: build_exp_table(),
            bias_amp: build_bias_amp(),
            keyfollow: build_keyfollow(),
            pan_gains: build_pan_gains(),
            note_to_pitch: build_note_to_pitch(),
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::build()
    }
}

fn build_env_time_steps() -> [i32; ENV_TIME_TABLE_SIZE] {
    let mut table = [0i32; ENV_TIME_TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        if i >= ENV_TIME_TABLE_SIZE - ENV_TIME_SATURATED_ENTRIES {
            // Firmware quirk: the topmost entries saturate to the minimum
            // signed byte instead of continuing the exponential curve.
            *slot = i8::MIN as i32;
            continue;
        }
        // Logarithmic step size: small indices step almost nothing per
        // sample (long envelope phases), large indices step a lot
        // (short/instant phases).
        let normalized = i as f64 / (ENV_TIME_TABLE_SIZE - ENV_TIME_SATURATED_ENTRIES - 1) as f64;
        let step = (2.0f64.powf(normalized * 17.0)).round() as i32;
        *slot = step.max(1);
    }
    table
}

fn build_log_sine() -> [u16; WAVE_TABLE_SIZE] {
    let mut table = [0u16; WAVE_TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        let phase = i as f64 / WAVE_TABLE_SIZE as f64 * 2.0 * PI;
        let linear = phase.sin().abs().max(1.0e-6);
        // Log-domain: larger value = quieter. -20*log10(x) scaled to fit
        // a 16-bit magnitude, matching the LA32's inverted log convention.
        let log_mag = (-20.0 * linear.log10() * 128.0).round();
        *slot = log_mag.clamp(0.0, 65535.0) as u16;
    }
    table
}

fn build_log_square() -> [u16; WAVE_TABLE_SIZE] {
    let mut table = [0u16; WAVE_TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        // A square wave is 0dB (loudest, smallest log value) for the
        // first half period and silent-adjacent for the second.
        *slot = if i < WAVE_TABLE_SIZE / 2 { 0 } else { 4096 };
    }
    table
}

fn build_exp_table() -> [u16; 4096] {
    let mut table = [0u16; 4096];
    for (i, slot) in table.iter_mut().enumerate() {
        // Inverse of the log mapping above: magnitude 0 -> full scale,
        // larger magnitude -> exponentially quieter.
        let db = -(i as f64) / 128.0;
        let linear = 10f64.powf(db / 20.0);
        *slot = (linear * 8191.0).round().clamp(0.0, 8191.0) as u16;
    }
    table
}

fn build_bias_amp() -> [u8; 128] {
    let mut table = [0u8; 128];
    for (i, slot) in table.iter_mut().enumerate() {
        // Roughly 1dB of attenuation per semitone of distance from the
        // bias point, clamped at the table edges.
        *slot = (i as u32).min(127) as u8;
    }
    table
}

fn build_keyfollow() -> [i16; KEYFOLLOW_TABLE_SIZE] {
    let mut table = [0i16; KEYFOLLOW_TABLE_SIZE];
    let mid = (KEYFOLLOW_TABLE_SIZE / 2) as i32;
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i as i32 - mid) * 256) as i16;
    }
    table
}

fn build_pan_gains() -> [(f32, f32); PAN_TABLE_SIZE] {
    let mut table = [(0.0f32, 0.0f32); PAN_TABLE_SIZE];
    for (i, slot) in table.iter_mut().enumerate() {
        let t = i as f64 / (PAN_TABLE_SIZE - 1) as f64; // 0.0 (left) .. 1.0 (right)
        let angle = t * PI / 2.0;
        *slot = (angle.cos() as f32, angle.sin() as f32);
    }
    table
}

fn build_note_to_pitch() -> [i32; 128] {
    let mut table = [0i32; 128];
    for (note, slot) in table.iter_mut().enumerate() {
        // 256 pitch units per semitone, matching TVP's 16-bit-per-octave
        // convention (12 semitones * 256 ~= one octave's worth of units).
        *slot = (note as i32 - 69) * 256;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_time_steps_are_monotonic_until_saturation() {
        let t = Tables::build();
        let boundary = ENV_TIME_TABLE_SIZE - ENV_TIME_SATURATED_ENTRIES;
        for i in 1..boundary {
            assert!(
                t.env_time_steps[i] >= t.env_time_steps[i - 1],
                "step table not monotonic at {i}"
            );
        }
    }

    #[test]
    fn env_time_saturated_tail_is_min_i8() {
        let t = Tables::build();
        let boundary = ENV_TIME_TABLE_SIZE - ENV_TIME_SATURATED_ENTRIES;
        for &v in &t.env_time_steps[boundary..] {
            assert_eq!(v, i8::MIN as i32);
        }
    }

    #[test]
    fn log_sine_table_is_full_size() {
        let t = Tables::build();
        assert_eq!(t.log_sin.len(), WAVE_TABLE_SIZE);
    }

    #[test]
    fn pan_gains_are_equal_power_and_symmetric() {
        let t = Tables::build();
        let (left0, right0) = t.pan_gains[0];
        assert!(left0 > 0.99 && right0 < 0.01);
        let (left_last, right_last) = t.pan_gains[PAN_TABLE_SIZE - 1];
        assert!(right_last > 0.99 && left_last < 0.01);
        for &(l, r) in &t.pan_gains {
            let power = l * l + r * r;
            assert!((power - 1.0).abs() < 0.05, "pan power not ~1.0: {power}");
        }
    }

    #[test]
    fn note_to_pitch_is_zero_at_a440() {
        let t = Tables::build();
        assert_eq!(t.note_to_pitch[69], 0);
        assert_eq!(t.note_to_pitch[81], 256 * 12);
    }

    #[test]
    fn exp_table_is_monotonically_decreasing() {
        let t = Tables::build();
        for i in 1..t.exp.len() {
            assert!(t.exp[i] <= t.exp[i - 1]);
        }
    }
}
