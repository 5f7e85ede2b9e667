//! Time-Variant Pitch envelope (`spec.md` §4.5): base pitch from key,
//! tuning and key-follow; a 4-stage pitch envelope layered on top; and an
//! LFO with MCU-timer jitter modelling the firmware's imprecise timer
//! interrupt period.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

use crate::constants::NATIVE_SAMPLE_RATE;
use crate::ramp::LA32Ramp;
use crate::tables::Tables;

/// TVP's four pitch-envelope phases. Like TVF there is no terminal state;
/// pitch holds at P4's target until the partial is reclaimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TvpPhase {
    /// Initial approach to the envelope's first target.
    P1,
    /// Second stage.
    P2,
    /// Third stage.
    P3,
    /// Final/hold stage.
    P4,
}

/// Inputs to [`Tvp::reset`].
#[derive(Clone, Copy, Debug)]
pub struct TvpResetContext {
    /// Note key, 0..=127.
    pub key: u8,
    /// Coarse tune, semitones.
    pub coarse_tune: i8,
    /// Fine tune, in 256ths of a semitone.
    pub fine_tune: i8,
    /// Key-follow amount, index into [`Tables::keyfollow`].
    pub keyfollow: u8,
    /// Pitch LFO rate, 0..=100.
    pub lfo_rate: u8,
    /// Pitch LFO depth, 0..=100 (0 disables the LFO entirely).
    pub lfo_depth: u8,
    /// 4-stage envelope times.
    pub env_time: [u8; 4],
    /// 4-stage envelope target offsets, signed, centered at 0.
    pub env_level: [i8; 4],
}

/// Pitch units contributed per envelope-ramp code step. The ramp's 8-bit
/// target resolution is coarser than the 256-units-per-semitone pitch
/// domain used elsewhere, so envelope offsets are scaled up to match.
const PITCH_ENV_UNITS_PER_STEP: i32 = 8;

/// Scales LFO depth (0..=100) and its unit sine output into pitch units.
const LFO_DEPTH_SCALE: f32 = 6.0;

/// Time-Variant Pitch envelope.
#[derive(Clone, Debug)]
pub struct Tvp {
    phase: Option<TvpPhase>,
    ramp: LA32Ramp,
    env_time: [u8; 4],
    env_level: [i8; 4],
    base_pitch: i32,
    lfo_phase: f32,
    lfo_increment: f32,
    lfo_depth: u8,
    rng: SmallRng,
}

impl Default for Tvp {
    fn default() -> Self {
        Tvp {
            phase: None,
            ramp: LA32Ramp::new(),
            env_time: [0; 4],
            env_level: [0; 4],
            base_pitch: 0,
            lfo_phase: 0.0,
            lfo_increment: 0.0,
            lfo_depth: 0,
            rng: SmallRng::seed_from_u64(0),
        }
    }
}

fn lfo_rate_to_increment(rate: u8) -> f32 {
    // 0..=100 maps onto roughly 0..10Hz, a plausible range for the MT-32's
    // slow vibrato LFO.
    let freq_hz = rate as f32 / 100.0 * 10.0;
    freq_hz / NATIVE_SAMPLE_RATE as f32
}

impl Tvp {
    /// Creates a TVP at rest, with a fixed LFO-jitter seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a TVP whose LFO jitter is seeded explicitly, for
    /// deterministic tests and reproducible renders.
    pub fn with_seed(seed: u64) -> Self {
        Tvp {
            rng: SmallRng::seed_from_u64(seed),
            ..Self::default()
        }
    }

    /// Current phase, or `None` before the first `reset`.
    pub fn phase(&self) -> Option<TvpPhase> {
        self.phase
    }

    /// Starts the envelope on Note-On.
    pub fn reset(&mut self, tables: &Tables, ctx: &TvpResetContext) {
        self.env_time = ctx.env_time;
        self.env_level = ctx.env_level;
        self.lfo_depth = ctx.lfo_depth;
        self.lfo_increment = lfo_rate_to_increment(ctx.lfo_rate);
        self.lfo_phase = 0.0;

        let keyfollow_offset =
            tables.keyfollow[ctx.keyfollow.min(tables.keyfollow.len() as u8 - 1) as usize] as i32;
        let note_pitch = tables.note_to_pitch[ctx.key.min(127) as usize];
        self.base_pitch =
            note_pitch + ctx.coarse_tune as i32 * 256 + ctx.fine_tune as i32 + keyfollow_offset;

        self.phase = Some(TvpPhase::P1);
        self.start_phase_ramp(tables, TvpPhase::P1);
    }

    fn phase_time_and_level(&self, phase: TvpPhase) -> (u8, i8) {
        let i = match phase {
            TvpPhase::P1 => 0,
            TvpPhase::P2 => 1,
            TvpPhase::P3 => 2,
            TvpPhase::P4 => 3,
        };
        (self.env_time[i], self.env_level[i])
    }

    fn scaled_level(level: i8) -> u8 {
        (level as i32 + 128).clamp(0, 255) as u8
    }

    fn start_phase_ramp(&mut self, tables: &Tables, phase: TvpPhase) {
        let (time, level) = self.phase_time_and_level(phase);
        let target = Self::scaled_level(level);
        self.ramp.start_ramp(tables, target, time.max(1));
    }

    /// Advances the envelope ramp and LFO by one sample, returning the
    /// combined pitch value in 256-units-per-semitone domain, centered on
    /// the base pitch computed at `reset`.
    pub fn tick(&mut self, tables: &Tables) -> i32 {
        let ramp_value = self.ramp.next_value();
        if self.ramp.check_interrupt() {
            self.next_phase(tables);
        }
        let env_offset = (ramp_value >> 12) as i32 - 128;
        self.base_pitch + env_offset * PITCH_ENV_UNITS_PER_STEP + self.next_lfo_sample()
    }

    fn next_lfo_sample(&mut self) -> i32 {
        if self.lfo_depth == 0 {
            return 0;
        }
        self.lfo_phase += self.lfo_increment;
        if self.lfo_phase >= 1.0 {
            self.lfo_phase -= 1.0;
        }
        // The real firmware's LFO is paced by a free-running MCU timer
        // rather than a sample-accurate clock; a small random phase jitter
        // each sample reproduces its characteristic instability instead of
        // a perfectly regular sine.
        let jitter: f32 = self.rng.gen_range(-0.002..0.002);
        let sample = ((self.lfo_phase + jitter) * 2.0 * PI).sin();
        (sample * self.lfo_depth as f32 * LFO_DEPTH_SCALE) as i32
    }

    fn next_phase(&mut self, tables: &Tables) {
        let current = match self.phase {
            Some(p) => p,
            None => return,
        };
        let next = match current {
            TvpPhase::P1 => TvpPhase::P2,
            TvpPhase::P2 => TvpPhase::P3,
            TvpPhase::P3 | TvpPhase::P4 => TvpPhase::P4,
        };
        self.phase = Some(next);
        if next != current {
            self.start_phase_ramp(tables, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Tables {
        Tables::build()
    }

    fn ctx() -> TvpResetContext {
        TvpResetContext {
            key: 69,
            coarse_tune: 0,
            fine_tune: 0,
            keyfollow: 8,
            lfo_rate: 0,
            lfo_depth: 0,
            env_time: [5, 10, 15, 0],
            env_level: [20, -10, 5, 0],
        }
    }

    #[test]
    fn reset_starts_in_p1_and_centers_on_a440() {
        let t = tables();
        let mut tvp = Tvp::new();
        tvp.reset(&t, &ctx());
        assert_eq!(tvp.phase(), Some(TvpPhase::P1));
        assert_eq!(tvp.base_pitch, 0);
    }

    #[test]
    fn progresses_through_all_phases() {
        let t = tables();
        let mut tvp = Tvp::new();
        tvp.reset(&t, &ctx());

        let mut seen_p4 = false;
        for _ in 0..200_000 {
            tvp.tick(&t);
            if tvp.phase() == Some(TvpPhase::P4) {
                seen_p4 = true;
                break;
            }
        }
        assert!(seen_p4, "TVP never reached P4 within bound");
    }

    #[test]
    fn zero_lfo_depth_adds_no_modulation() {
        let t = tables();
        let mut tvp = Tvp::new();
        let mut c = ctx();
        c.lfo_depth = 0;
        c.lfo_rate = 50;
        tvp.reset(&t, &c);
        for _ in 0..100 {
            tvp.tick(&t);
        }
        assert_eq!(tvp.next_lfo_sample(), 0);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let t = tables();
        let mut a = Tvp::with_seed(42);
        let mut b = Tvp::with_seed(42);
        let mut c = ctx();
        c.lfo_depth = 50;
        c.lfo_rate = 30;
        a.reset(&t, &c);
        b.reset(&t, &c);
        for _ in 0..500 {
            assert_eq!(a.tick(&t), b.tick(&t));
        }
    }
}
