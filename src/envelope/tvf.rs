//! Time-Variant Filter cutoff envelope (`spec.md` §4.4).
//!
//! Four phases, with key-follow and bias but none of TVA's velocity/ROM
//! quirks. Resonance itself is a static timbre parameter the wave
//! generator reads directly; `Tvf` only drives the cutoff ramp.

use crate::ramp::LA32Ramp;
use crate::tables::Tables;

/// TVF's four phases. Unlike TVA there is no `Dead` terminal: cutoff
/// simply holds at the last phase's target until the partial as a whole
/// is reclaimed (driven by TVA reaching `Dead`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TvfPhase {
    /// Initial approach to the timbre's base cutoff.
    Attack,
    /// Second stage.
    P2,
    /// Third stage.
    P3,
    /// Final/hold stage.
    P4,
}

/// Inputs to [`Tvf::reset`].
#[derive(Clone, Copy, Debug)]
pub struct TvfResetContext {
    /// Note key, 0..=127.
    pub key: u8,
    /// Timbre partial's base cutoff, 0..=100.
    pub base_cutoff: u8,
    /// Key-follow amount, index into [`Tables::keyfollow`].
    pub keyfollow: u8,
    /// Bias point, same convention as TVA's.
    pub bias_point: u8,
    /// Bias attenuation amount.
    pub bias_level: u8,
    /// 4-stage envelope times.
    pub env_time: [u8; 4],
    /// 4-stage envelope target cutoffs, 0..=100.
    pub env_level: [u8; 4],
}

/// Time-Variant Filter cutoff envelope.
#[derive(Clone, Debug, Default)]
pub struct Tvf {
    phase: Option<TvfPhase>,
    ramp: LA32Ramp,
    env_time: [u8; 4],
    env_level: [u8; 4],
    base_cutoff: u8,
}

impl Tvf {
    /// Creates a TVF at rest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase, or `None` before the first `reset`.
    pub fn phase(&self) -> Option<TvfPhase> {
        self.phase
    }

    /// Current cutoff ramp value, fed into the wave generator.
    pub fn current_cutoff(&self) -> u32 {
        self.ramp.current()
    }

    /// Starts the envelope on Note-On.
    pub fn reset(&mut self, tables: &Tables, ctx: &TvfResetContext) {
        self.env_time = ctx.env_time;
        self.env_level = ctx.env_level;

        let keyfollow_offset = tables.keyfollow[ctx.keyfollow.min(tables.keyfollow.len() as u8 - 1) as usize];
        let bias = if ctx.bias_point < 0x40 {
            (ctx.key as i32 - ctx.bias_point as i32).max(0)
        } else {
            (ctx.bias_point as i32 - ctx.key as i32).max(0)
        };
        let bias_sub = (bias * ctx.bias_level as i32 / 128).min(127);

        let cutoff = (ctx.base_cutoff as i32 + keyfollow_offset as i32 / 256 - bias_sub).clamp(0, 100);
        self.base_cutoff = cutoff as u8;

        self.phase = Some(TvfPhase::Attack);
        self.start_phase_ramp(tables, TvfPhase::Attack);
    }

    fn phase_time_and_level(&self, phase: TvfPhase) -> (u8, u8) {
        let i = match phase {
            TvfPhase::Attack => 0,
            TvfPhase::P2 => 1,
            TvfPhase::P3 => 2,
            TvfPhase::P4 => 3,
        };
        (self.env_time[i], self.env_level[i])
    }

    fn start_phase_ramp(&mut self, tables: &Tables, phase: TvfPhase) {
        let (time, level) = self.phase_time_and_level(phase);
        let scaled = (level as u32 * self.base_cutoff as u32 / 100).min(100) as u8;
        let target = 255u16 - (scaled as u16 * 255 / 100);
        let time = time.max(if time == 0 { 0 } else { 1 });
        self.ramp.start_ramp(tables, target as u8, time);
    }

    /// Advances the cutoff ramp one sample, moving to the next phase if
    /// the ramp's interrupt has latched.
    pub fn tick(&mut self, tables: &Tables) -> u32 {
        let value = self.ramp.next_value();
        if self.ramp.check_interrupt() {
            self.next_phase(tables);
        }
        value
    }

    fn next_phase(&mut self, tables: &Tables) {
        let current = match self.phase {
            Some(p) => p,
            None => return,
        };
        let next = match current {
            TvfPhase::Attack => TvfPhase::P2,
            TvfPhase::P2 => TvfPhase::P3,
            TvfPhase::P3 | TvfPhase::P4 => TvfPhase::P4,
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

    fn ctx() -> TvfResetContext {
        TvfResetContext {
            key: 60,
            base_cutoff: 80,
            keyfollow: 8,
            bias_point: 0x40,
            bias_level: 0,
            env_time: [5, 10, 15, 0],
            env_level: [80, 60, 40, 20],
        }
    }

    #[test]
    fn reset_starts_in_attack() {
        let t = tables();
        let mut tvf = Tvf::new();
        tvf.reset(&t, &ctx());
        assert_eq!(tvf.phase(), Some(TvfPhase::Attack));
    }

    #[test]
    fn progresses_through_all_phases() {
        let t = tables();
        let mut tvf = Tvf::new();
        tvf.reset(&t, &ctx());

        let mut seen_p4 = false;
        for _ in 0..200_000 {
            tvf.tick(&t);
            if tvf.phase() == Some(TvfPhase::P4) {
                seen_p4 = true;
                break;
            }
        }
        assert!(seen_p4, "TVF never reached P4 within bound");
    }
}
