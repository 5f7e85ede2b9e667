//! Time-Variant Amplifier envelope (`spec.md` §4.3).

use crate::ramp::LA32Ramp;
use crate::tables::Tables;

/// TVA's seven audible phases plus the terminal `Dead` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TvaPhase {
    /// Pre-attack ramp to the base amplitude (skipped if `env_time[0] == 0`).
    Basic,
    /// Attack phase; its time is velocity-adjusted.
    Attack,
    /// Decay/hold phase 2.
    P2,
    /// Decay/hold phase 3.
    P3,
    /// Decay/hold phase 4.
    P4,
    /// Sustain: holds until note-off, tracked by `recalc_sustain`.
    Sustain,
    /// Release, ramping to silence.
    Release,
    /// Terminal: the partial is free to be reclaimed.
    Dead,
}

/// Everything `Tva::reset` needs to compute the base amplitude and arm
/// the first ramp, gathered from `Part`/`Poly`/timbre memory by the
/// owning `Partial`.
#[derive(Clone, Copy, Debug)]
pub struct TvaResetContext {
    /// Note key, 0..=127.
    pub key: u8,
    /// Note-on velocity, 1..=127.
    pub velocity: u8,
    /// Part master volume, 0..=100.
    pub part_volume: u8,
    /// Part expression (CC11), 0..=127 folded to 0..=100 by the caller.
    pub expression: u8,
    /// System master volume, 0..=100.
    pub master_volume: u8,
    /// Rhythm key level, only present for the rhythm part.
    pub rhythm_level: Option<u8>,
    /// Timbre partial's static TVA level, 0..=100.
    pub tva_level: u8,
    /// Bias point; < 0x40 penalizes keys above the pivot, >= 0x40
    /// penalizes keys below it.
    pub bias_point: u8,
    /// Bias attenuation amount.
    pub bias_level: u8,
    /// TVF resonance (half of this is subtracted from base amplitude).
    pub tvf_resonance: u8,
    /// 5-stage envelope times (firmware units, also ramp increment index).
    pub env_time: [u8; 5],
    /// 5-stage envelope target levels, 0..=100.
    pub env_level: [u8; 5],
    /// Velocity sensitivity shift for the ATTACK phase's time.
    pub env_time_velo_sensitivity: u8,
    /// Key-follow shift for phases after ATTACK.
    pub env_time_keyfollow: u8,
    /// Quality switch: flips ramp direction explicitly during
    /// `recalc_sustain` when Nice-Amp-Ramp mode disagrees with the
    /// in-flight ramp direction.
    pub nice_amp_ramp: bool,
}

/// Time-Variant Amplifier state machine.
#[derive(Clone, Debug)]
pub struct Tva {
    phase: TvaPhase,
    ramp: LA32Ramp,
    key: u8,
    velocity: u8,
    env_time: [u8; 5],
    env_level: [u8; 5],
    time_velo_sensitivity: u8,
    time_keyfollow: u8,
    base_amp: u8,
    can_sustain: bool,
    nice_amp_ramp: bool,
}

impl Default for Tva {
    fn default() -> Self {
        Tva {
            phase: TvaPhase::Dead,
            ramp: LA32Ramp::new(),
            key: 60,
            velocity: 0,
            env_time: [0; 5],
            env_level: [0; 5],
            time_velo_sensitivity: 0,
            time_keyfollow: 0,
            base_amp: 0,
            can_sustain: true,
            nice_amp_ramp: false,
        }
    }
}

pub(crate) fn bias_subtraction(tables: &Tables, bias_point: u8, bias_level: u8, key: u8) -> u8 {
    let distance = if bias_point < 0x40 {
        // Penalize keys above the pivot.
        (key as i32 - bias_point as i32).max(0)
    } else {
        // Penalize keys below the pivot.
        (bias_point as i32 - key as i32).max(0)
    };
    let curve = tables.bias_amp[(distance as usize).min(127)] as u32;
    ((curve * bias_level as u32) / 128).min(127) as u8
}

pub(crate) fn velocity_subtraction(velocity: u8) -> u8 {
    // Louder strikes subtract less; quiet strikes subtract more.
    (127u8.saturating_sub(velocity)) / 2
}

impl Tva {
    /// Creates a TVA in the `Dead` state (no partial bound yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> TvaPhase {
        self.phase
    }

    /// Current ramp amplitude, in the same log domain `LA32Ramp` reports
    /// (larger = quieter); fed directly into the wave generator.
    pub fn current_amp(&self) -> u32 {
        self.ramp.current()
    }

    /// `true` once the envelope has fully decayed and the owning
    /// `Partial` can be reclaimed.
    pub fn is_dead(&self) -> bool {
        self.phase == TvaPhase::Dead
    }

    /// Starts the envelope on Note-On (`spec.md` §4.3 `Reset`).
    pub fn reset(&mut self, tables: &Tables, ctx: &TvaResetContext) {
        self.key = ctx.key;
        self.velocity = ctx.velocity;
        self.env_time = ctx.env_time;
        self.env_level = ctx.env_level;
        self.time_velo_sensitivity = ctx.env_time_velo_sensitivity;
        self.time_keyfollow = ctx.env_time_keyfollow;
        self.nice_amp_ramp = ctx.nice_amp_ramp;
        self.can_sustain = true;

        let mut amp = ctx.tva_level as i32;
        amp -= (100 - ctx.master_volume as i32).max(0);
        amp -= (100 - ctx.part_volume as i32).max(0);
        amp -= (100 - ctx.expression as i32).max(0);
        if let Some(rhythm_level) = ctx.rhythm_level {
            amp -= (100 - rhythm_level as i32).max(0);
        }
        amp -= bias_subtraction(tables, ctx.bias_point, ctx.bias_level, ctx.key) as i32;
        amp -= velocity_subtraction(ctx.velocity) as i32;
        amp -= ctx.tvf_resonance as i32 / 2;
        self.base_amp = amp.clamp(0, 100) as u8;

        if self.env_time[0] == 0 {
            // Firmware quirk: zero envTime[0] skips BASIC, starting
            // straight from level[0]'s target.
            self.phase = TvaPhase::Attack;
            self.start_phase_ramp(tables, TvaPhase::Attack);
        } else {
            self.phase = TvaPhase::Basic;
            self.ramp
                .start_ramp(tables, self.scaled_level(self.base_amp), self.env_time[0]);
        }
    }

    fn scaled_level(&self, pct: u8) -> u8 {
        // Ramp targets are 0..=0xFF log-domain codes; map the 0..=100
        // percentage amplitude onto that range, inverted (louder = lower
        // code, matching the LA32's "larger magnitude = quieter"
        // convention already used by the ramp/wave generator).
        (255u16 - (pct as u16 * 255 / 100)) as u8
    }

    fn phase_time_and_level(&self, phase: TvaPhase) -> (u8, u8) {
        match phase {
            TvaPhase::Attack => (self.env_time[0], self.env_level[0]),
            TvaPhase::P2 => (self.env_time[1], self.env_level[1]),
            TvaPhase::P3 => (self.env_time[2], self.env_level[2]),
            TvaPhase::P4 => (self.env_time[3], self.env_level[3]),
            TvaPhase::Sustain => (self.env_time[4], self.env_level[4]),
            _ => (0, 0),
        }
    }

    fn adjusted_time(&self, phase: TvaPhase, raw_time: u8) -> u8 {
        if raw_time == 0 {
            return 0;
        }
        let adjusted = if phase == TvaPhase::Attack {
            let shift = 6u32.saturating_sub(self.time_velo_sensitivity as u32);
            raw_time as i32 - ((self.velocity as i32 - 64) >> shift)
        } else {
            let shift = 5u32.saturating_sub(self.time_keyfollow as u32);
            raw_time as i32 - ((self.key as i32 - 60) >> shift)
        };
        adjusted.clamp(1, 127) as u8
    }

    fn start_phase_ramp(&mut self, tables: &Tables, phase: TvaPhase) {
        let (raw_time, level) = self.phase_time_and_level(phase);
        let level = (level as u32 * self.base_amp as u32 / 100).min(100) as u8;
        let time = self.adjusted_time(phase, raw_time);
        let mut target = self.scaled_level(level);

        // Zero target-delta quirk: if the new target equals the ramp's
        // current code, nudge it by one so an interrupt still fires.
        if (target as u32) << 12 == self.ramp.current() {
            target = target.saturating_add(1);
        }
        self.ramp.start_ramp(tables, target, time);
    }

    /// Advances the envelope to its next phase; called by the owning
    /// `Partial` exactly when `self.ramp`'s interrupt has latched.
    pub fn next_phase(&mut self, tables: &Tables) {
        let next = match self.phase {
            TvaPhase::Basic => TvaPhase::Attack,
            TvaPhase::Attack => TvaPhase::P2,
            TvaPhase::P2 => TvaPhase::P3,
            TvaPhase::P3 => TvaPhase::P4,
            TvaPhase::P4 => TvaPhase::Sustain,
            TvaPhase::Sustain => {
                if self.can_sustain {
                    TvaPhase::Sustain
                } else {
                    TvaPhase::Release
                }
            }
            TvaPhase::Release | TvaPhase::Dead => TvaPhase::Dead,
        };

        if next == TvaPhase::Dead {
            self.phase = TvaPhase::Dead;
            return;
        }

        if next == TvaPhase::Release && self.phase != TvaPhase::Release {
            // Forced release: the sustain phase ended because the note
            // was already released. Increment of 0 would never interrupt,
            // so a zero envTime[4] is forced to 1.
            let time = (self.env_time[4].max(1)) | 0x80;
            self.phase = TvaPhase::Release;
            self.ramp.start_ramp(tables, 0, time);
            return;
        }

        if self.phase_target_level_is_zero(next) {
            self.phase = next;
            self.ramp.start_ramp(tables, 0xFF, 0x7F | 0x80);
            return;
        }

        self.phase = next;
        self.start_phase_ramp(tables, next);
    }

    fn phase_target_level_is_zero(&self, phase: TvaPhase) -> bool {
        let (_, level) = self.phase_time_and_level(phase);
        level == 0 && !matches!(phase, TvaPhase::Sustain)
    }

    /// Marks that this partial's owning `Poly` has been released (pedal
    /// up or Note-Off with no hold); the next `Sustain` interrupt will
    /// transition to `Release` instead of continuing to hold.
    pub fn notify_released(&mut self) {
        self.can_sustain = false;
    }

    /// Periodic sustain-tracking recompute (`spec.md` §4.3
    /// `RecalcSustain`), called whenever part volume/expression changes
    /// while this TVA is in `Sustain`, so the level moves without an
    /// audible jump.
    pub(crate) fn recalc_sustain(&mut self, tables: &Tables, new_base_amp: u8) {
        if self.phase != TvaPhase::Sustain {
            self.base_amp = new_base_amp;
            return;
        }
        self.base_amp = new_base_amp;
        let (_, level) = self.phase_time_and_level(TvaPhase::Sustain);
        let level = (level as u32 * self.base_amp as u32 / 100).min(100) as u8;
        let target = self.scaled_level(level);
        let target_code = (target as u32) << 12;

        let delta = target_code.abs_diff(self.ramp.current());
        let index = ((delta >> 12).min(127)) as u8;

        let mut descending = target_code < self.ramp.current();
        if self.nice_amp_ramp {
            let ramp_is_descending = self.ramp.is_below_current(target);
            if ramp_is_descending != descending {
                descending = !descending;
            }
        }

        let increment = if descending { index | 0x80 } else { index };
        self.ramp.start_ramp(tables, target, increment.max(1));
    }

    /// Fast-decays this TVA to silence and forces `Release`, used when
    /// the owning partial is stolen (`spec.md` §4.6 `StartAbort`).
    pub fn start_abort(&mut self, tables: &Tables) {
        self.phase = TvaPhase::Release;
        self.ramp.start_ramp(tables, 0xFF, 0x7F | 0x80);
    }

    /// Advances the amplitude ramp by one sample and, if it interrupts,
    /// moves to the next phase. Returns the current amplitude code.
    pub fn tick(&mut self, tables: &Tables) -> u32 {
        let value = self.ramp.next_value();
        if self.ramp.check_interrupt() {
            self.next_phase(tables);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Tables {
        Tables::build()
    }

    fn ctx() -> TvaResetContext {
        TvaResetContext {
            key: 60,
            velocity: 100,
            part_volume: 100,
            expression: 100,
            master_volume: 100,
            rhythm_level: None,
            tva_level: 100,
            bias_point: 0x40,
            bias_level: 0,
            tvf_resonance: 0,
            env_time: [0, 10, 20, 30, 40],
            env_level: [100, 80, 60, 40, 20],
            env_time_velo_sensitivity: 0,
            env_time_keyfollow: 0,
            nice_amp_ramp: false,
        }
    }

    #[test]
    fn reset_skips_basic_when_env_time_zero() {
        let t = tables();
        let mut tva = Tva::new();
        tva.reset(&t, &ctx());
        assert_eq!(tva.phase(), TvaPhase::Attack);
    }

    #[test]
    fn reaches_dead_within_bounded_ticks() {
        let t = tables();
        let mut tva = Tva::new();
        let mut c = ctx();
        c.env_time = [5, 5, 5, 5, 5];
        tva.reset(&t, &c);
        tva.notify_released();

        let mut ticks = 0;
        while !tva.is_dead() && ticks < 2_000_000 {
            tva.tick(&t);
            ticks += 1;
        }
        assert!(tva.is_dead(), "TVA never reached Dead within bound");
    }

    #[test]
    fn subtractions_are_clamped_at_zero() {
        let t = tables();
        let mut tva = Tva::new();
        let mut c = ctx();
        c.tva_level = 0;
        c.velocity = 1;
        c.bias_level = 127;
        tva.reset(&t, &c);
        assert_eq!(tva.base_amp, 0);
    }

    #[test]
    fn sustain_holds_until_released() {
        let t = tables();
        let mut tva = Tva::new();
        let mut c = ctx();
        c.env_time = [0, 1, 1, 1, 0];
        tva.reset(&t, &c);

        for _ in 0..10_000 {
            if tva.phase() == TvaPhase::Sustain {
                break;
            }
            tva.tick(&t);
        }
        assert_eq!(tva.phase(), TvaPhase::Sustain);
        for _ in 0..10_000 {
            tva.tick(&t);
        }
        assert_eq!(tva.phase(), TvaPhase::Sustain, "should hold without release notification");
    }
}
