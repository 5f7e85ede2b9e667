//! Hardware-accurate 32-bit logarithmic amplitude/cutoff ramp.
//!
//! Both TVA (amplitude) and TVF (cutoff) drive one of these per partial.
//! The ramp is pure arithmetic with no side effects beyond its own state;
//! `TVA`/`TVF` poll [`LA32Ramp::check_interrupt`] once per sample and react
//! by advancing their envelope phase, reproducing the original firmware's
//! `handleInterrupt()` callback without modelling a real interrupt.

use crate::tables::{Tables, INTERRUPT_TIME};

/// 32-bit logarithmic ramp with interrupt-on-arrival semantics.
///
/// See `spec.md` §4.1 for the full contract. Snapping and interrupt-arming
/// happen inside [`LA32Ramp::next_value`]; [`LA32Ramp::check_interrupt`]
/// only reports and clears the latched flag.
#[derive(Clone, Debug, Default)]
pub struct LA32Ramp {
    current: u32,
    target: u32,
    increment: i32,
    descending: bool,
    interrupt_countdown: u8,
    interrupt_raised: bool,
}

impl LA32Ramp {
    /// Creates a ramp at rest (current = target = 0, no pending interrupt).
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or retargets) the ramp.
    ///
    /// `increment`'s high bit selects the direction (set = descending);
    /// the low 7 bits index [`Tables::env_time_steps`] for the per-sample
    /// step magnitude. If the new target and direction match the ramp's
    /// current target and direction, the in-flight ramp continues
    /// unchanged; otherwise the step is recomputed from `increment`.
    pub fn start_ramp(&mut self, tables: &Tables, target: u8, increment: u8) {
        let descending = increment & 0x80 != 0;
        let target = (target as u32) << 12;

        if self.target == target && self.descending == descending && self.increment != 0 {
            return;
        }

        self.target = target;
        self.descending = descending;
        self.increment = Self::encode_increment(tables, increment);
        self.interrupt_raised = false;
        self.interrupt_countdown = 0;
    }

    fn encode_increment(tables: &Tables, increment: u8) -> i32 {
        let index = (increment & 0x7f) as usize;
        tables.env_time_steps[index]
    }

    /// Advances the ramp by one sample and returns the new `current` value.
    ///
    /// On arrival at `target` (ascending: `current + step >= target`;
    /// descending: `step >= current`, snapping to `target` or to 0), the
    /// ramp snaps immediately and arms the interrupt countdown; the
    /// interrupt itself latches [`INTERRUPT_TIME`] calls later.
    pub fn next_value(&mut self) -> u32 {
        if self.increment == 0 {
            return self.current;
        }

        let step = self.increment.unsigned_abs();

        if self.descending {
            if step >= self.current {
                self.current = self.target.min(self.current);
                self.arm_interrupt();
            } else {
                self.current -= step;
            }
        } else if self.current + step >= self.target {
            self.current = self.target;
            self.arm_interrupt();
        } else {
            self.current += step;
        }

        self.tick_interrupt();
        self.current
    }

    fn arm_interrupt(&mut self) {
        if self.interrupt_countdown == 0 && !self.interrupt_raised {
            self.interrupt_countdown = INTERRUPT_TIME;
        }
        self.increment = 0;
    }

    fn tick_interrupt(&mut self) {
        if self.interrupt_countdown > 0 {
            self.interrupt_countdown -= 1;
            if self.interrupt_countdown == 0 {
                self.interrupt_raised = true;
            }
        }
    }

    /// Returns `true` exactly once per completed ramp, clearing the flag.
    pub fn check_interrupt(&mut self) -> bool {
        let raised = self.interrupt_raised;
        self.interrupt_raised = false;
        raised
    }

    /// Clears the ramp back to rest without raising an interrupt.
    pub fn reset(&mut self) {
        *self = LA32Ramp::default();
    }

    /// `true` if `current` is strictly below `target << 12`, used by TVA's
    /// `RecalcSustain` to decide ramp direction during sustain tracking.
    pub fn is_below_current(&self, target: u8) -> bool {
        self.current < (target as u32) << 12
    }

    /// Current ramp value (log-domain, 20 fractional bits below the 8-bit
    /// target resolution).
    pub fn current(&self) -> u32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Tables {
        Tables::build()
    }

    #[test]
    fn fast_non_saturated_index_steps_further_than_an_i8_could() {
        // Index 105 is the fastest non-saturated entry (just below the
        // saturation band); its table magnitude (2^17) is far larger than
        // i8::MAX, so a ramp using it should cross a target of exactly that
        // size in a single `next_value` call rather than needing dozens of
        // steps as it would if the step were still truncated to i8 range.
        let t = tables();
        assert!(t.env_time_steps[105] > i8::MAX as i32);

        let mut ramp = LA32Ramp::new();
        ramp.start_ramp(&t, 0x20, 105);
        ramp.next_value();
        assert_eq!(ramp.current(), (0x20u32) << 12, "a wide step should reach the target in one sample");
    }

    #[test]
    fn nonzero_increment_eventually_interrupts() {
        let t = tables();
        let mut ramp = LA32Ramp::new();
        ramp.start_ramp(&t, 0xff, 0x7f);

        let mut fired = false;
        for _ in 0..1_000_000 {
            ramp.next_value();
            if ramp.check_interrupt() {
                fired = true;
                break;
            }
        }
        assert!(fired, "ramp with nonzero increment never interrupted");
    }

    #[test]
    fn interrupt_fires_exactly_once_per_ramp() {
        let t = tables();
        let mut ramp = LA32Ramp::new();
        ramp.start_ramp(&t, 0x10, 0x7f);

        let mut interrupts = 0;
        for _ in 0..1_000_000 {
            ramp.next_value();
            if ramp.check_interrupt() {
                interrupts += 1;
            }
        }
        assert_eq!(interrupts, 1);
    }

    #[test]
    fn ascending_ramp_snaps_to_target() {
        let t = tables();
        let mut ramp = LA32Ramp::new();
        ramp.start_ramp(&t, 0x40, 0x7f);
        for _ in 0..1000 {
            ramp.next_value();
            if ramp.check_interrupt() {
                break;
            }
        }
        assert_eq!(ramp.current(), (0x40u32) << 12);
    }

    #[test]
    fn descending_ramp_reaches_target_or_zero() {
        let t = tables();
        let mut ramp = LA32Ramp::new();
        ramp.start_ramp(&t, 0xff, 0x7f);
        for _ in 0..1000 {
            ramp.next_value();
            if ramp.check_interrupt() {
                break;
            }
        }
        ramp.start_ramp(&t, 0x00, 0xff);
        for _ in 0..1000 {
            ramp.next_value();
            if ramp.check_interrupt() {
                break;
            }
        }
        assert_eq!(ramp.current(), 0);
    }

    #[test]
    fn same_target_and_direction_continues_ramp() {
        let t = tables();
        let mut ramp = LA32Ramp::new();
        ramp.start_ramp(&t, 0x7f, 0x10);
        ramp.next_value();
        let mid = ramp.current();
        ramp.start_ramp(&t, 0x7f, 0x10);
        assert_eq!(ramp.current(), mid, "retargeting same ramp should be a no-op");
    }

    #[test]
    fn is_below_current_reflects_target_comparison() {
        let mut ramp = LA32Ramp::new();
        assert!(ramp.is_below_current(1));
        ramp.reset();
        assert!(ramp.is_below_current(1));
    }
}
