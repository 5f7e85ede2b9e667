//! Time-Variant Amplitude / Filter cutoff / Pitch envelope generators.
//!
//! `TVA`, `TVF` and `TVP` are the three envelope state machines driving a
//! partial's amplitude ramp, cutoff ramp, and per-sample pitch value
//! respectively (`spec.md` §4.3–§4.5). They never advance their own
//! ramps autonomously: the owning `Partial` ticks each ramp once per
//! sample and then polls for a latched interrupt, calling `next_phase`
//! (or, for `TVP`, just recomputing pitch) in response — reproducing the
//! original firmware's `handleInterrupt()` callback without modelling a
//! real interrupt (`spec.md` §9).

pub(crate) mod tva;
mod tvf;
mod tvp;

pub use tva::{Tva, TvaPhase, TvaResetContext};
pub use tvf::{Tvf, TvfPhase, TvfResetContext};
pub use tvp::{Tvp, TvpPhase, TvpResetContext};
