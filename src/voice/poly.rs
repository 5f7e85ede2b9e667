//! A note event in flight (`spec.md` §3, §4.6).

use crate::voice::handle::Handle;
use crate::voice::partial::Partial;

/// A `Poly`'s lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolyState {
    /// Free slot; no note is sounding here.
    #[default]
    Inactive,
    /// Sounding normally.
    Playing,
    /// Note-Off received while the hold pedal was down.
    Held,
    /// Note-Off (or hold pedal lift) applied; partials are decaying.
    Released,
}

/// One MIDI note in flight, owning up to four [`Partial`] slots.
#[derive(Clone, Debug)]
pub struct Poly {
    key: u8,
    velocity: u8,
    state: PolyState,
    partials: [Option<Handle<Partial>>; 4],
    activation_order: u64,
}

impl Default for Poly {
    fn default() -> Self {
        Poly {
            key: 0,
            velocity: 0,
            state: PolyState::Inactive,
            partials: [None; 4],
            activation_order: 0,
        }
    }
}

impl Poly {
    /// Activates a free slot for a new Note-On.
    pub fn start(key: u8, velocity: u8, activation_order: u64, partials: [Option<Handle<Partial>>; 4]) -> Self {
        Poly {
            key,
            velocity,
            state: PolyState::Playing,
            partials,
            activation_order,
        }
    }

    /// Note key, 0..=127.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Note-on velocity.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PolyState {
        self.state
    }

    /// Insertion order among all polys ever started, used by the partial
    /// allocator's "oldest released/playing" stealing priority.
    pub fn activation_order(&self) -> u64 {
        self.activation_order
    }

    /// Handles to this poly's owned partials (inactive structure slots are `None`).
    pub fn partials(&self) -> &[Option<Handle<Partial>>; 4] {
        &self.partials
    }

    /// Note-Off received. Transitions to `Held` if the hold pedal is down,
    /// otherwise `Released`.
    pub fn note_off(&mut self, hold_pedal_down: bool) {
        if self.state == PolyState::Playing {
            self.state = if hold_pedal_down { PolyState::Held } else { PolyState::Released };
        }
    }

    /// Hold pedal released: any `Held` poly drops to `Released`.
    pub fn lift_hold(&mut self) {
        if self.state == PolyState::Held {
            self.state = PolyState::Released;
        }
    }

    /// All-Sounds-Off: forces immediate abort regardless of current state.
    pub fn abort(&mut self) {
        self.state = PolyState::Released;
    }

    /// Called once every owned partial's TVA has reached `Dead`; frees the slot.
    pub fn deactivate(&mut self) {
        self.state = PolyState::Inactive;
        self.partials = [None; 4];
    }

    /// `true` if this slot holds no active note.
    pub fn is_inactive(&self) -> bool {
        self.state == PolyState::Inactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_off_without_hold_pedal_releases_directly() {
        let mut poly = Poly::start(60, 100, 0, [None; 4]);
        poly.note_off(false);
        assert_eq!(poly.state(), PolyState::Released);
    }

    #[test]
    fn note_off_with_hold_pedal_holds_then_lifts() {
        let mut poly = Poly::start(60, 100, 0, [None; 4]);
        poly.note_off(true);
        assert_eq!(poly.state(), PolyState::Held);
        poly.lift_hold();
        assert_eq!(poly.state(), PolyState::Released);
    }
}
